// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A segmentation and routing core for pangenomic collection archives.
//!
//! ##### About
//!
//! Pangenomic archives store many related genomes (a species' full
//! population, say) far more compactly than storing each independently, by
//! exploiting how similar the genomes are to one another. This crate
//! implements the compression side of that idea: genomes are cut into
//! segments at shared, rare anchor points (`splitter` k-mers), and segments
//! that land on the same pair of anchors are grouped together so that only
//! the first is stored in full — every later one is stored as a diff
//! against it.
//!
//! The pipeline has three moving parts:
//!
//! - [`kmer`] and [`splitter_selector`] find the anchor k-mers: singleton
//!   (exactly-once) canonical k-mers, picked with a target spacing along
//!   each contig.
//! - [`router`] decides, for each segment a contig is cut into, which group
//!   it belongs to — including the heuristics for segments missing one or
//!   both anchors.
//! - [`segment_group`] and [`group_table`] hold the groups themselves: the
//!   first segment admitted to a group becomes its reference; every later
//!   one is diffed against it and compressed.
//!
//! [`pipeline`] ties these together with the worker pool and the on-disk
//! [`archive`] format; [`metadata_writer`] serializes the splitter set,
//! segment map, and collection descriptor at close.
//!
//! External collaborators the spec leaves unspecified — the byte-stream
//! container, the block compressor, the FASTA reader — are pinned down as
//! traits ([`archive::StreamArchive`], [`compression::BlockCompressor`],
//! [`genome_io::GenomeIO`]) with one reference implementation each, so the
//! rest of the crate has something real to build and test against.

#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::cargo)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod archive;
pub mod buffered_seg_parts;
pub mod coding;
pub mod collection;
pub mod compression;
pub mod config;
mod error;
pub mod genome_io;
pub mod group_table;
mod hash;
pub mod kmer;
pub mod metadata_writer;
pub mod pipeline;
mod preprocess;
mod radix_sort;
pub mod router;
pub mod segment_group;
pub mod segment_map;
mod splitter_index;
mod splitter_selector;

pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::CompressionPipeline;
pub use splitter_index::SplitterIndex;
