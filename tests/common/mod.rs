// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Shared fixtures for the scenario tests in §8 of the source
//! specification: a temp-dir archive, a helper to write a FASTA file, and
//! a sequence builder that guarantees at least one singleton k-mer (and
//! hence at least one splitter) without relying on a large, hard-to-hand-verify
//! genome.

use pancore::archive::FileStreamArchive;
use pancore::collection::InMemoryCollection;
use pancore::compression::ZstdCompressor;
use pancore::genome_io::FastaReader;
use pancore::{CompressionPipeline, Config};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes a single-contig FASTA file under `dir` and returns its path.
pub fn write_fasta(dir: &Path, file_name: &str, contig_name: &str, sequence: &str) -> PathBuf {
    let path = dir.join(file_name);
    let mut file = std::fs::File::create(&path).expect("create fasta fixture");
    writeln!(file, ">{contig_name}\n{sequence}").expect("write fasta fixture");
    path
}

/// Builds a fresh, on-disk-backed pipeline rooted at a new temp directory.
/// The temp directory guard is returned alongside the pipeline so callers
/// can keep it alive for the pipeline's lifetime.
pub fn fresh_pipeline(config: Config) -> (tempfile::TempDir, CompressionPipeline) {
    let archive_dir = tempfile::tempdir().expect("tempdir");
    let archive = Box::new(FileStreamArchive::create(archive_dir.path()).expect("create archive"));
    let compressor = Box::new(ZstdCompressor);
    let genome_io = Box::new(FastaReader);
    let collection = Box::new(InMemoryCollection::new());
    let pipeline = CompressionPipeline::create(config, archive, compressor, genome_io, collection);
    (archive_dir, pipeline)
}

/// A run of `n` `A`s: contributes only duplicate k-mers (itself and its
/// reverse complement, `T`s) to any k-mer gather, never a singleton.
pub fn homopolymer(n: usize) -> String {
    "A".repeat(n)
}

/// A contig built from a distinctive `marker` flanked by long homopolymer
/// runs on both sides. As long as `marker`'s k-mers (and their reverse
/// complements) don't otherwise recur in the sequence — true for any
/// `marker` that isn't itself built from `A`/`T` runs — scanning this
/// sequence is guaranteed to encounter at least one singleton k-mer, and
/// since `SplitterSelector::pick_splitters` starts its spacing counter
/// already at threshold, that singleton becomes the contig's first (and
/// typically only) accepted splitter.
pub fn marker_genome(marker: &str, pad: usize) -> String {
    format!("{}{}{}", homopolymer(pad), marker, homopolymer(pad))
}
