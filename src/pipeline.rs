// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `CompressionPipeline`: ties the segmentation loop, the worker pool, and
//! the archive together. Owns every long-lived collaborator and exposes the
//! create/append/close lifecycle.

use crate::archive::StreamArchive;
use crate::buffered_seg_parts::{BufferedSegParts, SegPartRecord};
use crate::coding::varint;
use crate::collection::Collection;
use crate::compression::BlockCompressor;
use crate::config::Config;
use crate::error::Error;
use crate::genome_io::GenomeIO;
use crate::group_table::GroupTable;
use crate::kmer::KmerRoller;
use crate::metadata_writer::MetadataWriter;
use crate::preprocess::{preprocess, AMBIGUOUS};
use crate::router::{RoutedSegment, SegmentRouter};
use crate::segment_map::{fingerprint, SegmentMap};
use crate::splitter_index::SplitterIndex;
use crate::splitter_selector::SplitterSelector;
use byteorder::{LittleEndian, ReadBytesExt};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, RwLock};

/// Internal stream (not part of the archive's documented external
/// interface) holding the reference sample's preprocessed contig bodies,
/// ZSTD-compressed one part per contig. Only written when adaptive
/// compression is on, so an append can re-run pass 1 and reseed
/// `reference_singletons`/`reference_duplicates` without re-reading the
/// original genome file.
const REFERENCE_BASES_STREAM: &str = "reference-bases";

/// One contiguous slice of a contig produced by the segmentation scan, with
/// the splitter values (if any) bounding it.
struct SegmentSlice {
    start: usize,
    end: usize,
    /// Splitter value bounding this side, paired with whether the forward
    /// strand produced that canonical value (`is_dir_oriented` at the time
    /// the splitter was accepted).
    front: Option<(u64, bool)>,
    back: Option<(u64, bool)>,
}

/// Reads back every part of `reference-bases`, decompressing each. Returns
/// an empty list if the stream is absent (an archive created before
/// adaptive compression was turned on) or any part fails to read or
/// decompress, so the caller can fall back to an unseeded adaptive pass
/// rather than fail the whole reopen.
fn reload_reference_bodies(archive: &dyn StreamArchive, compressor: &dyn BlockCompressor) -> Vec<Vec<u8>> {
    let Ok(count) = archive.part_count(REFERENCE_BASES_STREAM) else {
        return Vec::new();
    };
    let mut bodies = Vec::with_capacity(count as usize);
    for part_id in 0..count {
        let Ok((bytes, _)) = archive.get_part(REFERENCE_BASES_STREAM, part_id) else {
            return Vec::new();
        };
        let Ok(body) = compressor.decompress(&bytes) else {
            return Vec::new();
        };
        bodies.push(body);
    }
    bodies
}

/// Owns the splitter index, the segment router, the collection descriptor,
/// and the external collaborators (archive, compressor, genome reader),
/// and drives segmentation for every appended file.
pub struct CompressionPipeline {
    config: Config,
    archive: Box<dyn StreamArchive>,
    compressor: Box<dyn BlockCompressor>,
    genome_io: Box<dyn GenomeIO>,
    collection: Box<dyn Collection>,
    splitter_index: SplitterIndex,
    router: SegmentRouter,
    selector: SplitterSelector,
    reference_singletons: RwLock<Vec<u64>>,
    reference_duplicates: RwLock<Vec<u64>>,
    buffered: BufferedSegParts,
    new_splitter_lock: Mutex<()>,
}

impl CompressionPipeline {
    /// Starts a brand new archive: empty splitter index, empty segment map,
    /// a group table pre-populated with the raw-group band.
    #[must_use]
    pub fn create(
        config: Config,
        archive: Box<dyn StreamArchive>,
        compressor: Box<dyn BlockCompressor>,
        genome_io: Box<dyn GenomeIO>,
        collection: Box<dyn Collection>,
    ) -> Self {
        let map = SegmentMap::new(config.no_raw_groups);
        let groups = GroupTable::new(config.no_raw_groups, config.min_match_len);
        let router = SegmentRouter::new(map, groups, config.no_raw_groups, config.k, config.concatenated_genomes);
        let selector = SplitterSelector::new(config.k, config.segment_size);
        Self {
            archive,
            compressor,
            genome_io,
            collection,
            splitter_index: SplitterIndex::new(),
            router,
            selector,
            reference_singletons: RwLock::new(Vec::new()),
            reference_duplicates: RwLock::new(Vec::new()),
            buffered: BufferedSegParts::new(),
            new_splitter_lock: Mutex::new(()),
            config,
        }
    }

    /// Reopens an existing archive: rebuilds the splitter index and segment
    /// map from their serialized streams, and rounds the group table's
    /// capacity up to the next power of two past the highest known group id.
    pub fn open(
        config: Config,
        archive: Box<dyn StreamArchive>,
        compressor: Box<dyn BlockCompressor>,
        genome_io: Box<dyn GenomeIO>,
        collection: Box<dyn Collection>,
    ) -> crate::Result<Self> {
        let (splitters_bytes, _) = archive.get_part("splitters", 0)?;
        if splitters_bytes.len() % 8 != 0 {
            return Err(Error::CorruptArchive("splitters stream is not a multiple of 8 bytes"));
        }
        let splitter_values: Vec<u64> = splitters_bytes
            .chunks_exact(8)
            .map(|chunk| u64::from_le_bytes(chunk.try_into().expect("chunks_exact(8)")))
            .collect();
        let splitter_index = SplitterIndex::from_values(splitter_values);

        let (seg_bytes, _) = archive.get_part("segment-splitters", 0)?;
        let mut cursor = std::io::Cursor::new(seg_bytes.as_slice());
        let mut entries = Vec::new();
        while (cursor.position() as usize) < seg_bytes.len() {
            let k1 = cursor.read_u64::<LittleEndian>()?;
            let k2 = cursor.read_u64::<LittleEndian>()?;
            let group_id = varint::read(&mut cursor)?;
            entries.push(((k1, k2), group_id));
        }
        let max_group = entries.iter().map(|(_, g)| *g).max();
        let map = SegmentMap::from_entries(config.no_raw_groups, entries);

        let mut capacity = config.no_raw_groups.max(max_group.map_or(0, |g| g + 1));
        let mut rounded = 1u32;
        while rounded < capacity {
            rounded = rounded.saturating_mul(2);
        }
        capacity = rounded.max(config.no_raw_groups);
        let groups = GroupTable::new(config.no_raw_groups, config.min_match_len);
        let _ = groups.get_or_create(capacity.saturating_sub(1));

        let router = SegmentRouter::new(map, groups, config.no_raw_groups, config.k, config.concatenated_genomes);
        let selector = SplitterSelector::new(config.k, config.segment_size);

        let (reference_singletons, reference_duplicates) = if config.adaptive_compression {
            let bodies = reload_reference_bodies(archive.as_ref(), compressor.as_ref());
            if bodies.is_empty() {
                (Vec::new(), Vec::new())
            } else {
                selector.gather_singletons(&bodies, true)
            }
        } else {
            (Vec::new(), Vec::new())
        };

        Ok(Self {
            archive,
            compressor,
            genome_io,
            collection,
            splitter_index,
            router,
            selector,
            reference_singletons: RwLock::new(reference_singletons),
            reference_duplicates: RwLock::new(reference_duplicates),
            buffered: BufferedSegParts::new(),
            new_splitter_lock: Mutex::new(()),
            config,
        })
    }

    /// Seeds the splitter index from a reference file (pass 1 + pass 2 over
    /// every one of its contigs), then ingests the file as the first sample.
    /// Must be called before any [`Self::append_file`] on a fresh archive.
    pub fn seed_reference(&self, sample: &str, path: &Path) -> crate::Result<()> {
        let sample = self.effective_sample(sample, path);
        let sample = sample.as_ref();
        let contigs = self.genome_io.open(path)?;
        let preprocessed: Vec<(String, Vec<u8>)> = contigs.into_iter().map(|c| (c.name, preprocess(&c.sequence))).collect();
        let bodies: Vec<Vec<u8>> = preprocessed.iter().map(|(_, body)| body.clone()).collect();

        let want_duplicates = self.config.adaptive_compression;
        let (singletons, duplicates) = self.selector.gather_singletons(&bodies, want_duplicates);

        for body in &bodies {
            let picked = self.selector.pick_splitters(body, &singletons);
            self.splitter_index.insert_all(picked);
        }

        if want_duplicates {
            self.persist_reference_bases(&bodies)?;
            *self.reference_singletons.write().expect("lock is poisoned") = singletons;
            *self.reference_duplicates.write().expect("lock is poisoned") = duplicates;
        }

        self.ingest_contigs(sample, preprocessed)
    }

    /// Persists the reference sample's preprocessed contig bodies so a
    /// later [`Self::open`] can reseed `reference_singletons`/
    /// `reference_duplicates` without re-reading the original genome file.
    fn persist_reference_bases(&self, bodies: &[Vec<u8>]) -> crate::Result<()> {
        self.archive.register_stream(REFERENCE_BASES_STREAM)?;
        for body in bodies {
            let compressed = self.compressor.compress(body, crate::compression::LEVEL_SEGMENT)?;
            self.archive.add_part(REFERENCE_BASES_STREAM, &compressed, body.len() as u32)?;
        }
        Ok(())
    }

    /// Appends one genome file as a new sample. Delegates to
    /// [`Self::seed_reference`] if the splitter index is still empty (the
    /// first call on a fresh archive).
    pub fn append_file(&self, sample: &str, path: &Path) -> crate::Result<()> {
        if self.splitter_index.is_empty() {
            return self.seed_reference(sample, path);
        }
        let sample = self.effective_sample(sample, path);
        let sample = sample.as_ref();
        let contigs = self.genome_io.open(path)?;
        let preprocessed: Vec<(String, Vec<u8>)> = contigs.into_iter().map(|c| (c.name, preprocess(&c.sequence))).collect();
        self.ingest_contigs(sample, preprocessed)
    }

    /// With `concatenated_genomes`, sample names are ignored: each input
    /// file becomes its own sample, named after its file stem.
    fn effective_sample<'a>(&self, sample: &'a str, path: &'a Path) -> std::borrow::Cow<'a, str> {
        if !self.config.concatenated_genomes {
            return std::borrow::Cow::Borrowed(sample);
        }
        match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => std::borrow::Cow::Borrowed(stem),
            None => std::borrow::Cow::Borrowed(sample),
        }
    }

    /// The collection descriptor accumulated so far (`sample -> contig ->
    /// segment sequence`), for inspection and for [`MetadataWriter`].
    #[must_use]
    pub fn collection(&self) -> &dyn Collection {
        self.collection.as_ref()
    }

    /// The underlying archive, for inspecting written streams/parts.
    #[must_use]
    pub fn archive(&self) -> &dyn StreamArchive {
        self.archive.as_ref()
    }

    /// The splitter index seeded from the reference (and, in adaptive
    /// mode, anything discovered since).
    #[must_use]
    pub fn splitter_index(&self) -> &SplitterIndex {
        &self.splitter_index
    }

    /// The segment router, for inspecting the segment map and group table.
    #[must_use]
    pub fn router(&self) -> &SegmentRouter {
        &self.router
    }

    /// Finalizes every segment group and writes every metadata stream.
    /// Exclusive; must be the last call made against this pipeline.
    pub fn close(&self) -> crate::Result<()> {
        self.router.group_table().finalize_all(self.archive.as_ref(), self.compressor.as_ref())?;

        let writer = MetadataWriter::new(self.archive.as_ref(), self.compressor.as_ref());
        writer.write_file_type_info()?;
        writer.write_params(&self.config)?;
        writer.write_splitters(&self.splitter_index)?;
        writer.write_segment_splitters(self.router.segment_map())?;
        writer.write_collection(self.collection.as_ref())?;
        self.archive.flush()?;
        Ok(())
    }

    fn segment_contig(&self, symbols: &[u8]) -> Vec<SegmentSlice> {
        let k = self.config.k as usize;
        let mut roller = KmerRoller::new(self.config.k);
        let mut slices = Vec::new();
        let mut start = 0usize;
        let mut front: Option<(u64, bool)> = None;

        for (i, &symbol) in symbols.iter().enumerate() {
            if symbol == AMBIGUOUS {
                roller.reset();
                continue;
            }
            roller.insert(symbol);
            if !roller.is_full() {
                continue;
            }
            let value = roller.value();
            let dir_oriented = roller.is_dir_oriented();
            if self.splitter_index.check(value) {
                let end = i + 1;
                slices.push(SegmentSlice { start, end, front, back: Some((value, dir_oriented)) });
                start = end.saturating_sub(k);
                front = Some((value, dir_oriented));
                roller.reset();
            }
        }
        slices.push(SegmentSlice { start, end: symbols.len(), front, back: None });
        slices
    }

    /// Runs the adaptive new-splitter discovery pass for a contig that
    /// produced no hits against the current index, and inserts anything it
    /// finds. Serialized by `new_splitter_lock`: `SplitterIndex::insert_fast`
    /// (used internally by `insert_all`) is not safe to call concurrently
    /// with another writer.
    fn discover_new_splitters(&self, symbols: &[u8]) -> Vec<u64> {
        let _guard = self.new_splitter_lock.lock().expect("lock is poisoned");
        let discovered = {
            let ref_singles = self.reference_singletons.read().expect("lock is poisoned");
            let ref_dups = self.reference_duplicates.read().expect("lock is poisoned");
            self.selector.find_new_splitters(symbols, &ref_singles, &ref_dups)
        };
        if !discovered.is_empty() {
            self.splitter_index.insert_all(discovered.iter().copied());
        }
        discovered
    }

    fn process_contig(&self, sample: &str, contig: &str, symbols: &[u8]) -> crate::Result<Vec<RoutedSegment>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let mut slices = self.segment_contig(symbols);

        let produced_no_splitters = slices.len() == 1 && slices[0].front.is_none() && slices[0].back.is_none();
        let long_enough = symbols.len() as u32 >= self.config.segment_size;
        if self.config.adaptive_compression && produced_no_splitters && long_enough {
            let discovered = self.discover_new_splitters(symbols);
            if !discovered.is_empty() {
                slices = self.segment_contig(symbols);
            }
        }

        let mut routed = Vec::with_capacity(slices.len());
        for (seg_part_no, slice) in slices.iter().enumerate() {
            let payload = &symbols[slice.start..slice.end];
            let mut pieces = self.router.add_segment(sample, contig, seg_part_no as u32, payload, slice.front, slice.back)?;
            routed.append(&mut pieces);
        }
        Ok(routed)
    }

    fn ingest_contigs(&self, sample: &str, contigs: Vec<(String, Vec<u8>)>) -> crate::Result<()> {
        let mut accepted = Vec::with_capacity(contigs.len());
        for (name, _) in &contigs {
            match self.collection.register_sample_contig(sample, name) {
                Ok(()) => accepted.push(true),
                Err(err) => {
                    log::warn!("skipping duplicate contig {sample}/{name}: {err}");
                    accepted.push(false);
                }
            }
        }
        let contigs: Vec<(String, Vec<u8>)> = contigs
            .into_iter()
            .zip(accepted)
            .filter_map(|(contig, ok)| ok.then_some(contig))
            .collect();
        if contigs.is_empty() {
            return Ok(());
        }

        if self.config.reproducibility_mode {
            self.ingest_reproducible(sample, contigs)
        } else {
            self.ingest_standard(sample, contigs)
        }
    }

    /// Standard mode: a bounded worker pool drains a priority queue ordered
    /// longest-contig-first; one worker (when more than one is available)
    /// drains from the short end instead, so small contigs are not starved
    /// until the long ones finish. Group ids are allocated non-deterministically.
    fn ingest_standard(&self, sample: &str, mut contigs: Vec<(String, Vec<u8>)>) -> crate::Result<()> {
        contigs.sort_by_key(|(_, body)| std::cmp::Reverse(body.len()));
        let queue: Mutex<VecDeque<(String, Vec<u8>)>> = Mutex::new(contigs.into());
        let first_error: Mutex<Option<Error>> = Mutex::new(None);
        let no_workers = self.config.no_workers.max(1);

        std::thread::scope(|scope| {
            for worker_index in 0..no_workers {
                let queue = &queue;
                let first_error = &first_error;
                scope.spawn(move || {
                    let drain_from_back = worker_index == 0 && no_workers > 1;
                    loop {
                        let next = {
                            let mut q = queue.lock().expect("lock is poisoned");
                            if drain_from_back {
                                q.pop_back()
                            } else {
                                q.pop_front()
                            }
                        };
                        let Some((name, body)) = next else { break };
                        let outcome = self.process_contig(sample, &name, &body).and_then(|routed| self.collection.record_segment_sequence(sample, &name, routed));
                        if let Err(err) = outcome {
                            let mut slot = first_error.lock().expect("lock is poisoned");
                            if slot.is_none() {
                                *slot = Some(err);
                            }
                        }
                    }
                });
            }
        });

        match first_error.into_inner().expect("lock is poisoned") {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Reproducibility mode: segments with both terminals present are
    /// staged through `BufferedSegParts` and resolved at a single barrier,
    /// so `(group_id, in_group_id)` assignment does not depend on thread
    /// count or scheduling. Segments with zero or one terminal (contig
    /// ends, recovered fragments) are routed directly; they are rare enough,
    /// and their outcome deterministic enough given an already-resolved
    /// segment map, that staging them brings no benefit.
    ///
    /// The per-contig scan that produces this staging (`all_contigs`) is
    /// itself run by a worker pool over a shared queue, the same way
    /// `ingest_standard` drains its contigs; only the barrier and the
    /// per-group distribution that follows are sequential.
    fn ingest_reproducible(&self, sample: &str, contigs: Vec<(String, Vec<u8>)>) -> crate::Result<()> {
        let direct_routed: Mutex<FxHashMap<String, Vec<Option<RoutedSegment>>>> = Mutex::new(FxHashMap::default());
        let segment_counts: Mutex<FxHashMap<String, usize>> = Mutex::new(FxHashMap::default());
        let queue: Mutex<VecDeque<&(String, Vec<u8>)>> = Mutex::new(contigs.iter().collect());
        let first_error: Mutex<Option<Error>> = Mutex::new(None);
        let no_workers = self.config.no_workers.max(1);

        std::thread::scope(|scope| {
            for _ in 0..no_workers {
                let queue = &queue;
                let direct_routed = &direct_routed;
                let segment_counts = &segment_counts;
                let first_error = &first_error;
                scope.spawn(move || loop {
                    let next = queue.lock().expect("lock is poisoned").pop_front();
                    let Some((name, body)) = next else { break };
                    if let Err(err) = self.ingest_reproducible_contig(sample, name, body, direct_routed, segment_counts) {
                        let mut slot = first_error.lock().expect("lock is poisoned");
                        if slot.is_none() {
                            *slot = Some(err);
                        }
                    }
                });
            }
        });

        if let Some(err) = first_error.into_inner().expect("lock is poisoned") {
            return Err(err);
        }
        let mut direct_routed = direct_routed.into_inner().expect("lock is poisoned");
        let mut segment_counts = segment_counts.into_inner().expect("lock is poisoned");

        // Barrier: allocate groups for every fingerprint seen for the first
        // time this batch, in a single deterministic sweep, then hand every
        // buffered segment to its group in (group_id, sample, contig,
        // seg_part_no) order.
        self.buffered.process_new(self.router.segment_map());
        self.buffered.sort_known();
        let distribution = self.buffered.distribute_segments();

        let mut buffered_routed: FxHashMap<(String, String), Vec<(u32, RoutedSegment)>> = FxHashMap::default();
        for (group_id, records) in distribution {
            let group = self.router.group_table().get_or_create(group_id);
            for record in records {
                let in_group_id = if group_id < self.config.no_raw_groups {
                    group.add_raw(&record.payload)?
                } else {
                    group.add_delta(&record.payload, record.is_rc)?
                };
                let routed = RoutedSegment {
                    group_id,
                    in_group_id,
                    is_rc: record.is_rc,
                    raw_length: record.payload.len(),
                };
                buffered_routed
                    .entry((record.sample.clone(), record.contig.clone()))
                    .or_default()
                    .push((record.seg_part_no, routed));
            }
        }
        self.buffered.clear();

        for (name, _) in &contigs {
            let total = segment_counts.remove(name).unwrap_or(0);
            let mut sequence: Vec<Option<RoutedSegment>> = direct_routed.remove(name).unwrap_or_else(|| (0..total).map(|_| None).collect());
            if let Some(pieces) = buffered_routed.remove(&(sample.to_string(), name.clone())) {
                for (seg_part_no, routed) in pieces {
                    if let Some(slot) = sequence.get_mut(seg_part_no as usize) {
                        *slot = Some(routed);
                    }
                }
            }
            let sequence: Vec<RoutedSegment> = sequence.into_iter().flatten().collect();
            self.collection.record_segment_sequence(sample, name, sequence)?;
        }
        Ok(())
    }

    /// One contig's worth of `ingest_reproducible`'s scanning stage: segments
    /// carrying both terminals go into `self.buffered` (already safe for
    /// concurrent producers); zero/one-terminal segments are routed directly
    /// and recorded into the shared `direct_routed`/`segment_counts` maps.
    fn ingest_reproducible_contig(
        &self,
        sample: &str,
        name: &str,
        body: &[u8],
        direct_routed: &Mutex<FxHashMap<String, Vec<Option<RoutedSegment>>>>,
        segment_counts: &Mutex<FxHashMap<String, usize>>,
    ) -> crate::Result<()> {
        let mut slices = self.segment_contig(body);
        let produced_no_splitters = slices.len() == 1 && slices[0].front.is_none() && slices[0].back.is_none();
        let long_enough = body.len() as u32 >= self.config.segment_size;
        if self.config.adaptive_compression && produced_no_splitters && long_enough {
            let discovered = self.discover_new_splitters(body);
            if !discovered.is_empty() {
                slices = self.segment_contig(body);
            }
        }

        segment_counts.lock().expect("lock is poisoned").insert(name.to_string(), slices.len());
        {
            let mut direct_routed = direct_routed.lock().expect("lock is poisoned");
            direct_routed.insert(name.to_string(), (0..slices.len()).map(|_| None).collect());
        }

        for (seg_part_no, slice) in slices.iter().enumerate() {
            let payload = &body[slice.start..slice.end];
            match (slice.front, slice.back) {
                (Some((f, _)), Some((b, _))) => {
                    let pk = fingerprint(f, b);
                    let is_rc = f >= b;
                    let oriented = if is_rc { crate::preprocess::reverse_complement(payload) } else { payload.to_vec() };
                    let record = SegPartRecord {
                        sample: sample.to_string(),
                        contig: name.to_string(),
                        seg_part_no: seg_part_no as u32,
                        payload: oriented,
                        is_rc,
                    };
                    match self.router.segment_map().lookup(pk) {
                        Some(group_id) => self.buffered.push_known(group_id, record),
                        None => self.buffered.push_new(pk, record),
                    }
                }
                _ => {
                    let mut pieces = self.router.add_segment(sample, name, seg_part_no as u32, payload, slice.front, slice.back)?;
                    if let Some(piece) = pieces.pop() {
                        let mut direct_routed = direct_routed.lock().expect("lock is poisoned");
                        if let Some(slot) = direct_routed.get_mut(name).and_then(|v| v.get_mut(seg_part_no)) {
                            *slot = Some(piece);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
