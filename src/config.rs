// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Creation options for a new archive, and the small derived knobs
//! (worker count, queue sizing) that ambient concurrency needs but the
//! spec leaves to the embedder.

const DEFAULT_FILE_FOLDER: &str = ".pancore.archive";

/// Builder for the options recognized when creating a new archive.
///
/// Mirrors the seven creation options named in the archive spec plus the
/// ambient knobs (`no_workers`, `queue_capacity_bytes`) a production
/// pipeline needs but which have no archive-format consequence.
#[derive(Clone, Debug)]
pub struct Config {
    /// Archive directory.
    pub path: std::path::PathBuf,

    /// K-mer length used for splitter discovery, `1..=31`.
    pub k: u32,

    /// Target spacing between accepted splitters along a contig.
    pub segment_size: u32,

    /// Minimum match length the delta codec will emit.
    pub min_match_len: u32,

    /// Number of segments batched per delta-compression flush.
    pub pack_cardinality: u32,

    /// Ignore sample names; each input file becomes its own sample.
    pub concatenated_genomes: bool,

    /// Enable the new-splitter discovery pass (adaptive mode).
    pub adaptive_compression: bool,

    /// Deterministic group/in-group assignment independent of thread count.
    pub reproducibility_mode: bool,

    /// Reserved raw-group band size, `R = {0..no_raw_groups-1}`.
    pub no_raw_groups: u32,

    /// Worker pool size. Defaults to the available parallelism.
    pub no_workers: usize,

    /// Soft byte-size bound on a worker's bounded priority queue before the
    /// producer blocks; 0 disables the bound.
    pub queue_capacity_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: std::path::PathBuf::from(DEFAULT_FILE_FOLDER),
            k: 20,
            segment_size: 60_000,
            min_match_len: 20,
            pack_cardinality: 50,
            concatenated_genomes: false,
            adaptive_compression: false,
            reproducibility_mode: false,
            no_raw_groups: 32,
            no_workers: std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
            queue_capacity_bytes: 64 * 1_024 * 1_024,
        }
    }
}

impl Config {
    /// Starts a builder rooted at `path`, with every other option defaulted.
    #[must_use]
    pub fn new<P: AsRef<std::path::Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Sets the k-mer length.
    ///
    /// # Panics
    ///
    /// Panics if `k` is 0 or exceeds [`crate::kmer::MAX_K`].
    #[must_use]
    pub fn k(mut self, k: u32) -> Self {
        assert!(k >= 1 && k <= crate::kmer::MAX_K, "k must be in 1..={}", crate::kmer::MAX_K);
        self.k = k;
        self
    }

    /// Sets the target splitter spacing.
    ///
    /// # Panics
    ///
    /// Panics if `segment_size` is 0.
    #[must_use]
    pub fn segment_size(mut self, segment_size: u32) -> Self {
        assert!(segment_size > 0);
        self.segment_size = segment_size;
        self
    }

    /// Sets the delta codec's minimum match length.
    #[must_use]
    pub fn min_match_len(mut self, len: u32) -> Self {
        assert!(len > 0);
        self.min_match_len = len;
        self
    }

    /// Sets the number of segments batched per delta-compression flush.
    ///
    /// # Panics
    ///
    /// Panics if `n` is 0.
    #[must_use]
    pub fn pack_cardinality(mut self, n: u32) -> Self {
        assert!(n > 0);
        self.pack_cardinality = n;
        self
    }

    /// Each input file becomes its own sample, ignoring any shared sample name.
    #[must_use]
    pub fn concatenated_genomes(mut self, yes: bool) -> Self {
        self.concatenated_genomes = yes;
        self
    }

    /// Enables the new-splitter discovery pass.
    #[must_use]
    pub fn adaptive_compression(mut self, yes: bool) -> Self {
        self.adaptive_compression = yes;
        self
    }

    /// Enables deterministic `(group_id, in_group_id)` assignment, independent
    /// of thread count or scheduling.
    #[must_use]
    pub fn reproducibility_mode(mut self, yes: bool) -> Self {
        self.reproducibility_mode = yes;
        self
    }

    /// Sets the reserved raw-group band size.
    ///
    /// # Panics
    ///
    /// Panics if `n` is 0 (group id 0 is always reserved for `(⊥,⊥)`).
    #[must_use]
    pub fn no_raw_groups(mut self, n: u32) -> Self {
        assert!(n > 0);
        self.no_raw_groups = n;
        self
    }

    /// Sets the worker pool size.
    ///
    /// # Panics
    ///
    /// Panics if `n` is 0.
    #[must_use]
    pub fn no_workers(mut self, n: usize) -> Self {
        assert!(n > 0);
        self.no_workers = n;
        self
    }

    /// Sets the soft byte-size bound on each worker's priority queue.
    #[must_use]
    pub fn queue_capacity_bytes(mut self, bytes: usize) -> Self {
        self.queue_capacity_bytes = bytes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::new("/tmp/whatever");
        assert_eq!(config.no_raw_groups, 32);
        assert!(config.no_workers >= 1);
        assert!(!config.reproducibility_mode);
    }

    #[test]
    #[should_panic]
    fn k_above_max_panics() {
        Config::default().k(32);
    }

    #[test]
    fn builder_chains() {
        let config = Config::new("/tmp/whatever")
            .k(24)
            .segment_size(40_000)
            .adaptive_compression(true)
            .reproducibility_mode(true)
            .no_raw_groups(8);
        assert_eq!(config.k, 24);
        assert_eq!(config.segment_size, 40_000);
        assert!(config.adaptive_compression);
        assert!(config.reproducibility_mode);
        assert_eq!(config.no_raw_groups, 8);
    }
}
