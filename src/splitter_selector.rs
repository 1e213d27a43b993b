// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Two-pass splitter selection: gather singleton k-mers from a reference,
//! then greedily pick spaced splitters per contig.

use crate::kmer::KmerRoller;
use crate::preprocess::AMBIGUOUS;
use crate::radix_sort::radix_sort_u64;

/// Picks splitters for a reference (pass 1 + pass 2) and discovers
/// contig-local splitters for adaptive mode.
#[derive(Debug, Clone, Copy)]
pub struct SplitterSelector {
    k: u32,
    segment_size: u32,
}

impl SplitterSelector {
    /// Creates a selector for the given k-mer length and target spacing.
    #[must_use]
    pub fn new(k: u32, segment_size: u32) -> Self {
        Self { k, segment_size }
    }

    fn collect_kmers(&self, symbols: &[u8]) -> Vec<u64> {
        let mut roller = KmerRoller::new(self.k);
        let mut values = Vec::with_capacity(symbols.len());
        for &symbol in symbols {
            if symbol == AMBIGUOUS {
                roller.reset();
                continue;
            }
            roller.insert(symbol);
            if roller.is_full() {
                values.push(roller.value());
            }
        }
        values
    }

    /// Pass 1: enumerates every canonical k-mer across `contigs`, sorts
    /// them via [`radix_sort_u64`], and sweeps run lengths to separate
    /// singletons from duplicates. `duplicates` is only populated when
    /// `want_duplicates` is set (adaptive mode).
    #[must_use]
    pub fn gather_singletons(&self, contigs: &[Vec<u8>], want_duplicates: bool) -> (Vec<u64>, Vec<u64>) {
        let mut all = Vec::new();
        for contig in contigs {
            all.extend(self.collect_kmers(contig));
        }
        radix_sort_u64(&mut all);

        let mut singletons = Vec::new();
        let mut duplicates = Vec::new();
        let mut i = 0;
        while i < all.len() {
            let mut j = i + 1;
            while j < all.len() && all[j] == all[i] {
                j += 1;
            }
            if j - i == 1 {
                singletons.push(all[i]);
            } else if want_duplicates {
                duplicates.push(all[i]);
            }
            i = j;
        }
        (singletons, duplicates)
    }

    /// Pass 2: greedily picks splitters along a single contig against a
    /// sorted singleton set, spaced at least `segment_size` apart, with
    /// tail recovery when the contig ends before reaching the threshold.
    #[must_use]
    pub fn pick_splitters(&self, symbols: &[u8], singletons_sorted: &[u64]) -> Vec<u64> {
        let mut picked = Vec::new();
        let mut roller = KmerRoller::new(self.k);
        let mut current_len: u32 = self.segment_size;
        let mut recent_candidates: Vec<u64> = Vec::new();

        for &symbol in symbols {
            if symbol == AMBIGUOUS {
                roller.reset();
                continue;
            }
            roller.insert(symbol);
            if !roller.is_full() {
                continue;
            }
            current_len += 1;
            let value = roller.value();
            let is_singleton = singletons_sorted.binary_search(&value).is_ok();

            if current_len >= self.segment_size && is_singleton {
                picked.push(value);
                current_len = 0;
                roller.reset();
                recent_candidates.clear();
                continue;
            }
            if is_singleton {
                recent_candidates.push(value);
            }
        }

        if current_len > 0 {
            if let Some(&tail) = recent_candidates.last() {
                picked.push(tail);
            }
        }
        picked
    }

    /// Adaptive addition: when a contig produced no splitters against the
    /// reference set, this enumerates its own k-mers, keeps its local
    /// singletons, removes anything already known to the reference
    /// (singleton or duplicate there), and runs pass 2 against what's left.
    #[must_use]
    pub fn find_new_splitters(
        &self,
        symbols: &[u8],
        reference_singletons_sorted: &[u64],
        reference_duplicates_sorted: &[u64],
    ) -> Vec<u64> {
        let (local_singletons, _) = self.gather_singletons(&[symbols.to_vec()], false);

        let novel: Vec<u64> = local_singletons
            .into_iter()
            .filter(|v| {
                reference_singletons_sorted.binary_search(v).is_err()
                    && reference_duplicates_sorted.binary_search(v).is_err()
            })
            .collect();

        self.pick_splitters(symbols, &novel)
    }
}
