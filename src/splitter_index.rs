// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Set of accepted splitter k-mer values with O(1) membership and
//! concurrent insert-during-scan.

use rustc_hash::FxHashSet;
use std::sync::RwLock;

/// Concurrent membership set over 64-bit splitter values.
///
/// `check` is the hot path (every contig symbol that completes a k-mer calls
/// it) and is meant to be nearly wait-free: readers take a brief read lock
/// only to clone the `Arc` snapshot, then probe the hash set without holding
/// any lock. `insert_fast` is the writer path, used only from the
/// `new_splitters` barrier phase, where it is never called concurrently with
/// a reader — see the concurrency discipline in the crate docs.
pub struct SplitterIndex {
    inner: RwLock<FxHashSet<u64>>,
}

impl SplitterIndex {
    /// Builds an index preloaded with `splitters` (e.g. when reopening an archive).
    #[must_use]
    pub fn from_values(splitters: impl IntoIterator<Item = u64>) -> Self {
        Self {
            inner: RwLock::new(splitters.into_iter().collect()),
        }
    }

    /// Empty index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(FxHashSet::default()),
        }
    }

    /// Wait-free-ish membership check: many readers may call this concurrently.
    #[must_use]
    pub fn check(&self, value: u64) -> bool {
        #[expect(clippy::unwrap_used, reason = "lock is never held across a panic in this crate")]
        self.inner.read().unwrap().contains(&value)
    }

    /// Inserts `value`. Not safe to call concurrently with readers; callers
    /// must only use this from the barrier-synchronized new-splitters phase,
    /// single-threaded or otherwise exclusive of `check`.
    pub fn insert_fast(&self, value: u64) {
        #[expect(clippy::unwrap_used, reason = "lock is never held across a panic in this crate")]
        self.inner.write().unwrap().insert(value);
    }

    /// Bulk-inserts `values`, taking the write lock once.
    pub fn insert_all(&self, values: impl IntoIterator<Item = u64>) {
        #[expect(clippy::unwrap_used, reason = "lock is never held across a panic in this crate")]
        let mut guard = self.inner.write().unwrap();
        guard.extend(values);
    }

    /// Number of splitters currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        #[expect(clippy::unwrap_used, reason = "lock is never held across a panic in this crate")]
        self.inner.read().unwrap().len()
    }

    /// Whether the index holds no splitters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all splitter values, sorted ascending (used by `MetadataWriter`).
    #[must_use]
    pub fn sorted_values(&self) -> Vec<u64> {
        #[expect(clippy::unwrap_used, reason = "lock is never held across a panic in this crate")]
        let guard = self.inner.read().unwrap();
        let mut v: Vec<u64> = guard.iter().copied().collect();
        v.sort_unstable();
        v
    }
}

impl Default for SplitterIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_and_insert() {
        let index = SplitterIndex::new();
        assert!(!index.check(42));
        index.insert_fast(42);
        assert!(index.check(42));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn sorted_values_are_ascending() {
        let index = SplitterIndex::from_values([5, 1, 3]);
        assert_eq!(index.sorted_values(), vec![1, 3, 5]);
    }

    #[test]
    fn concurrent_readers_see_consistent_snapshots() {
        use std::sync::Arc;
        let index = Arc::new(SplitterIndex::from_values(0..1000));
        let mut handles = vec![];
        for _ in 0..8 {
            let index = index.clone();
            handles.push(std::thread::spawn(move || {
                for v in 0..1000 {
                    assert!(index.check(v));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}
