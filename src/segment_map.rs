// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `(k1,k2) -> group_id` mapping plus the `k -> sorted neighbors` adjacency.

use crate::kmer::NONE;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

/// Unordered pair of terminal splitter values, `k1 <= k2`, with [`NONE`] as
/// the "no splitter on this side" sentinel. Keys [`SegmentMap`].
pub type Fingerprint = (u64, u64);

/// Builds a fingerprint from two terminal values in canonical (`k1 <= k2`) order.
#[must_use]
pub fn fingerprint(a: u64, b: u64) -> Fingerprint {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// The reserved fingerprint `(⊥,⊥)`, pre-assigned group id 0.
#[must_use]
pub fn reserved_fingerprint() -> Fingerprint {
    (NONE, NONE)
}

struct Inner {
    groups: FxHashMap<Fingerprint, u32>,
    adjacency: FxHashMap<u64, Vec<u64>>,
}

/// Maps segment fingerprints to group ids and maintains the symmetric,
/// sorted adjacency between splitters that have co-occurred as a segment's
/// two termini.
///
/// A single exclusive lock guards both maps together, so that invariant 2
/// (symmetric, sorted adjacency) never observes a half-applied insert. In
/// reproducibility mode, `insert_new` is only ever called from worker 0
/// during the `registration` barrier phase, so contention never occurs;
/// in standard mode many workers may call it concurrently and the lock
/// serializes them, exactly as the single-mutex design in the spec's
/// concurrency section calls for.
pub struct SegmentMap {
    inner: RwLock<Inner>,
    no_segments: AtomicU32,
}

impl SegmentMap {
    /// Creates a map with the reserved fingerprint `(⊥,⊥) -> 0` and the
    /// group-id counter seeded past the raw-group band, so the first
    /// non-reserved insert allocates `no_raw_groups`.
    #[must_use]
    pub fn new(no_raw_groups: u32) -> Self {
        let mut groups = FxHashMap::default();
        groups.insert(reserved_fingerprint(), 0);
        Self {
            inner: RwLock::new(Inner {
                groups,
                adjacency: FxHashMap::default(),
            }),
            no_segments: AtomicU32::new(no_raw_groups.max(1)),
        }
    }

    /// Rebuilds a map from a previously-serialized list of
    /// `(fingerprint, group_id)` pairs (used on archive append).
    #[must_use]
    pub fn from_entries(no_raw_groups: u32, entries: impl IntoIterator<Item = (Fingerprint, u32)>) -> Self {
        let map = Self::new(no_raw_groups);
        let mut max_group = no_raw_groups.saturating_sub(1);
        {
            #[expect(clippy::unwrap_used, reason = "freshly constructed, uncontended lock")]
            let mut inner = map.inner.write().unwrap();
            for (pk, g) in entries {
                inner.groups.insert(pk, g);
                max_group = max_group.max(g);
                if pk.0 != NONE {
                    insert_adjacency(&mut inner.adjacency, pk.0, pk.1);
                }
                if pk.1 != NONE && pk.1 != pk.0 {
                    insert_adjacency(&mut inner.adjacency, pk.1, pk.0);
                }
            }
        }
        map.no_segments.store(max_group + 1, Ordering::SeqCst);
        map
    }

    /// Looks up the group id for `pk`, if already resolved.
    #[must_use]
    pub fn lookup(&self, pk: Fingerprint) -> Option<u32> {
        #[expect(clippy::unwrap_used, reason = "lock is never held across a panic in this crate")]
        self.inner.read().unwrap().groups.get(&pk).copied()
    }

    /// Allocates a fresh group id for `pk`, records the mapping, and updates
    /// adjacency for both non-sentinel sides. Never re-keys an existing
    /// fingerprint: callers must `lookup` first under the same lock
    /// discipline described on [`SegmentMap`] to avoid double-allocating.
    pub fn insert_new(&self, pk: Fingerprint) -> u32 {
        #[expect(clippy::unwrap_used, reason = "lock is never held across a panic in this crate")]
        let mut inner = self.inner.write().unwrap();
        if let Some(existing) = inner.groups.get(&pk) {
            return *existing;
        }
        let g = self.no_segments.fetch_add(1, Ordering::SeqCst);
        inner.groups.insert(pk, g);
        if pk.0 != NONE {
            insert_adjacency(&mut inner.adjacency, pk.0, pk.1);
        }
        if pk.1 != NONE && pk.1 != pk.0 {
            insert_adjacency(&mut inner.adjacency, pk.1, pk.0);
        }
        g
    }

    /// Sorted, duplicate-free snapshot of `k`'s neighbors.
    #[must_use]
    pub fn neighbors(&self, k: u64) -> Vec<u64> {
        #[expect(clippy::unwrap_used, reason = "lock is never held across a panic in this crate")]
        self.inner
            .read()
            .unwrap()
            .adjacency
            .get(&k)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of allocated groups (including the raw-group band).
    #[must_use]
    pub fn no_segments(&self) -> u32 {
        self.no_segments.load(Ordering::SeqCst)
    }

    /// All non-reserved `(fingerprint, group_id)` entries, for `MetadataWriter`.
    #[must_use]
    pub fn entries(&self) -> Vec<(Fingerprint, u32)> {
        #[expect(clippy::unwrap_used, reason = "lock is never held across a panic in this crate")]
        self.inner
            .read()
            .unwrap()
            .groups
            .iter()
            .filter(|(pk, _)| **pk != reserved_fingerprint())
            .map(|(pk, g)| (*pk, *g))
            .collect()
    }
}

fn insert_adjacency(adjacency: &mut FxHashMap<u64, Vec<u64>>, k: u64, neighbor: u64) {
    if neighbor == NONE {
        return;
    }
    let list = adjacency.entry(k).or_default();
    if let Err(pos) = list.binary_search(&neighbor) {
        list.insert(pos, neighbor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_fingerprint_is_group_zero() {
        let map = SegmentMap::new(4);
        assert_eq!(map.lookup(reserved_fingerprint()), Some(0));
        assert_eq!(map.no_segments(), 4);
    }

    #[test]
    fn insert_new_allocates_sequential_ids_past_raw_band() {
        let map = SegmentMap::new(4);
        let g1 = map.insert_new(fingerprint(10, 20));
        let g2 = map.insert_new(fingerprint(30, 40));
        assert_eq!(g1, 4);
        assert_eq!(g2, 5);
    }

    #[test]
    fn insert_new_is_idempotent_for_same_fingerprint() {
        let map = SegmentMap::new(4);
        let g1 = map.insert_new(fingerprint(10, 20));
        let g2 = map.insert_new(fingerprint(10, 20));
        assert_eq!(g1, g2);
        assert_eq!(map.no_segments(), 5);
    }

    #[test]
    fn adjacency_is_symmetric_and_sorted() {
        let map = SegmentMap::new(0);
        map.insert_new(fingerprint(10, 20));
        map.insert_new(fingerprint(10, 5));
        assert_eq!(map.neighbors(10), vec![5, 20]);
        assert_eq!(map.neighbors(20), vec![10]);
        assert_eq!(map.neighbors(5), vec![10]);
    }

    #[test]
    fn one_sided_fingerprint_does_not_touch_sentinel_adjacency() {
        let map = SegmentMap::new(0);
        map.insert_new(fingerprint(10, NONE));
        assert_eq!(map.neighbors(10), Vec::<u64>::new());
        assert!(map.neighbors(NONE).is_empty());
    }
}
