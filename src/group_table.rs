// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The segment-vector: group id -> [`SegmentGroup`] instance, behind a
//! reader-writer lock that is only ever taken exclusively to double the
//! backing storage.

use crate::archive::StreamArchive;
use crate::compression::BlockCompressor;
use crate::segment_group::{AnchorSegmentGroup, SegmentGroup};
use std::sync::{Arc, RwLock};

/// Indexable collection of live segment groups, growable by doubling.
/// Readers (the common case: routing a segment into an already-existing
/// group) only need a shared reference into the current vector; only a
/// resize needs the write lock.
pub struct GroupTable {
    groups: RwLock<Vec<Arc<dyn SegmentGroup>>>,
    min_match_len: u32,
}

impl GroupTable {
    /// Creates a table pre-populated with `no_raw_groups` raw-capable groups.
    #[must_use]
    pub fn new(no_raw_groups: u32, min_match_len: u32) -> Self {
        let groups = (0..no_raw_groups.max(1))
            .map(|_| Arc::new(AnchorSegmentGroup::new(min_match_len)) as Arc<dyn SegmentGroup>)
            .collect();
        Self {
            groups: RwLock::new(groups),
            min_match_len,
        }
    }

    /// Fetches the group at `id`, growing the table (doubling capacity) if
    /// `id` is not yet populated.
    #[must_use]
    pub fn get_or_create(&self, id: u32) -> Arc<dyn SegmentGroup> {
        {
            let groups = self.groups.read().expect("lock is poisoned");
            if let Some(group) = groups.get(id as usize) {
                return Arc::clone(group);
            }
        }

        let mut groups = self.groups.write().expect("lock is poisoned");
        if (id as usize) >= groups.len() {
            let mut new_len = groups.len().max(1);
            while new_len <= id as usize {
                new_len *= 2;
            }
            groups.resize_with(new_len, || Arc::new(AnchorSegmentGroup::new(self.min_match_len)));
        }
        Arc::clone(groups.get(id as usize).expect("just resized past id"))
    }

    /// Fetches an already-populated group, if any. Used by read-only paths
    /// (the one-splitter extension heuristic scanning existing candidates)
    /// that must not trigger a resize.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<Arc<dyn SegmentGroup>> {
        self.groups.read().expect("lock is poisoned").get(id as usize).cloned()
    }

    /// Number of slots currently allocated (including never-written ones
    /// created by a doubling resize).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.groups.read().expect("lock is poisoned").len()
    }

    /// Finalizes every group, writing its reference and delta streams.
    pub fn finalize_all(&self, archive: &dyn StreamArchive, compressor: &dyn BlockCompressor) -> crate::Result<()> {
        let groups = self.groups.read().expect("lock is poisoned");
        for (id, group) in groups.iter().enumerate() {
            group.finalize(id as u32, archive, compressor)?;
        }
        Ok(())
    }
}
