// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Reproducibility-mode staging area between `SegmentRouter` and the
//! segment groups: buffers segment records until a barrier, then resolves
//! and distributes them in a deterministic order.

use crate::segment_map::{Fingerprint, SegmentMap};
use std::sync::Mutex;

/// One segment awaiting resolution: its payload plus enough identity to
/// sort deterministically and to re-derive orientation once its group is
/// known.
#[derive(Debug, Clone)]
pub struct SegPartRecord {
    /// Sample this segment's contig belongs to.
    pub sample: String,
    /// Contig name within the sample.
    pub contig: String,
    /// Index of this segment within its contig.
    pub seg_part_no: u32,
    /// Segment bytes (already oriented per `is_rc`).
    pub payload: Vec<u8>,
    /// Whether `payload` is stored reverse-complemented.
    pub is_rc: bool,
}

/// Reproducibility-mode staging buffer. Accepts segment records tagged as
/// either "known" (their fingerprint already resolved to a group) or "new"
/// (first sighting of a fingerprint this batch), then provides the three
/// barrier-phase operations that turn both piles into a deterministic,
/// per-group work assignment.
#[derive(Default)]
pub struct BufferedSegParts {
    known: Mutex<Vec<(u32, SegPartRecord)>>,
    new: Mutex<Vec<(Fingerprint, SegPartRecord)>>,
}

impl BufferedSegParts {
    /// Empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers a segment whose fingerprint already resolved to `group_id`.
    pub fn push_known(&self, group_id: u32, record: SegPartRecord) {
        self.known.lock().expect("lock is poisoned").push((group_id, record));
    }

    /// Buffers a segment whose fingerprint has not yet been seen this batch.
    pub fn push_new(&self, pk: Fingerprint, record: SegPartRecord) {
        self.new.lock().expect("lock is poisoned").push((pk, record));
    }

    /// Orders the known pile by `(group_id, sample, contig, seg_part_no)`
    /// so that per-group distribution is deterministic regardless of the
    /// order workers happened to push records in.
    pub fn sort_known(&self) {
        let mut known = self.known.lock().expect("lock is poisoned");
        known.sort_by(|(ga, a), (gb, b)| {
            ga.cmp(gb)
                .then_with(|| a.sample.cmp(&b.sample))
                .then_with(|| a.contig.cmp(&b.contig))
                .then_with(|| a.seg_part_no.cmp(&b.seg_part_no))
        });
    }

    /// Sorts the new pile by `(fingerprint, sample, contig, seg_part_no)`,
    /// allocates a fresh group id per distinct fingerprint (in that sorted
    /// order, via `map`), and migrates the resolved records into the known
    /// pile. Returns the number of freshly allocated groups.
    pub fn process_new(&self, map: &SegmentMap) -> u32 {
        let mut new = self.new.lock().expect("lock is poisoned");
        new.sort_by(|(pa, a), (pb, b)| {
            pa.cmp(pb)
                .then_with(|| a.sample.cmp(&b.sample))
                .then_with(|| a.contig.cmp(&b.contig))
                .then_with(|| a.seg_part_no.cmp(&b.seg_part_no))
        });

        let mut known = self.known.lock().expect("lock is poisoned");
        let mut fresh_groups = 0u32;
        let mut current_pk: Option<Fingerprint> = None;
        let mut current_group = 0u32;

        for (pk, record) in new.drain(..) {
            if current_pk != Some(pk) {
                current_group = map.insert_new(pk);
                current_pk = Some(pk);
                fresh_groups += 1;
            }
            known.push((current_group, record));
        }
        fresh_groups
    }

    /// Partitions the (already sorted) known pile into contiguous
    /// per-group runs, in ascending group id order, for worker threads to
    /// drain in parallel.
    #[must_use]
    pub fn distribute_segments(&self) -> Vec<(u32, Vec<SegPartRecord>)> {
        let known = self.known.lock().expect("lock is poisoned");
        let mut out: Vec<(u32, Vec<SegPartRecord>)> = Vec::new();
        for (group_id, record) in known.iter() {
            match out.last_mut() {
                Some((last_group, records)) if *last_group == *group_id => records.push(record.clone()),
                _ => out.push((*group_id, vec![record.clone()])),
            }
        }
        out
    }

    /// Clears both piles, e.g. after a batch has been fully drained to groups.
    pub fn clear(&self) {
        self.known.lock().expect("lock is poisoned").clear();
        self.new.lock().expect("lock is poisoned").clear();
    }

    /// Total number of records currently buffered across both piles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.known.lock().expect("lock is poisoned").len() + self.new.lock().expect("lock is poisoned").len()
    }

    /// Whether both piles are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment_map::fingerprint;

    fn record(contig: &str, seg_part_no: u32) -> SegPartRecord {
        SegPartRecord {
            sample: "s".to_string(),
            contig: contig.to_string(),
            seg_part_no,
            payload: vec![1, 2, 3],
            is_rc: false,
        }
    }

    #[test]
    fn process_new_allocates_one_group_per_distinct_fingerprint() {
        let map = SegmentMap::new(4);
        let buffer = BufferedSegParts::new();
        buffer.push_new(fingerprint(10, 20), record("c1", 0));
        buffer.push_new(fingerprint(10, 20), record("c1", 1));
        buffer.push_new(fingerprint(30, 40), record("c2", 0));

        let fresh = buffer.process_new(&map);
        assert_eq!(fresh, 2);
        assert_eq!(buffer.distribute_segments().iter().map(|(_, v)| v.len()).sum::<usize>(), 3);
    }

    #[test]
    fn distribution_groups_are_contiguous_after_sort_known() {
        let map = SegmentMap::new(0);
        let buffer = BufferedSegParts::new();
        buffer.push_new(fingerprint(1, 2), record("c1", 0));
        buffer.push_known(0, record("c0", 0));
        buffer.process_new(&map);
        buffer.sort_known();

        let groups = buffer.distribute_segments();
        let group_ids: Vec<u32> = groups.iter().map(|(g, _)| *g).collect();
        let mut sorted = group_ids.clone();
        sorted.sort_unstable();
        assert_eq!(group_ids, sorted);
    }

    #[test]
    fn determinism_is_independent_of_push_order() {
        let map_a = SegmentMap::new(0);
        let buffer_a = BufferedSegParts::new();
        buffer_a.push_new(fingerprint(5, 6), record("c2", 0));
        buffer_a.push_new(fingerprint(1, 2), record("c1", 0));
        let fresh_a = buffer_a.process_new(&map_a);

        let map_b = SegmentMap::new(0);
        let buffer_b = BufferedSegParts::new();
        buffer_b.push_new(fingerprint(1, 2), record("c1", 0));
        buffer_b.push_new(fingerprint(5, 6), record("c2", 0));
        let fresh_b = buffer_b.process_new(&map_b);

        assert_eq!(fresh_a, fresh_b);
        assert_eq!(map_a.lookup(fingerprint(1, 2)), map_b.lookup(fingerprint(1, 2)));
        assert_eq!(map_a.lookup(fingerprint(5, 6)), map_b.lookup(fingerprint(5, 6)));
    }
}
