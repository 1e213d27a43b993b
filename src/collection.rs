// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The collection metadata store is an external collaborator: it maps
//! `sample -> contig -> segment-sequence`. This module pins down the
//! contract plus an in-memory reference implementation that
//! `MetadataWriter` serializes at close.

use crate::router::RoutedSegment;
use rustc_hash::FxHashMap;
use std::sync::RwLock;

/// Maps `(sample, contig)` to the ordered sequence of routed segments that
/// reconstruct it.
pub trait Collection: Send + Sync {
    /// Registers a new `(sample, contig)` pair. Returns
    /// `Error::DuplicateSampleContig` if already registered; the caller
    /// logs and skips that contig rather than treating it as fatal.
    fn register_sample_contig(&self, sample: &str, contig: &str) -> crate::Result<()>;

    /// Records the ordered segment sequence for an already-registered
    /// `(sample, contig)` pair.
    fn record_segment_sequence(&self, sample: &str, contig: &str, segments: Vec<RoutedSegment>) -> crate::Result<()>;

    /// All registered samples, in first-registration order.
    fn samples(&self) -> Vec<String>;

    /// All contigs registered for `sample`, in first-registration order.
    fn contigs(&self, sample: &str) -> Vec<String>;

    /// The recorded segment sequence for `(sample, contig)`, if any.
    fn segments(&self, sample: &str, contig: &str) -> Option<Vec<RoutedSegment>>;
}

#[derive(Default)]
struct Inner {
    sample_order: Vec<String>,
    contig_order: FxHashMap<String, Vec<String>>,
    segments: FxHashMap<(String, String), Vec<RoutedSegment>>,
}

/// Reference [`Collection`]: an in-memory map guarded by a single lock,
/// preserving registration order for deterministic serialization.
#[derive(Default)]
pub struct InMemoryCollection {
    inner: RwLock<Inner>,
}

impl InMemoryCollection {
    /// Empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Collection for InMemoryCollection {
    fn register_sample_contig(&self, sample: &str, contig: &str) -> crate::Result<()> {
        let mut inner = self.inner.write().expect("lock is poisoned");
        let key = (sample.to_string(), contig.to_string());
        if inner.segments.contains_key(&key) || inner.contig_order.get(sample).is_some_and(|c| c.contains(&contig.to_string())) {
            return Err(crate::Error::DuplicateSampleContig {
                sample: sample.to_string(),
                contig: contig.to_string(),
            });
        }
        if !inner.contig_order.contains_key(sample) {
            inner.sample_order.push(sample.to_string());
        }
        inner.contig_order.entry(sample.to_string()).or_default().push(contig.to_string());
        Ok(())
    }

    fn record_segment_sequence(&self, sample: &str, contig: &str, segments: Vec<RoutedSegment>) -> crate::Result<()> {
        let mut inner = self.inner.write().expect("lock is poisoned");
        inner.segments.insert((sample.to_string(), contig.to_string()), segments);
        Ok(())
    }

    fn samples(&self) -> Vec<String> {
        self.inner.read().expect("lock is poisoned").sample_order.clone()
    }

    fn contigs(&self, sample: &str) -> Vec<String> {
        self.inner
            .read()
            .expect("lock is poisoned")
            .contig_order
            .get(sample)
            .cloned()
            .unwrap_or_default()
    }

    fn segments(&self, sample: &str, contig: &str) -> Option<Vec<RoutedSegment>> {
        self.inner
            .read()
            .expect("lock is poisoned")
            .segments
            .get(&(sample.to_string(), contig.to_string()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_is_rejected() {
        let collection = InMemoryCollection::new();
        collection.register_sample_contig("s1", "c1").unwrap();
        let err = collection.register_sample_contig("s1", "c1").unwrap_err();
        assert!(matches!(err, crate::Error::DuplicateSampleContig { .. }));
    }

    #[test]
    fn samples_and_contigs_preserve_registration_order() {
        let collection = InMemoryCollection::new();
        collection.register_sample_contig("s2", "a").unwrap();
        collection.register_sample_contig("s1", "b").unwrap();
        collection.register_sample_contig("s2", "c").unwrap();
        assert_eq!(collection.samples(), vec!["s2", "s1"]);
        assert_eq!(collection.contigs("s2"), vec!["a", "c"]);
    }
}
