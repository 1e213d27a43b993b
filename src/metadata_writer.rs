// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Final serialization of splitters, the segment map, per-group
//! parameters, and the collection descriptor into the archive's metadata
//! streams.

use crate::archive::StreamArchive;
use crate::coding::{varint, Encode};
use crate::collection::Collection;
use crate::compression::{BlockCompressor, LEVEL_COLLECTION_MAIN};
use crate::config::Config;
use crate::segment_map::SegmentMap;
use crate::splitter_index::SplitterIndex;
use byteorder::{LittleEndian, WriteBytesExt};

/// Crate name and version written to `file_type_info`, matched against on
/// append to detect format drift.
pub const PRODUCER: &str = env!("CARGO_PKG_NAME");
/// Crate version written to `file_type_info`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Writes every metadata stream named in the archive's external-interface
/// contract. Called once, at close, after every segment group has been
/// finalized.
pub struct MetadataWriter<'a> {
    archive: &'a dyn StreamArchive,
    compressor: &'a dyn BlockCompressor,
}

impl<'a> MetadataWriter<'a> {
    /// Creates a writer bound to `archive`, compressing batched streams
    /// with `compressor`.
    #[must_use]
    pub fn new(archive: &'a dyn StreamArchive, compressor: &'a dyn BlockCompressor) -> Self {
        Self { archive, compressor }
    }

    /// Writes `file_type_info`: a flat list of `key\0value\0` pairs.
    pub fn write_file_type_info(&self) -> crate::Result<()> {
        let mut buf = Vec::new();
        for (key, value) in [("producer", PRODUCER), ("version", VERSION)] {
            buf.extend_from_slice(key.as_bytes());
            buf.push(0);
            buf.extend_from_slice(value.as_bytes());
            buf.push(0);
        }
        self.archive.register_stream("file_type_info")?;
        self.archive.add_part("file_type_info", &buf, buf.len() as u32)?;
        Ok(())
    }

    /// Writes `params`: varint-packed `{k, min_match_len, pack_cardinality, segment_size}`.
    pub fn write_params(&self, config: &Config) -> crate::Result<()> {
        let mut buf = Vec::new();
        varint::write(&mut buf, config.k).map_err(crate::Error::ArchiveIo)?;
        varint::write(&mut buf, config.min_match_len).map_err(crate::Error::ArchiveIo)?;
        varint::write(&mut buf, config.pack_cardinality).map_err(crate::Error::ArchiveIo)?;
        varint::write(&mut buf, config.segment_size).map_err(crate::Error::ArchiveIo)?;
        self.archive.register_stream("params")?;
        self.archive.add_part("params", &buf, buf.len() as u32)?;
        Ok(())
    }

    /// Writes `splitters`: sorted ascending 64-bit splitter values.
    pub fn write_splitters(&self, index: &SplitterIndex) -> crate::Result<()> {
        let values = index.sorted_values();
        let mut buf = Vec::with_capacity(values.len() * 8);
        for v in values {
            buf.write_u64::<LittleEndian>(v).map_err(crate::Error::ArchiveIo)?;
        }
        self.archive.register_stream("splitters")?;
        self.archive.add_part("splitters", &buf, buf.len() as u32)?;
        Ok(())
    }

    /// Writes `segment-splitters`: for each non-reserved fingerprint,
    /// `(k1:u64, k2:u64, group_id:varint)`.
    pub fn write_segment_splitters(&self, map: &SegmentMap) -> crate::Result<()> {
        let mut entries = map.entries();
        entries.sort_unstable_by_key(|(pk, g)| (*pk, *g));

        let mut buf = Vec::new();
        for ((k1, k2), group_id) in entries {
            buf.write_u64::<LittleEndian>(k1).map_err(crate::Error::ArchiveIo)?;
            buf.write_u64::<LittleEndian>(k2).map_err(crate::Error::ArchiveIo)?;
            varint::write(&mut buf, group_id).map_err(crate::Error::ArchiveIo)?;
        }
        self.archive.register_stream("segment-splitters")?;
        self.archive.add_part("segment-splitters", &buf, buf.len() as u32)?;
        Ok(())
    }

    /// Writes `collection-main` (the descriptor spine) and
    /// `collection-details` (per-sample segment-list batches), format v2.
    pub fn write_collection(&self, collection: &dyn Collection) -> crate::Result<()> {
        self.archive.register_stream("collection-main")?;
        self.archive.register_stream("collection-details")?;

        let samples = collection.samples();
        let mut spine = Vec::new();
        varint::write(&mut spine, samples.len() as u32).map_err(crate::Error::ArchiveIo)?;
        for sample in &samples {
            let contigs = collection.contigs(sample);
            spine.extend_from_slice(sample.as_bytes());
            spine.push(0);
            varint::write(&mut spine, contigs.len() as u32).map_err(crate::Error::ArchiveIo)?;
        }
        let compressed_spine = self.compressor.compress(&spine, LEVEL_COLLECTION_MAIN)?;
        self.archive.add_part("collection-main", &compressed_spine, spine.len() as u32)?;

        for sample in &samples {
            let mut batch = Vec::new();
            for contig in collection.contigs(sample) {
                let segments = collection.segments(sample, &contig).unwrap_or_default();
                batch.extend_from_slice(contig.as_bytes());
                batch.push(0);
                varint::write(&mut batch, segments.len() as u32).map_err(crate::Error::ArchiveIo)?;
                for segment in &segments {
                    segment.encode_into(&mut batch)?;
                }
            }
            let compressed_batch = self.compressor.compress(&batch, crate::compression::LEVEL_SEGMENT)?;
            self.archive.add_part("collection-details", &compressed_batch, batch.len() as u32)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::FileStreamArchive;
    use crate::collection::InMemoryCollection;
    use crate::compression::ZstdCompressor;
    use crate::segment_map::fingerprint;

    #[test]
    fn writes_every_named_stream() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FileStreamArchive::create(dir.path()).unwrap();
        let compressor = ZstdCompressor;
        let writer = MetadataWriter::new(&archive, &compressor);

        writer.write_file_type_info().unwrap();
        writer.write_params(&Config::default()).unwrap();

        let index = SplitterIndex::from_values([3, 1, 2]);
        writer.write_splitters(&index).unwrap();

        let map = SegmentMap::new(2);
        map.insert_new(fingerprint(10, 20));
        writer.write_segment_splitters(&map).unwrap();

        let collection = InMemoryCollection::new();
        collection.register_sample_contig("s1", "c1").unwrap();
        collection.record_segment_sequence("s1", "c1", vec![]).unwrap();
        writer.write_collection(&collection).unwrap();

        for stream in [
            "file_type_info",
            "params",
            "splitters",
            "segment-splitters",
            "collection-main",
            "collection-details",
        ] {
            assert_eq!(archive.part_count(stream).unwrap(), 1, "{stream} missing a part");
        }
    }

    #[test]
    fn splitters_stream_is_sorted_ascending() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FileStreamArchive::create(dir.path()).unwrap();
        let compressor = ZstdCompressor;
        let writer = MetadataWriter::new(&archive, &compressor);

        let index = SplitterIndex::from_values([30, 10, 20]);
        writer.write_splitters(&index).unwrap();

        let (bytes, _) = archive.get_part("splitters", 0).unwrap();
        let values: Vec<u64> = bytes.chunks_exact(8).map(|c| u64::from_le_bytes(c.try_into().unwrap())).collect();
        assert_eq!(values, vec![10, 20, 30]);
    }
}
