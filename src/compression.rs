// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The generic block compressor is an external collaborator (ZSTD-style,
//! with thread-local contexts); this module pins down a minimal trait for
//! it plus a real ZSTD-backed implementation.

/// A generic byte-block compressor. Implementations are expected to keep
/// their compression/decompression state thread-local; this crate never
/// shares a [`BlockCompressor`] across worker threads.
pub trait BlockCompressor: Send + Sync {
    /// Compresses `data` at the given level.
    fn compress(&self, data: &[u8], level: i32) -> crate::Result<Vec<u8>>;

    /// Decompresses a block produced by [`BlockCompressor::compress`].
    fn decompress(&self, data: &[u8]) -> crate::Result<Vec<u8>>;
}

/// Compression level used for reference bytes and delta streams (see the
/// archive stream table): `seg-<g>-ref`/`seg-<g>-delta` use level 19,
/// `collection-details` uses 19 per batch, `collection-main` uses 15.
pub const LEVEL_SEGMENT: i32 = 19;
/// Compression level for `collection-main`.
pub const LEVEL_COLLECTION_MAIN: i32 = 15;

#[cfg(feature = "zstd")]
mod zstd_impl {
    use super::BlockCompressor;
    use crate::error::Error;

    /// [`BlockCompressor`] backed by `zstd`, matching the `ZSTD lvl 19`/`lvl 15`
    /// streams named in the archive stream table. Each call builds its own
    /// (de)compression context, scoped to the calling worker thread and
    /// never shared across threads — the same discipline the spec asks of a
    /// production implementation's pooled thread-local contexts, just
    /// without the pool.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct ZstdCompressor;

    impl BlockCompressor for ZstdCompressor {
        fn compress(&self, data: &[u8], level: i32) -> crate::Result<Vec<u8>> {
            zstd::encode_all(data, level).map_err(Error::ArchiveIo)
        }

        fn decompress(&self, data: &[u8]) -> crate::Result<Vec<u8>> {
            zstd::decode_all(data).map_err(Error::ArchiveIo)
        }
    }
}

#[cfg(feature = "zstd")]
pub use zstd_impl::ZstdCompressor;
