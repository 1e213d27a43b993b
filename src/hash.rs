//! Small hashing helpers shared by the segment-0 rehash and test fixtures.

/// 64-bit content hash, used to spread segment-0 payloads across the raw-group band.
pub fn hash64(bytes: &[u8]) -> u64 {
    xxhash_rust::xxh3::xxh3_64(bytes)
}
