// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The byte-stream archive container is an external collaborator; this
//! module pins down its contract plus a directory-backed reference
//! implementation (one file per named stream, length-prefixed parts).

use crate::coding::varint;
use crate::error::Error;
use rustc_hash::FxHashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Named append-only byte streams, each a sequence of parts; every part
/// carries a compressed-size header and a raw-size hint, and any part can
/// be read back by id.
pub trait StreamArchive: Send + Sync {
    /// Registers a new stream, idempotent if it already exists.
    fn register_stream(&self, name: &str) -> crate::Result<()>;

    /// Appends a part to `name`, returning its part id (0-based, in append order).
    fn add_part(&self, name: &str, compressed: &[u8], raw_size_hint: u32) -> crate::Result<u32>;

    /// Reads back part `part_id` of stream `name` as `(compressed_bytes, raw_size_hint)`.
    fn get_part(&self, name: &str, part_id: u32) -> crate::Result<(Vec<u8>, u32)>;

    /// Number of parts written to `name` so far.
    fn part_count(&self, name: &str) -> crate::Result<u32>;

    /// Ensures every registered stream's writes have reached stable storage.
    fn flush(&self) -> crate::Result<()>;
}

struct StreamHandle {
    file: File,
    /// `(offset, compressed_len, raw_size_hint)` per part, in append order.
    index: Vec<(u64, u32, u32)>,
}

/// [`StreamArchive`] backed by one regular file per stream under a
/// directory. Each part is written as
/// `varint(compressed_len) varint(raw_size_hint) <compressed bytes>`.
pub struct FileStreamArchive {
    dir: PathBuf,
    streams: Mutex<FxHashMap<String, StreamHandle>>,
}

impl FileStreamArchive {
    /// Creates (or reuses) `dir` as the archive's backing directory.
    pub fn create<P: AsRef<Path>>(dir: P) -> crate::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            streams: Mutex::new(FxHashMap::default()),
        })
    }

    /// Reopens an existing archive directory, rebuilding each stream's
    /// part index by scanning its file from the start.
    pub fn open<P: AsRef<Path>>(dir: P) -> crate::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut streams = FxHashMap::default();
        if dir.is_dir() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                let mut file = OpenOptions::new().read(true).write(true).open(entry.path())?;
                let index = scan_index(&mut file)?;
                streams.insert(name, StreamHandle { file, index });
            }
        } else {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(Self {
            dir,
            streams: Mutex::new(streams),
        })
    }

    fn stream_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

fn scan_index(file: &mut File) -> crate::Result<Vec<(u64, u32, u32)>> {
    file.seek(SeekFrom::Start(0))?;
    let mut index = Vec::new();
    let mut offset = 0u64;
    let len = file.metadata()?.len();
    while offset < len {
        let compressed_len = varint::read(file).map_err(|_| Error::CorruptArchive("truncated varint in stream part header"))?;
        let raw_size_hint = varint::read(file).map_err(|_| Error::CorruptArchive("truncated varint in stream part header"))?;
        let header_end = file.stream_position()?;
        index.push((header_end, compressed_len, raw_size_hint));
        file.seek(SeekFrom::Start(header_end + u64::from(compressed_len)))?;
        offset = header_end + u64::from(compressed_len);
    }
    Ok(index)
}

impl StreamArchive for FileStreamArchive {
    fn register_stream(&self, name: &str) -> crate::Result<()> {
        let mut streams = self.streams.lock().expect("lock is poisoned");
        if streams.contains_key(name) {
            return Ok(());
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.stream_path(name))?;
        streams.insert(name.to_string(), StreamHandle { file, index: Vec::new() });
        Ok(())
    }

    fn add_part(&self, name: &str, compressed: &[u8], raw_size_hint: u32) -> crate::Result<u32> {
        let mut streams = self.streams.lock().expect("lock is poisoned");
        let handle = streams
            .get_mut(name)
            .ok_or(Error::CorruptArchive("add_part on an unregistered stream"))?;

        handle.file.seek(SeekFrom::End(0))?;
        let mut header = Vec::new();
        varint::write(&mut header, compressed.len() as u32).map_err(Error::ArchiveIo)?;
        varint::write(&mut header, raw_size_hint).map_err(Error::ArchiveIo)?;
        handle.file.write_all(&header)?;
        let header_end = handle.file.stream_position()?;
        handle.file.write_all(compressed)?;

        handle.index.push((header_end, compressed.len() as u32, raw_size_hint));
        Ok((handle.index.len() - 1) as u32)
    }

    fn get_part(&self, name: &str, part_id: u32) -> crate::Result<(Vec<u8>, u32)> {
        let mut streams = self.streams.lock().expect("lock is poisoned");
        let handle = streams
            .get_mut(name)
            .ok_or(Error::CorruptArchive("get_part on an unregistered stream"))?;
        let &(offset, compressed_len, raw_size_hint) = handle
            .index
            .get(part_id as usize)
            .ok_or(Error::CorruptArchive("part id out of range"))?;

        handle.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; compressed_len as usize];
        handle.file.read_exact(&mut buf)?;
        Ok((buf, raw_size_hint))
    }

    fn part_count(&self, name: &str) -> crate::Result<u32> {
        let streams = self.streams.lock().expect("lock is poisoned");
        let handle = streams
            .get(name)
            .ok_or(Error::CorruptArchive("part_count on an unregistered stream"))?;
        Ok(handle.index.len() as u32)
    }

    fn flush(&self) -> crate::Result<()> {
        let mut streams = self.streams.lock().expect("lock is poisoned");
        for handle in streams.values_mut() {
            handle.file.flush()?;
            handle.file.sync_data()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_parts_through_a_fresh_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FileStreamArchive::create(dir.path()).unwrap();
        archive.register_stream("splitters").unwrap();
        let id = archive.add_part("splitters", b"hello", 5).unwrap();
        assert_eq!(id, 0);
        let (bytes, raw_size) = archive.get_part("splitters", 0).unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(raw_size, 5);
    }

    #[test]
    fn reopen_rebuilds_the_index() {
        let dir = tempfile::tempdir().unwrap();
        {
            let archive = FileStreamArchive::create(dir.path()).unwrap();
            archive.register_stream("params").unwrap();
            archive.add_part("params", b"one", 3).unwrap();
            archive.add_part("params", b"two!", 4).unwrap();
            archive.flush().unwrap();
        }
        let reopened = FileStreamArchive::open(dir.path()).unwrap();
        assert_eq!(reopened.part_count("params").unwrap(), 2);
        assert_eq!(reopened.get_part("params", 1).unwrap().0, b"two!");
    }

    #[test]
    fn unregistered_stream_is_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FileStreamArchive::create(dir.path()).unwrap();
        let err = archive.add_part("nope", b"x", 1).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive(_)));
    }
}
