// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{DecodeError, EncodeError};

/// Represents errors that can occur while building or appending to an archive.
#[derive(Debug)]
pub enum Error {
    /// I/O error.
    Io(std::io::Error),

    /// Serialization failed.
    Encode(EncodeError),

    /// Deserialization failed.
    Decode(DecodeError),

    /// A genome file could not be opened or read; the caller should skip it and continue.
    InputUnreadable {
        /// Path of the file that could not be read.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A `(sample, contig)` pair was already registered; the caller should skip this contig.
    DuplicateSampleContig {
        /// Sample name.
        sample: String,
        /// Contig name.
        contig: String,
    },

    /// The underlying archive container failed a write. Fatal.
    ArchiveIo(std::io::Error),

    /// An existing archive is missing a stream or has a truncated varint on append. Fatal.
    CorruptArchive(&'static str),

    /// The allocator could not satisfy a request. Bubbled up, never recovered.
    OutOfMemory,
}

impl Error {
    /// Returns `true` for errors that the pipeline logs and continues past
    /// (one bad input file or contig does not invalidate the rest of a run).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InputUnreadable { .. } | Self::DuplicateSampleContig { .. }
        )
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Encode(e) => write!(f, "encode error: {e}"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
            Self::InputUnreadable { path, source } => {
                write!(f, "could not read input file {path:?}: {source}")
            }
            Self::DuplicateSampleContig { sample, contig } => {
                write!(f, "duplicate (sample, contig) registration: ({sample}, {contig})")
            }
            Self::ArchiveIo(e) => write!(f, "archive write failed: {e}"),
            Self::CorruptArchive(what) => write!(f, "corrupt archive: {what}"),
            Self::OutOfMemory => write!(f, "out of memory"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) | Self::ArchiveIo(e) | Self::InputUnreadable { source: e, .. } => Some(e),
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
