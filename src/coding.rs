// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Serialization primitives shared by every on-archive structure, plus the
//! 5-level varint prefix code used for group ids and other small counts.

use std::io::{Read, Write};

/// Error during serialization.
#[derive(Debug)]
pub enum EncodeError {
    /// I/O error.
    Io(std::io::Error),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EncodeError({})",
            match self {
                Self::Io(e) => e.to_string(),
            }
        )
    }
}

impl From<std::io::Error> for EncodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
        }
    }
}

/// Error during deserialization.
#[derive(Debug)]
pub enum DecodeError {
    /// I/O error.
    Io(std::io::Error),
    /// A varint's leading byte did not match any of the five prefix patterns.
    InvalidVarintPrefix(u8),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "DecodeError(io: {e})"),
            Self::InvalidVarintPrefix(b) => write!(f, "DecodeError(invalid varint prefix: {b:#010b})"),
        }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::InvalidVarintPrefix(_) => None,
        }
    }
}

/// Trait to serialize stuff.
pub trait Encode {
    /// Serializes into a writer.
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;

    /// Serializes into a vector.
    fn encode_into_vec(&self) -> Vec<u8> {
        let mut v = vec![];
        self.encode_into(&mut v).expect("writing to a Vec cannot fail");
        v
    }
}

/// Trait to deserialize stuff.
pub trait Decode {
    /// Deserializes from a reader.
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, crate::Error>
    where
        Self: Sized;
}

/// 5-level prefix-coded unsigned integer.
///
/// Thresholds are `2^7`, `2^7+2^14`, `+2^21`, `+2^28`, with an explicit
/// 5-byte escape for anything larger. The top bits of the first byte tell
/// the decoder how many continuation bytes follow, so decoding never needs
/// to look past the prefix.
pub mod varint {
    use super::DecodeError;
    use std::io::{Read, Write};

    const THRESHOLD_1: u32 = 1 << 7;
    const THRESHOLD_2: u32 = THRESHOLD_1 + (1 << 14);
    const THRESHOLD_3: u32 = THRESHOLD_2 + (1 << 21);
    const THRESHOLD_4: u32 = THRESHOLD_3 + (1 << 28);

    const PREFIX_1: u8 = 0b0000_0000;
    const PREFIX_2: u8 = 0b1000_0000;
    const PREFIX_3: u8 = 0b1100_0000;
    const PREFIX_4: u8 = 0b1110_0000;
    const PREFIX_5: u8 = 0b1111_0000;

    const MASK_1: u8 = 0b1000_0000;
    const MASK_2: u8 = 0b1100_0000;
    const MASK_3: u8 = 0b1110_0000;
    const MASK_4: u8 = 0b1111_0000;

    /// Writes `num` using the 5-level prefix code.
    pub fn write<W: Write>(writer: &mut W, num: u32) -> std::io::Result<()> {
        if num < THRESHOLD_1 {
            writer.write_all(&[PREFIX_1 + num as u8])
        } else if num < THRESHOLD_2 {
            let n = num - THRESHOLD_1;
            writer.write_all(&[PREFIX_2 + (n >> 8) as u8, (n & 0xff) as u8])
        } else if num < THRESHOLD_3 {
            let n = num - THRESHOLD_2;
            writer.write_all(&[
                PREFIX_3 + (n >> 16) as u8,
                ((n >> 8) & 0xff) as u8,
                (n & 0xff) as u8,
            ])
        } else if num < THRESHOLD_4 {
            let n = num - THRESHOLD_3;
            writer.write_all(&[
                PREFIX_4 + (n >> 24) as u8,
                ((n >> 16) & 0xff) as u8,
                ((n >> 8) & 0xff) as u8,
                (n & 0xff) as u8,
            ])
        } else {
            let n = num - THRESHOLD_4;
            writer.write_all(&[
                PREFIX_5,
                ((n >> 24) & 0xff) as u8,
                ((n >> 16) & 0xff) as u8,
                ((n >> 8) & 0xff) as u8,
                (n & 0xff) as u8,
            ])
        }
    }

    /// Reads a varint written by [`write`].
    pub fn read<R: Read>(reader: &mut R) -> Result<u32, DecodeError> {
        let mut head = [0u8; 1];
        reader.read_exact(&mut head)?;
        let b0 = head[0];

        if b0 & MASK_1 == PREFIX_1 {
            Ok(u32::from(b0 - PREFIX_1))
        } else if b0 & MASK_2 == PREFIX_2 {
            let mut rest = [0u8; 1];
            reader.read_exact(&mut rest)?;
            let hi = u32::from(b0 - PREFIX_2);
            Ok((hi << 8) + u32::from(rest[0]) + THRESHOLD_1)
        } else if b0 & MASK_3 == PREFIX_3 {
            let mut rest = [0u8; 2];
            reader.read_exact(&mut rest)?;
            let hi = u32::from(b0 - PREFIX_3);
            Ok((hi << 16) + (u32::from(rest[0]) << 8) + u32::from(rest[1]) + THRESHOLD_2)
        } else if b0 & MASK_4 == PREFIX_4 {
            let mut rest = [0u8; 3];
            reader.read_exact(&mut rest)?;
            let hi = u32::from(b0 - PREFIX_4);
            Ok((hi << 24)
                + (u32::from(rest[0]) << 16)
                + (u32::from(rest[1]) << 8)
                + u32::from(rest[2])
                + THRESHOLD_3)
        } else if b0 == PREFIX_5 {
            let mut rest = [0u8; 4];
            reader.read_exact(&mut rest)?;
            Ok((u32::from(rest[0]) << 24)
                + (u32::from(rest[1]) << 16)
                + (u32::from(rest[2]) << 8)
                + u32::from(rest[3])
                + THRESHOLD_4)
        } else {
            Err(DecodeError::InvalidVarintPrefix(b0))
        }
    }

}
