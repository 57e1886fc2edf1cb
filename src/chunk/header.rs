//! Chunk header codec
//!
//! A header is a 4-byte identifier followed by a length field whose width
//! and byte order come from the [`Dialect`]:
//!
//! ```text
//! [id: 4 bytes][size: 2, 4 or 8 bytes]
//! ```
//!
//! Oversized lengths are capped rather than rejected. Under RF64 a capped
//! 32-bit field is the sentinel `0xFFFFFFFF` and the header is flagged as
//! extended; the real size lives in a separate lookup chunk.

use std::fmt;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};

use super::dialect::{AddressWidth, ByteOrder, Dialect};
use super::node::{ChunkError, Result};
use crate::io::{read_up_to, Storage};

/// 32-bit size value meaning "look up the real size elsewhere" under RF64
pub const EXTENDED_SIZE_SENTINEL: u32 = 0xFFFF_FFFF;

/// Largest size a 64-bit length field is decoded to (the host's max signed offset)
pub const MAX_DECODED_SIZE: u64 = i64::MAX as u64;

/// Four-byte chunk or group type identifier.
///
/// IFF identifiers are conventionally printable ASCII, but any four bytes
/// are accepted.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChunkId([u8; 4]);

impl ChunkId {
    pub const RIFF: ChunkId = ChunkId(*b"RIFF");
    pub const RF64: ChunkId = ChunkId(*b"RF64");
    pub const FORM: ChunkId = ChunkId(*b"FORM");
    pub const LIST: ChunkId = ChunkId(*b"LIST");
    pub const CAT: ChunkId = ChunkId(*b"CAT ");
    pub const PROP: ChunkId = ChunkId(*b"PROP");
    /// Four spaces, used as the form type of groups created without one
    pub const BLANK: ChunkId = ChunkId(*b"    ");

    pub const fn new(bytes: [u8; 4]) -> Self {
        ChunkId(bytes)
    }

    /// Build an id from a slice, which must be exactly 4 bytes long
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; 4] = bytes
            .try_into()
            .map_err(|_| ChunkError::InvalidId { len: bytes.len() })?;
        Ok(ChunkId(raw))
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// True if all four bytes are printable ASCII (space included)
    pub fn is_printable(&self) -> bool {
        self.0.iter().all(|b| (0x20..=0x7e).contains(b))
    }
}

impl From<[u8; 4]> for ChunkId {
    fn from(bytes: [u8; 4]) -> Self {
        ChunkId(bytes)
    }
}

impl From<&[u8; 4]> for ChunkId {
    fn from(bytes: &[u8; 4]) -> Self {
        ChunkId(*bytes)
    }
}

impl TryFrom<&[u8]> for ChunkId {
    type Error = ChunkError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        ChunkId::from_slice(bytes)
    }
}

impl TryFrom<&str> for ChunkId {
    type Error = ChunkError;

    fn try_from(s: &str) -> Result<Self> {
        ChunkId::from_slice(s.as_bytes())
    }
}

impl PartialEq<[u8; 4]> for ChunkId {
    fn eq(&self, other: &[u8; 4]) -> bool {
        &self.0 == other
    }
}

impl PartialEq<&[u8; 4]> for ChunkId {
    fn eq(&self, other: &&[u8; 4]) -> bool {
        &self.0 == *other
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if (0x20..=0x7e).contains(&b) {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId(\"{}\")", self)
    }
}

/// Decoded header of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: ChunkId,
    pub data_byte_size: u64,
    /// Size field held the RF64 sentinel; `data_byte_size` is not the real size
    pub extended_size: bool,
}

/// Read a bare 4-byte identifier
pub fn read_id(store: &mut dyn Storage) -> Result<ChunkId> {
    let mut buf = [0u8; 4];
    let n = read_up_to(store, &mut buf)?;
    ChunkId::from_slice(&buf[..n])
}

/// Write a bare 4-byte identifier
pub fn write_id(store: &mut dyn Storage, id: ChunkId) -> Result<()> {
    store.write_all(id.as_bytes())?;
    Ok(())
}

/// Write a header at the current position.
///
/// Returns whether the header is extended (RF64 sentinel written).
pub fn write_header(
    store: &mut dyn Storage,
    dialect: &Dialect,
    id: ChunkId,
    data_byte_size: u64,
) -> Result<bool> {
    write_id(store, id)?;

    let mut extended = false;
    match dialect.address_width() {
        AddressWidth::Bits16 => {
            let value = data_byte_size.min(u16::MAX as u64) as u16;
            if value as u64 != data_byte_size {
                log::warn!("Chunk '{}' size {} capped to 16 bits", id, data_byte_size);
            }
            match dialect.byte_order() {
                ByteOrder::Little => store.write_u16::<LittleEndian>(value)?,
                ByteOrder::Big => store.write_u16::<BigEndian>(value)?,
            }
        }
        AddressWidth::Bits32 => {
            let value = data_byte_size.min(EXTENDED_SIZE_SENTINEL as u64) as u32;
            if data_byte_size >= EXTENDED_SIZE_SENTINEL as u64 {
                if dialect.has_64bit_lookup() {
                    extended = true;
                } else if data_byte_size > EXTENDED_SIZE_SENTINEL as u64 {
                    log::warn!("Chunk '{}' size {} capped to 32 bits", id, data_byte_size);
                }
            }
            match dialect.byte_order() {
                ByteOrder::Little => store.write_u32::<LittleEndian>(value)?,
                ByteOrder::Big => store.write_u32::<BigEndian>(value)?,
            }
        }
        AddressWidth::Bits64 => match dialect.byte_order() {
            ByteOrder::Little => store.write_u64::<LittleEndian>(data_byte_size)?,
            ByteOrder::Big => store.write_u64::<BigEndian>(data_byte_size)?,
        },
    }

    Ok(extended)
}

/// Read a header at the current position
pub fn read_header(store: &mut dyn Storage, dialect: &Dialect) -> Result<ChunkHeader> {
    let id = read_id(store)?;

    let mut extended_size = false;
    let data_byte_size = match dialect.address_width() {
        AddressWidth::Bits16 => match dialect.byte_order() {
            ByteOrder::Little => store.read_u16::<LittleEndian>()? as u64,
            ByteOrder::Big => store.read_u16::<BigEndian>()? as u64,
        },
        AddressWidth::Bits32 => {
            let value = match dialect.byte_order() {
                ByteOrder::Little => store.read_u32::<LittleEndian>()?,
                ByteOrder::Big => store.read_u32::<BigEndian>()?,
            };
            extended_size = value == EXTENDED_SIZE_SENTINEL && dialect.has_64bit_lookup();
            value as u64
        }
        AddressWidth::Bits64 => {
            let value = match dialect.byte_order() {
                ByteOrder::Little => store.read_u64::<LittleEndian>()?,
                ByteOrder::Big => store.read_u64::<BigEndian>()?,
            };
            if value > MAX_DECODED_SIZE {
                log::debug!("Chunk '{}' size {} clamped to {}", id, value, MAX_DECODED_SIZE);
            }
            value.min(MAX_DECODED_SIZE)
        }
    };

    Ok(ChunkHeader {
        id,
        data_byte_size,
        extended_size,
    })
}
