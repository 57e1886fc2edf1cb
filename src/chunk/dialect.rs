//! Container dialects
//!
//! A dialect fixes how a chunk's length field is laid out: its byte order,
//! its width, and whether an all-ones 32-bit length means "the real size is
//! stored elsewhere" (RF64).

use std::fmt;

use super::header::ChunkId;
use super::node::{ChunkError, Result};

/// Byte order of multi-byte fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
}

/// Width of the chunk length field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressWidth {
    Bits16,
    Bits32,
    Bits64,
}

impl AddressWidth {
    /// Map a bit count to a width, rejecting anything but 16, 32 and 64
    pub fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            16 => Ok(AddressWidth::Bits16),
            32 => Ok(AddressWidth::Bits32),
            64 => Ok(AddressWidth::Bits64),
            other => Err(ChunkError::Configuration { bits: other }),
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            AddressWidth::Bits16 => 16,
            AddressWidth::Bits32 => 32,
            AddressWidth::Bits64 => 64,
        }
    }

    /// Size of the length field in bytes
    pub fn byte_len(self) -> u64 {
        self.bits() as u64 / 8
    }
}

/// Immutable description of one chunk container flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dialect {
    byte_order: ByteOrder,
    address_width: AddressWidth,
    has_64bit_lookup: bool,
}

impl Dialect {
    /// Classic big-endian IFF (EA IFF 85, AIFF)
    pub const IFF: Dialect = Dialect::from_parts(ByteOrder::Big, AddressWidth::Bits32, false);
    /// Little-endian RIFF (WAV, AVI)
    pub const RIFF: Dialect = Dialect::from_parts(ByteOrder::Little, AddressWidth::Bits32, false);
    /// RIFF with 64-bit sizes resolved through an external lookup chunk
    pub const RF64: Dialect = Dialect::from_parts(ByteOrder::Little, AddressWidth::Bits32, true);
    /// Experimental IFF with native 64-bit length fields
    pub const IFF64: Dialect = Dialect::from_parts(ByteOrder::Big, AddressWidth::Bits64, false);
    /// Experimental RIFF with native 64-bit length fields
    pub const RIFF64: Dialect =
        Dialect::from_parts(ByteOrder::Little, AddressWidth::Bits64, false);

    /// The five predefined dialects
    pub const STANDARD: [Dialect; 5] = [
        Dialect::IFF,
        Dialect::RIFF,
        Dialect::RF64,
        Dialect::IFF64,
        Dialect::RIFF64,
    ];

    pub const fn from_parts(
        byte_order: ByteOrder,
        address_width: AddressWidth,
        has_64bit_lookup: bool,
    ) -> Self {
        Self {
            byte_order,
            address_width,
            has_64bit_lookup,
        }
    }

    /// Build a dialect from a raw bit width
    pub fn new(byte_order: ByteOrder, width_bits: u32, has_64bit_lookup: bool) -> Result<Self> {
        let address_width = AddressWidth::from_bits(width_bits)?;
        Ok(Self::from_parts(byte_order, address_width, has_64bit_lookup))
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn address_width(&self) -> AddressWidth {
        self.address_width
    }

    pub fn has_64bit_lookup(&self) -> bool {
        self.has_64bit_lookup
    }

    /// Bytes taken by a chunk header: 4-byte id plus the length field
    pub fn header_byte_size(&self) -> u64 {
        4 + self.address_width.byte_len()
    }

    /// Guess the dialect from a container's root chunk id.
    ///
    /// Only 32-bit dialects can be recognized; the 64-bit ones reuse the same
    /// root ids.
    pub fn for_root_id(id: ChunkId) -> Option<Self> {
        match id.as_bytes() {
            b"RIFF" => Some(Dialect::RIFF),
            // Big-endian RIFF
            b"RIFX" => Some(Self::from_parts(ByteOrder::Big, AddressWidth::Bits32, false)),
            b"RF64" | b"BW64" => Some(Dialect::RF64),
            b"FORM" | b"LIST" | b"CAT " => Some(Dialect::IFF),
            _ => None,
        }
    }

    /// Short conventional name, if this is one of the predefined dialects
    pub fn name(&self) -> Option<&'static str> {
        match *self {
            d if d == Dialect::IFF => Some("IFF"),
            d if d == Dialect::RIFF => Some("RIFF"),
            d if d == Dialect::RF64 => Some("RF64"),
            d if d == Dialect::IFF64 => Some("IFF64"),
            d if d == Dialect::RIFF64 => Some("RIFF64"),
            _ => None,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(
                f,
                "{:?}-endian/{}-bit{}",
                self.byte_order,
                self.address_width.bits(),
                if self.has_64bit_lookup { "/lookup" } else { "" }
            ),
        }
    }
}
