//! Value chunks
//!
//! Small payloads that live fully in memory as a typed value: numbers,
//! GUIDs, identifiers, fixed records. The payload size is always derived
//! from the encoded value, so changing the value's length marks the header
//! dirty without any explicit bookkeeping.
//!
//! A value that is not its group's last child must not change length in
//! place; move it to the end first. Group flushes reject the gap or overlap
//! a resize would leave.

use std::fmt;

use super::base::Chunk;
use super::dialect::{ByteOrder, Dialect};
use super::header::ChunkId;
use super::node::{self, ChildResolver, ChunkError, ChunkNode, NewChunk, Result};
use crate::io::{read_limited, sync_cursor, Storage};

/// Conversion between a typed value and its on-disk payload bytes
pub trait ChunkValue: fmt::Debug {
    /// Encoded payload, or `None` for an empty payload
    fn value_bytes(&self, order: ByteOrder) -> Option<Vec<u8>>;

    /// Replace the value with one decoded from `bytes`
    fn set_value_bytes(&mut self, bytes: &[u8], order: ByteOrder) -> Result<()>;
}

macro_rules! impl_numeric_value {
    ($($ty:ty),*) => {
        $(
            impl ChunkValue for $ty {
                fn value_bytes(&self, order: ByteOrder) -> Option<Vec<u8>> {
                    Some(match order {
                        ByteOrder::Little => self.to_le_bytes().to_vec(),
                        ByteOrder::Big => self.to_be_bytes().to_vec(),
                    })
                }

                fn set_value_bytes(&mut self, bytes: &[u8], order: ByteOrder) -> Result<()> {
                    let raw: [u8; std::mem::size_of::<$ty>()] = bytes.try_into().map_err(|_| {
                        ChunkError::Value(format!(
                            "expected {} bytes for {}, got {}",
                            std::mem::size_of::<$ty>(),
                            stringify!($ty),
                            bytes.len()
                        ))
                    })?;
                    *self = match order {
                        ByteOrder::Little => <$ty>::from_le_bytes(raw),
                        ByteOrder::Big => <$ty>::from_be_bytes(raw),
                    };
                    Ok(())
                }
            }
        )*
    };
}

impl_numeric_value!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl ChunkValue for Vec<u8> {
    fn value_bytes(&self, _order: ByteOrder) -> Option<Vec<u8>> {
        Some(self.clone())
    }

    fn set_value_bytes(&mut self, bytes: &[u8], _order: ByteOrder) -> Result<()> {
        self.clear();
        self.extend_from_slice(bytes);
        Ok(())
    }
}

impl ChunkValue for String {
    fn value_bytes(&self, _order: ByteOrder) -> Option<Vec<u8>> {
        Some(self.as_bytes().to_vec())
    }

    fn set_value_bytes(&mut self, bytes: &[u8], _order: ByteOrder) -> Result<()> {
        *self = String::from_utf8(bytes.to_vec())
            .map_err(|e| ChunkError::Value(format!("payload is not UTF-8: {}", e)))?;
        Ok(())
    }
}

impl ChunkValue for ChunkId {
    fn value_bytes(&self, _order: ByteOrder) -> Option<Vec<u8>> {
        Some(self.as_bytes().to_vec())
    }

    fn set_value_bytes(&mut self, bytes: &[u8], _order: ByteOrder) -> Result<()> {
        *self = ChunkId::from_slice(bytes)?;
        Ok(())
    }
}

/// Absent values produce an empty payload; an empty payload reads back as `None`
impl<V: ChunkValue + Default> ChunkValue for Option<V> {
    fn value_bytes(&self, order: ByteOrder) -> Option<Vec<u8>> {
        self.as_ref().and_then(|v| v.value_bytes(order))
    }

    fn set_value_bytes(&mut self, bytes: &[u8], order: ByteOrder) -> Result<()> {
        if bytes.is_empty() {
            *self = None;
            return Ok(());
        }
        let mut value = V::default();
        value.set_value_bytes(bytes, order)?;
        *self = Some(value);
        Ok(())
    }
}

/// 128-bit GUID laid out as `u32, u16, u16, [u8; 8]`, the first three fields
/// in the container's byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-",
            self.data1, self.data2, self.data3, self.data4[0], self.data4[1]
        )?;
        for b in &self.data4[2..] {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl ChunkValue for Guid {
    fn value_bytes(&self, order: ByteOrder) -> Option<Vec<u8>> {
        let mut out = Vec::with_capacity(16);
        out.extend(self.data1.value_bytes(order)?);
        out.extend(self.data2.value_bytes(order)?);
        out.extend(self.data3.value_bytes(order)?);
        out.extend_from_slice(&self.data4);
        Some(out)
    }

    fn set_value_bytes(&mut self, bytes: &[u8], order: ByteOrder) -> Result<()> {
        if bytes.len() != 16 {
            return Err(ChunkError::Value(format!(
                "expected 16 bytes for a GUID, got {}",
                bytes.len()
            )));
        }
        self.data1.set_value_bytes(&bytes[0..4], order)?;
        self.data2.set_value_bytes(&bytes[4..6], order)?;
        self.data3.set_value_bytes(&bytes[6..8], order)?;
        self.data4.copy_from_slice(&bytes[8..16]);
        Ok(())
    }
}

/// Chunk whose payload is a fully materialized typed value
#[derive(Debug, Clone)]
pub struct ValueChunk<V> {
    chunk: Chunk,
    value: V,
    /// Value changed since it was last written
    value_dirty: bool,
}

impl<V: ChunkValue + 'static> ValueChunk<V> {
    /// Value chunk not yet placed in any store
    pub(crate) fn with_value(chunk: Chunk, value: V) -> Self {
        Self {
            chunk,
            value,
            value_dirty: true,
        }
    }

    /// Read a value chunk at the current position
    pub fn read_from(store: &mut dyn Storage, dialect: Dialect) -> Result<Self>
    where
        V: Default,
    {
        node::read_as(store, dialect, &ChildResolver::default())
    }

    /// Write a new value chunk at the current position
    pub fn create(store: &mut dyn Storage, dialect: Dialect, id: ChunkId, value: V) -> Result<Self> {
        let start = store.stream_position()?;
        let mut node = Self::with_value(Chunk::placed(id, dialect, start), value);
        node::create_node(&mut node, store)?;
        Ok(node)
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    /// Replace the value; written on the next flush
    pub fn set(&mut self, value: V) {
        self.value = value;
        self.value_dirty = true;
    }

    /// Mutable access; the value is treated as changed
    pub fn value_mut(&mut self) -> &mut V {
        self.value_dirty = true;
        &mut self.value
    }

    pub fn into_value(self) -> V {
        self.value
    }

    fn encoded(&self) -> Option<Vec<u8>> {
        self.value.value_bytes(self.chunk.dialect().byte_order())
    }
}

impl<V: ChunkValue + 'static> ChunkNode for ValueChunk<V> {
    fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    fn chunk_mut(&mut self) -> &mut Chunk {
        &mut self.chunk
    }

    fn kind_name(&self) -> &'static str {
        "value"
    }

    fn data_byte_size(&self) -> u64 {
        self.encoded().map_or(0, |bytes| bytes.len() as u64)
    }

    fn header_dirty(&self) -> bool {
        self.value_dirty
            || self.chunk.is_marked_dirty()
            || self.data_byte_size() != self.chunk.flushed_size()
    }

    fn read_body(&mut self, store: &mut dyn Storage) -> Result<()> {
        let declared = self.chunk.stored_size();
        sync_cursor(store, self.chunk.data_location())?;
        let buf = read_limited(store, declared)?;
        if (buf.len() as u64) < declared {
            return Err(ChunkError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "value chunk '{}' truncated: {} of {} bytes",
                    self.chunk.id(),
                    buf.len(),
                    declared
                ),
            )));
        }
        let order = self.chunk.dialect().byte_order();
        self.value.set_value_bytes(&buf, order)?;
        self.value_dirty = false;
        Ok(())
    }

    fn write_body(&mut self, store: &mut dyn Storage) -> Result<()> {
        let bytes = self.encoded().unwrap_or_default();
        sync_cursor(store, self.chunk.data_location())?;
        store.write_all(&bytes)?;
        self.chunk.set_stored_size(bytes.len() as u64);
        self.value_dirty = false;
        Ok(())
    }

    fn flush(&mut self, store: &mut dyn Storage) -> Result<bool> {
        if !self.header_dirty() {
            return Ok(false);
        }
        self.write_body(store)?;
        self.write_header(store)?;
        self.write_padding(store)?;
        store.flush()?;
        Ok(true)
    }
}

impl<V: ChunkValue + Default + 'static> NewChunk for ValueChunk<V> {
    fn from_chunk(chunk: Chunk, _resolver: &ChildResolver) -> Self {
        Self {
            chunk,
            value: V::default(),
            value_dirty: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::InstrumentedStore;
    use std::io::{Cursor, Seek, SeekFrom};

    const WAVE_PCM: Guid = Guid::new(
        0x0000_0001,
        0x0000,
        0x0010,
        [0x80, 0x00, 0x00, 0xaa, 0x00, 0x38, 0x9b, 0x71],
    );

    #[test]
    fn test_numeric_value_bytes_follow_byte_order() {
        assert_eq!(
            0x1234_5678u32.value_bytes(ByteOrder::Little).unwrap(),
            vec![0x78, 0x56, 0x34, 0x12]
        );
        assert_eq!(
            0x1234_5678u32.value_bytes(ByteOrder::Big).unwrap(),
            vec![0x12, 0x34, 0x56, 0x78]
        );

        let mut v = 0u16;
        v.set_value_bytes(&[0x01, 0x02], ByteOrder::Big).unwrap();
        assert_eq!(v, 0x0102);
        assert!(matches!(
            v.set_value_bytes(&[1, 2, 3], ByteOrder::Big),
            Err(ChunkError::Value(_))
        ));
    }

    #[test]
    fn test_guid_layout_and_display() {
        let bytes = WAVE_PCM.value_bytes(ByteOrder::Little).unwrap();
        assert_eq!(
            bytes,
            vec![
                0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xaa, 0x00,
                0x38, 0x9b, 0x71
            ]
        );
        assert_eq!(WAVE_PCM.to_string(), "00000001-0000-0010-8000-00aa00389b71");

        let mut parsed = Guid::default();
        parsed.set_value_bytes(&bytes, ByteOrder::Little).unwrap();
        assert_eq!(parsed, WAVE_PCM);
    }

    #[test]
    fn test_option_value_empty_payload() {
        let none: Option<u32> = None;
        assert_eq!(none.value_bytes(ByteOrder::Little), None);

        let mut v: Option<u32> = Some(3);
        v.set_value_bytes(&[], ByteOrder::Little).unwrap();
        assert_eq!(v, None);
    }

    #[test]
    fn test_create_and_read_value_chunk() {
        let mut store = Cursor::new(Vec::new());
        let chunk =
            ValueChunk::create(&mut store, Dialect::RIFF, ChunkId::new(*b"rate"), 44_100u32).unwrap();
        assert_eq!(chunk.data_byte_size(), 4);
        assert!(!chunk.header_dirty());
        assert_eq!(
            store.get_ref().as_slice(),
            b"rate\x04\x00\x00\x00\x44\xac\x00\x00"
        );

        store.seek(SeekFrom::Start(0)).unwrap();
        let read = ValueChunk::<u32>::read_from(&mut store, Dialect::RIFF).unwrap();
        assert_eq!(*read.value(), 44_100);
        assert!(!read.header_dirty());
    }

    #[test]
    fn test_size_change_self_detects() {
        let mut store = Cursor::new(Vec::new());
        let mut chunk = ValueChunk::create(
            &mut store,
            Dialect::IFF,
            ChunkId::new(*b"NAME"),
            String::from("ab"),
        )
        .unwrap();
        assert!(!chunk.header_dirty());

        chunk.value_mut().push('c');
        assert_eq!(chunk.data_byte_size(), 3);
        assert!(chunk.header_dirty());

        assert!(chunk.flush(&mut store).unwrap());
        assert!(!chunk.header_dirty());
        assert_eq!(store.get_ref().as_slice(), b"NAME\x00\x00\x00\x03abc\x00");
    }

    #[test]
    fn test_flush_without_change_is_free() {
        let mut store = InstrumentedStore::new(Cursor::new(Vec::new()));
        let mut chunk =
            ValueChunk::create(&mut store, Dialect::RIFF, ChunkId::new(*b"guid"), WAVE_PCM)
                .unwrap();
        store.reset_counters();
        assert!(!chunk.flush(&mut store).unwrap());
        assert_eq!(store.counters().writes, 0);

        chunk.set(Guid::default());
        assert!(chunk.flush(&mut store).unwrap());
        assert!(store.counters().writes > 0);
    }

    #[test]
    fn test_truncated_value_is_error() {
        let mut store = Cursor::new(b"rate\x04\x00\x00\x00\x44\xac".to_vec());
        let err = ValueChunk::<u32>::read_from(&mut store, Dialect::RIFF).unwrap_err();
        assert!(matches!(err, ChunkError::Io(_)));
    }

    fn assert_eof(err: ChunkError) {
        match err {
            ChunkError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("expected an end-of-data error, got {:?}", other),
        }
    }

    #[test]
    fn test_huge_declared_size_fails_without_allocating() {
        // 64-bit size field at the i64::MAX clamp, four bytes of payload
        let mut bytes = b"name".to_vec();
        bytes.extend_from_slice(&(i64::MAX as u64).to_le_bytes());
        bytes.extend_from_slice(b"abcd");
        let mut store = Cursor::new(bytes);
        let err = ValueChunk::<Vec<u8>>::read_from(&mut store, Dialect::RIFF64).unwrap_err();
        assert_eof(err);
    }

    #[test]
    fn test_unresolved_extended_value_is_error() {
        let mut store = Cursor::new(b"name\xff\xff\xff\xffabcd".to_vec());
        let err = ValueChunk::<Vec<u8>>::read_from(&mut store, Dialect::RF64).unwrap_err();
        assert_eof(err);
    }
}
