//! Bulk chunks
//!
//! Large payloads (sample data, embedded files) are never buffered. A
//! `BulkChunk` hands out a [`ChunkStream`] that implements `Read`, `Write`
//! and `Seek` over the payload with its own logical cursor.
//!
//! The store's physical cursor is shared with every other chunk handle, so
//! each stream operation first moves it back to `data_location + cursor` if
//! something else moved it, then records where the operation left it.

use std::io::{self, Read, Seek, SeekFrom, Write};

use super::base::Chunk;
use super::dialect::Dialect;
use super::header::ChunkId;
use super::node::{self, ChildResolver, ChunkNode, NewChunk, Result};
use crate::io::{sync_cursor, Storage};

/// Chunk whose payload is accessed as a stream
#[derive(Debug, Clone)]
pub struct BulkChunk {
    chunk: Chunk,
    /// Logical position within the payload, independent of the store's cursor
    cursor: u64,
}

impl BulkChunk {
    /// Read a bulk chunk header at the current position
    pub fn read_from(store: &mut dyn Storage, dialect: Dialect) -> Result<Self> {
        node::read_as(store, dialect, &ChildResolver::default())
    }

    /// Write a new, empty bulk chunk at the current position
    pub fn create(store: &mut dyn Storage, dialect: Dialect, id: ChunkId) -> Result<Self> {
        node::create_as(store, dialect, id, 0, &ChildResolver::default())
    }

    /// Stream over the payload, backed by `store`
    pub fn stream<'a>(&'a mut self, store: &'a mut dyn Storage) -> ChunkStream<'a> {
        ChunkStream { chunk: self, store }
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn len(&self) -> u64 {
        self.chunk.stored_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChunkNode for BulkChunk {
    fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    fn chunk_mut(&mut self) -> &mut Chunk {
        &mut self.chunk
    }

    fn kind_name(&self) -> &'static str {
        "bulk"
    }

    fn write_body(&mut self, store: &mut dyn Storage) -> Result<()> {
        self.chunk.write_body(store)
    }
}

impl NewChunk for BulkChunk {
    fn from_chunk(chunk: Chunk, _resolver: &ChildResolver) -> Self {
        Self { chunk, cursor: 0 }
    }
}

/// `Read + Write + Seek` view of a [`BulkChunk`] payload
pub struct ChunkStream<'a> {
    chunk: &'a mut BulkChunk,
    store: &'a mut dyn Storage,
}

impl ChunkStream<'_> {
    /// Re-seek the store if another handle moved its cursor
    fn resync(&mut self) -> io::Result<u64> {
        let data = self.chunk.chunk.data_location();
        sync_cursor(&mut *self.store, data + self.chunk.cursor)?;
        Ok(data)
    }

    /// Save where the store's cursor ended up as the logical cursor
    fn record(&mut self, data: u64) -> io::Result<()> {
        self.chunk.cursor = self.store.stream_position()?.saturating_sub(data);
        Ok(())
    }

    pub fn position(&self) -> u64 {
        self.chunk.cursor
    }

    pub fn len(&self) -> u64 {
        self.chunk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk.is_empty()
    }
}

impl Read for ChunkStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let size = self.chunk.len();
        if self.chunk.cursor >= size || buf.is_empty() {
            return Ok(0);
        }
        let count = (buf.len() as u64).min(size - self.chunk.cursor) as usize;
        let data = self.resync()?;
        let n = self.store.read(&mut buf[..count])?;
        self.record(data)?;
        Ok(n)
    }
}

impl Write for ChunkStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let data = self.resync()?;
        let n = self.store.write(buf)?;
        self.record(data)?;
        if self.chunk.cursor > self.chunk.len() {
            self.chunk.chunk.extend_to(self.chunk.cursor);
        }
        Ok(n)
    }

    /// Rewrites the header if the payload grew, then flushes the store
    fn flush(&mut self) -> io::Result<()> {
        if !ChunkNode::flush(&mut *self.chunk, &mut *self.store)? {
            self.store.flush()?;
        }
        Ok(())
    }
}

impl Seek for ChunkStream<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::End(offset) => self.chunk.len() as i128 + offset as i128,
            SeekFrom::Current(offset) => self.chunk.cursor as i128 + offset as i128,
        };
        if target < 0 || target > u64::MAX as i128 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            ));
        }
        self.chunk.cursor = target as u64;
        Ok(self.chunk.cursor)
    }
}
