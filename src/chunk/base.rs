//! Base chunk
//!
//! A `Chunk` is a bounded window onto the shared backing store: a header at
//! `start_location`, `data_byte_size` bytes of payload, and one pad byte when
//! that size is odd. Stream-style `read`/`write`/`seek` work directly on the
//! store's physical cursor, relative to the payload.
//!
//! Growing a chunk by writing past its end assumes nothing follows it in the
//! store. Only grow the last chunk of a group, or relocate the chunk with
//! `GroupChunk::move_to_end` first; growing an interior chunk overwrites its
//! next sibling. Group flushes detect the resulting overlap.

use std::io::SeekFrom;

use super::dialect::Dialect;
use super::header::{self, ChunkHeader, ChunkId};
use super::node::{self, ChildResolver, ChunkError, ChunkNode, NewChunk, Result};
use crate::io::{read_limited, read_up_to, sync_cursor, write_zeros, Storage};

/// Metadata of one chunk, and the base chunk kind itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    id: ChunkId,
    dialect: Dialect,
    /// Absolute offset of the header
    start_location: u64,
    /// Payload size as last set; derived kinds only use it for the declared size
    data_byte_size: u64,
    /// Size currently recorded in the on-disk header
    flushed_size: u64,
    /// Header held the RF64 sentinel
    extended_size: bool,
    /// Explicit "header must be rewritten" flag
    dirty: bool,
}

impl Chunk {
    /// Metadata for a header just decoded at `start`
    pub(crate) fn from_header(start: u64, dialect: Dialect, header: &ChunkHeader) -> Self {
        Self {
            id: header.id,
            dialect,
            start_location: start,
            data_byte_size: header.data_byte_size,
            flushed_size: header.data_byte_size,
            extended_size: header.extended_size,
            dirty: false,
        }
    }

    /// Metadata for a chunk about to be written at `start`
    pub(crate) fn placed(id: ChunkId, dialect: Dialect, start: u64) -> Self {
        Self {
            id,
            dialect,
            start_location: start,
            data_byte_size: 0,
            flushed_size: 0,
            extended_size: false,
            dirty: true,
        }
    }

    /// Read a chunk header at the current position of `store`
    pub fn read_from(store: &mut dyn Storage, dialect: Dialect) -> Result<Self> {
        node::read_as(store, dialect, &ChildResolver::default())
    }

    /// Write a new, empty chunk at the current position of `store`
    pub fn create(store: &mut dyn Storage, dialect: Dialect, id: ChunkId) -> Result<Self> {
        Self::create_with_size(store, dialect, id, 0)
    }

    /// Write a new chunk with `initial_size` zeroed payload bytes
    pub fn create_with_size(
        store: &mut dyn Storage,
        dialect: Dialect,
        id: ChunkId,
        initial_size: u64,
    ) -> Result<Self> {
        node::create_as(store, dialect, id, initial_size, &ChildResolver::default())
    }

    pub fn id(&self) -> ChunkId {
        self.id
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn start_location(&self) -> u64 {
        self.start_location
    }

    pub fn header_byte_size(&self) -> u64 {
        self.dialect.header_byte_size()
    }

    pub fn data_location(&self) -> u64 {
        self.start_location + self.header_byte_size()
    }

    pub fn is_extended_size(&self) -> bool {
        self.extended_size
    }

    /// Install the true payload size of an extended (RF64) chunk, as found in
    /// the container's size lookup chunk. Does not mark the header dirty.
    pub fn resolve_extended_size(&mut self, size: u64) {
        self.data_byte_size = size;
        self.flushed_size = size;
    }

    pub(crate) fn stored_size(&self) -> u64 {
        self.data_byte_size
    }

    pub(crate) fn set_stored_size(&mut self, size: u64) {
        self.data_byte_size = size;
    }

    pub(crate) fn flushed_size(&self) -> u64 {
        self.flushed_size
    }

    pub(crate) fn is_marked_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn shift(&mut self, delta: i64) {
        self.start_location = self.start_location.saturating_add_signed(delta);
    }

    /// Grow the payload to `size` bytes; the header is rewritten on the next flush
    pub(crate) fn extend_to(&mut self, size: u64) {
        if size > self.data_byte_size {
            log::trace!(
                "Chunk '{}' grows from {} to {} bytes",
                self.id,
                self.data_byte_size,
                size
            );
            self.data_byte_size = size;
            self.dirty = true;
        }
    }

    pub(crate) fn write_header_at_start(&mut self, store: &mut dyn Storage, size: u64) -> Result<()> {
        sync_cursor(store, self.start_location)?;
        self.extended_size = header::write_header(store, &self.dialect, self.id, size)?;
        self.flushed_size = size;
        self.dirty = false;
        Ok(())
    }

    /// Current position within the payload, clamped to `[0, data_byte_size]`
    pub fn position(&self, store: &mut dyn Storage) -> Result<u64> {
        let physical = store.stream_position()?;
        Ok(physical
            .saturating_sub(self.data_location())
            .min(self.data_byte_size))
    }

    /// Read payload bytes at the current position. Never reads past the payload.
    pub fn read(&mut self, store: &mut dyn Storage, buf: &mut [u8]) -> Result<usize> {
        let pos = self.position(store)?;
        let count = (buf.len() as u64).min(self.data_byte_size - pos) as usize;
        if count == 0 {
            return Ok(0);
        }
        sync_cursor(store, self.data_location() + pos)?;
        Ok(read_up_to(store, &mut buf[..count])?)
    }

    /// Write payload bytes at the current position, growing the chunk if needed
    pub fn write(&mut self, store: &mut dyn Storage, buf: &[u8]) -> Result<()> {
        let pos = self.position(store)?;
        sync_cursor(store, self.data_location() + pos)?;
        store.write_all(buf)?;
        self.extend_to(pos + buf.len() as u64);
        Ok(())
    }

    /// Seek relative to the payload.
    ///
    /// `Start` counts from the payload start, `End` from the padded end, and
    /// `Current` moves the store's cursor directly. Returns the new position
    /// relative to the payload start.
    pub fn seek(&mut self, store: &mut dyn Storage, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => self.data_location() as i128 + offset as i128,
            SeekFrom::End(offset) => ChunkNode::end_location(self) as i128 + offset as i128,
            SeekFrom::Current(offset) => store.stream_position()? as i128 + offset as i128,
        };
        if target < 0 || target > u64::MAX as i128 {
            return Err(ChunkError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek to an invalid position",
            )));
        }
        let target = target as u64;
        store.seek(SeekFrom::Start(target))?;
        Ok(target.saturating_sub(self.data_location()))
    }

    /// Read the whole payload into memory.
    /// A payload cut short by the end of the store comes back truncated.
    pub fn read_all(&mut self, store: &mut dyn Storage) -> Result<Vec<u8>> {
        sync_cursor(store, self.data_location())?;
        Ok(read_limited(store, self.data_byte_size)?)
    }
}

impl ChunkNode for Chunk {
    fn chunk(&self) -> &Chunk {
        self
    }

    fn chunk_mut(&mut self) -> &mut Chunk {
        self
    }

    fn kind_name(&self) -> &'static str {
        "raw"
    }

    fn write_body(&mut self, store: &mut dyn Storage) -> Result<()> {
        if self.data_byte_size > 0 {
            sync_cursor(store, self.data_location())?;
            write_zeros(store, self.data_byte_size)?;
        }
        Ok(())
    }
}

impl NewChunk for Chunk {
    fn from_chunk(chunk: Chunk, _resolver: &ChildResolver) -> Self {
        chunk
    }
}
