//! Chunk node trait, kind dispatch, and the read/create protocol
//!
//! Every chunk kind (base, value, bulk, group) implements [`ChunkNode`].
//! Groups own their children as `Box<dyn ChunkNode>` and pick each child's
//! concrete kind through a [`ChildResolver`] while parsing.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::io::{self, SeekFrom};
use std::rc::Rc;

use super::base::Chunk;
use super::bulk::BulkChunk;
use super::dialect::Dialect;
use super::group::GroupChunk;
use super::header::{self, ChunkHeader, ChunkId};
use crate::io::{sync_cursor, Storage};

/// Errors raised by chunk operations
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("Chunk identifier must be exactly 4 bytes, got {len}")]
    InvalidId { len: usize },

    #[error("Unsupported chunk size field width: {bits} bits")]
    Configuration { bits: u32 },

    #[error("Chunk '{id}' not found in group")]
    NotFound { id: ChunkId },

    #[error("Child index {index} out of range ({len} children)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Regions are not contiguous: left ends at {left_end}, right starts at {right_start}")]
    NonContiguous { left_end: u64, right_start: u64 },

    #[error("Chunk '{id}' ends at {end}, overlapping the sibling starting at {next_start}")]
    Overlap {
        id: ChunkId,
        end: u64,
        next_start: u64,
    },

    #[error("Chunk '{id}' ends at {end}, leaving a gap before the sibling at {next_start}")]
    Gap {
        id: ChunkId,
        end: u64,
        next_start: u64,
    },

    #[error("Group '{id}' has {count} trailing bytes, too few for a chunk header")]
    TrailingBytes { id: ChunkId, count: u64 },

    #[error("Chunk '{id}' is not a {expected} chunk")]
    KindMismatch { id: ChunkId, expected: &'static str },

    #[error("Invalid chunk value: {0}")]
    Value(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<ChunkError> for io::Error {
    fn from(err: ChunkError) -> Self {
        match err {
            ChunkError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// Result type for chunk operations
pub type Result<T> = std::result::Result<T, ChunkError>;

/// Upcast helper so `dyn ChunkNode` can be downcast to its concrete kind.
///
/// Call it on `&dyn ChunkNode`, never on `Box<dyn ChunkNode>` (the box
/// itself is `Any`).
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Behavior shared by every chunk kind.
///
/// Locations are absolute offsets into the backing store. Sizes that a kind
/// derives (group, value) are recomputed on demand; only the start offset is
/// cached.
pub trait ChunkNode: AsAny + fmt::Debug {
    /// Base metadata
    fn chunk(&self) -> &Chunk;

    fn chunk_mut(&mut self) -> &mut Chunk;

    /// Short kind label, used by tree dumps
    fn kind_name(&self) -> &'static str {
        "custom"
    }

    /// Logical payload size, excluding padding
    fn data_byte_size(&self) -> u64 {
        self.chunk().stored_size()
    }

    /// Whether the on-disk header no longer matches this chunk
    fn header_dirty(&self) -> bool {
        let chunk = self.chunk();
        chunk.is_marked_dirty() || self.data_byte_size() != chunk.flushed_size()
    }

    /// Parse the payload. The store is positioned at `data_location()`.
    fn read_body(&mut self, _store: &mut dyn Storage) -> Result<()> {
        Ok(())
    }

    /// Emit the payload of a freshly created chunk.
    fn write_body(&mut self, _store: &mut dyn Storage) -> Result<()> {
        Ok(())
    }

    /// Rewrite the header if it is stale. Returns whether any I/O happened.
    fn flush(&mut self, store: &mut dyn Storage) -> Result<bool> {
        if !self.header_dirty() {
            return Ok(false);
        }
        self.write_header(store)?;
        self.write_padding(store)?;
        store.flush()?;
        Ok(true)
    }

    /// Write the header at `start_location()` using the current size
    fn write_header(&mut self, store: &mut dyn Storage) -> Result<()> {
        let size = self.data_byte_size();
        self.chunk_mut().write_header_at_start(store, size)
    }

    /// Write the alignment byte of an odd-sized payload
    fn write_padding(&mut self, store: &mut dyn Storage) -> Result<()> {
        if self.padding_bytes() == 0 {
            return Ok(());
        }
        sync_cursor(store, self.data_location() + self.data_byte_size())?;
        store.write_all(&[0])?;
        Ok(())
    }

    /// Move the cached location by `delta` bytes after the bytes were relocated
    fn shift(&mut self, delta: i64) {
        self.chunk_mut().shift(delta);
    }

    /// Child chunks, for kinds that have them
    fn children(&self) -> &[Box<dyn ChunkNode>] {
        &[]
    }

    /// Group sub-type tag, for kinds that have one
    fn form_type(&self) -> Option<ChunkId> {
        None
    }

    fn id(&self) -> ChunkId {
        self.chunk().id()
    }

    fn start_location(&self) -> u64 {
        self.chunk().start_location()
    }

    fn header_byte_size(&self) -> u64 {
        self.chunk().header_byte_size()
    }

    fn data_location(&self) -> u64 {
        self.chunk().data_location()
    }

    fn padding_bytes(&self) -> u64 {
        self.data_byte_size() % 2
    }

    fn end_location(&self) -> u64 {
        self.data_location() + self.data_byte_size() + self.padding_bytes()
    }

    /// Header, payload and padding together
    fn total_byte_size(&self) -> u64 {
        self.header_byte_size() + self.data_byte_size() + self.padding_bytes()
    }

    fn is_extended_size(&self) -> bool {
        self.chunk().is_extended_size()
    }
}

/// Kinds that can be built from freshly decoded or freshly placed metadata
pub trait NewChunk: ChunkNode + Sized {
    fn from_chunk(chunk: Chunk, resolver: &ChildResolver) -> Self;
}

/// Builds a boxed node of some concrete kind
pub type NodeFactory = fn(Chunk, &ChildResolver) -> Box<dyn ChunkNode>;

/// Concrete kind chosen for a child chunk while parsing a group
#[derive(Clone, Copy)]
pub enum ChunkKind {
    /// Plain chunk, payload left on disk
    Raw,
    /// Streamed payload with its own cursor
    Bulk,
    /// Nested group
    Group,
    /// Caller-supplied kind, e.g. a typed value chunk
    Custom(NodeFactory),
}

impl fmt::Debug for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkKind::Raw => f.write_str("Raw"),
            ChunkKind::Bulk => f.write_str("Bulk"),
            ChunkKind::Group => f.write_str("Group"),
            ChunkKind::Custom(_) => f.write_str("Custom"),
        }
    }
}

fn boxed_factory<T: NewChunk>(chunk: Chunk, resolver: &ChildResolver) -> Box<dyn ChunkNode> {
    Box::new(T::from_chunk(chunk, resolver))
}

impl ChunkKind {
    /// Kind tag for any constructible node type
    pub fn of<T: NewChunk>() -> Self {
        ChunkKind::Custom(boxed_factory::<T>)
    }

    pub fn instantiate(self, chunk: Chunk, resolver: &ChildResolver) -> Box<dyn ChunkNode> {
        match self {
            ChunkKind::Raw => Box::new(chunk),
            ChunkKind::Bulk => Box::new(BulkChunk::from_chunk(chunk, resolver)),
            ChunkKind::Group => Box::new(GroupChunk::from_chunk(chunk, resolver)),
            ChunkKind::Custom(factory) => factory(chunk, resolver),
        }
    }
}

/// Maps a child header to the kind it should be parsed as.
///
/// Cloning is cheap; nested groups inherit their parent's resolver.
#[derive(Clone)]
pub struct ChildResolver(Rc<dyn Fn(&ChunkHeader) -> ChunkKind>);

impl ChildResolver {
    pub fn new<F>(resolve: F) -> Self
    where
        F: Fn(&ChunkHeader) -> ChunkKind + 'static,
    {
        ChildResolver(Rc::new(resolve))
    }

    pub fn resolve(&self, header: &ChunkHeader) -> ChunkKind {
        (self.0)(header)
    }
}

impl Default for ChildResolver {
    fn default() -> Self {
        default_resolver()
    }
}

impl fmt::Debug for ChildResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChildResolver(..)")
    }
}

/// Resolver that parses every child as the base kind
pub fn default_resolver() -> ChildResolver {
    ChildResolver::new(|_| ChunkKind::Raw)
}

/// Group ids recognized by [`standard_resolver`] when none are given
pub const STANDARD_GROUP_IDS: [ChunkId; 6] = [
    ChunkId::RIFF,
    ChunkId::RF64,
    ChunkId::FORM,
    ChunkId::LIST,
    ChunkId::CAT,
    ChunkId::PROP,
];

/// Resolver that parses the given ids as nested groups and the rest as raw chunks
pub fn standard_resolver<I>(group_ids: I) -> ChildResolver
where
    I: IntoIterator<Item = ChunkId>,
{
    let ids: HashSet<ChunkId> = group_ids.into_iter().collect();
    ChildResolver::new(move |header| {
        if ids.contains(&header.id) {
            ChunkKind::Group
        } else {
            ChunkKind::Raw
        }
    })
}

/// Read one header at the current position and build the chunk metadata
fn read_chunk_metadata(store: &mut dyn Storage, dialect: Dialect) -> Result<(Chunk, ChunkHeader)> {
    let start = store.stream_position()?;
    let header = header::read_header(store, &dialect)?;
    Ok((Chunk::from_header(start, dialect, &header), header))
}

/// Padded end of a chunk as declared by its header, or as resolved by its
/// body reader for extended-size chunks
fn declared_end(chunk: &Chunk) -> u64 {
    let size = chunk.stored_size();
    chunk.data_location() + size + size % 2
}

/// Read a chunk of kind `T` at the current position.
///
/// Leaves the store at the chunk's padded end as declared on disk.
pub fn read_as<T: NewChunk>(
    store: &mut dyn Storage,
    dialect: Dialect,
    resolver: &ChildResolver,
) -> Result<T> {
    let (chunk, _) = read_chunk_metadata(store, dialect)?;
    let mut node = T::from_chunk(chunk, resolver);
    node.read_body(store)?;
    store.seek(SeekFrom::Start(declared_end(node.chunk())))?;
    Ok(node)
}

/// Read a chunk at the current position, letting `resolver` pick its kind.
///
/// Returns the node and the padded end the store was re-synced to.
pub fn read_node(
    store: &mut dyn Storage,
    dialect: Dialect,
    resolver: &ChildResolver,
) -> Result<(Box<dyn ChunkNode>, u64)> {
    let (chunk, header) = read_chunk_metadata(store, dialect)?;
    let kind = resolver.resolve(&header);
    log::trace!(
        "Reading chunk '{}' at {} as {:?} ({} bytes)",
        header.id,
        chunk.start_location(),
        kind,
        header.data_byte_size
    );
    let mut node = kind.instantiate(chunk, resolver);
    node.read_body(store)?;
    let end = declared_end(node.chunk());
    store.seek(SeekFrom::Start(end))?;
    Ok((node, end))
}

/// Two-pass write of a node whose start location is already fixed:
/// placeholder header, body, then a back-patched header if the body changed
/// the size. Leaves the store at the chunk's padded end.
pub(crate) fn create_node(node: &mut dyn ChunkNode, store: &mut dyn Storage) -> Result<()> {
    let placeholder = node.data_byte_size();
    node.write_header(store)?;
    node.write_body(store)?;

    if node.data_byte_size() != placeholder || node.header_dirty() {
        log::trace!(
            "Back-patching header of '{}' at {}: {} -> {} bytes",
            node.id(),
            node.start_location(),
            placeholder,
            node.data_byte_size()
        );
        node.write_header(store)?;
    }
    node.write_padding(store)?;
    store.seek(SeekFrom::Start(node.end_location()))?;
    Ok(())
}

/// Create a chunk of kind `T` at the current position
pub fn create_as<T: NewChunk>(
    store: &mut dyn Storage,
    dialect: Dialect,
    id: ChunkId,
    initial_size: u64,
    resolver: &ChildResolver,
) -> Result<T> {
    let start = store.stream_position()?;
    let mut chunk = Chunk::placed(id, dialect, start);
    chunk.set_stored_size(initial_size);
    let mut node = T::from_chunk(chunk, resolver);
    create_node(&mut node, store)?;
    Ok(node)
}

/// Downcast a node to its concrete kind
pub fn downcast_ref<T: ChunkNode>(node: &dyn ChunkNode) -> Option<&T> {
    node.as_any().downcast_ref::<T>()
}

/// Mutable variant of [`downcast_ref`]
pub fn downcast_mut<T: ChunkNode>(node: &mut dyn ChunkNode) -> Option<&mut T> {
    node.as_any_mut().downcast_mut::<T>()
}
