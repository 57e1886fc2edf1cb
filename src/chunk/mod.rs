//! Chunk container engine
//!
//! Reads, creates and edits IFF-family containers (IFF, RIFF, RF64 and the
//! 64-bit variants) directly on a seekable byte store. Nothing is loaded
//! wholesale: chunks only cache their offsets and sizes, and payloads are
//! read or written through the store on demand.
//!
//! # Shared store
//!
//! Every chunk operation takes the store as `&mut dyn Storage`. All chunk
//! handles of one container share that store's single cursor, and each
//! operation re-seeks it only when it is not where the operation expects.
//! There is no locking: access to one container must be serialized by the
//! caller. Groups hold an `Rc` resolver and are not `Send`.
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use iffkit::chunk::{ChildResolver, Chunk, ChunkId, ChunkNode, Dialect, GroupChunk};
//!
//! let mut store = Cursor::new(Vec::new());
//! let mut riff = GroupChunk::create(
//!     &mut store,
//!     Dialect::RIFF,
//!     ChunkId::RIFF,
//!     ChunkId::new(*b"WAVE"),
//!     ChildResolver::default(),
//! )?;
//! riff.add_value(&mut store, b"fact", 0u32)?;
//! riff.add::<Chunk>(&mut store, b"data", 0)?.write(&mut store, b"\x01\x02")?;
//! riff.flush(&mut store)?;
//! assert_eq!(riff.data_byte_size(), 4 + 12 + 10);
//! # Ok::<(), iffkit::chunk::ChunkError>(())
//! ```

pub mod base;
pub mod bulk;
pub mod dialect;
pub mod group;
pub mod header;
pub mod node;
pub mod rotate;
pub mod value;

pub use base::Chunk;
pub use bulk::{BulkChunk, ChunkStream};
pub use dialect::{AddressWidth, ByteOrder, Dialect};
pub use group::GroupChunk;
pub use header::{read_header, write_header, ChunkHeader, ChunkId};
pub use node::{
    default_resolver, downcast_mut, downcast_ref, read_node, standard_resolver, ChildResolver,
    ChunkError, ChunkKind, ChunkNode, NewChunk, Result, STANDARD_GROUP_IDS,
};
pub use value::{ChunkValue, Guid, ValueChunk};
