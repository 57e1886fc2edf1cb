// iffkit library
// Generic IFF/RIFF/RF64 chunk container engine plus the inspection tool's support code

pub mod chunk;
pub mod cli;
pub mod config;
pub mod dump;
pub mod inspect;
pub mod io;
pub mod logging;

pub use chunk::{
    BulkChunk, ChildResolver, Chunk, ChunkError, ChunkId, ChunkNode, Dialect, GroupChunk,
    ValueChunk,
};
pub use cli::Cli;
pub use config::Options;
pub use logging::LogLevel;
