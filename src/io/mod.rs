//! Backing store and file access
//!
//! Chunks never own the bytes they describe. This module defines the
//! `Storage` seam they read and write through, plus helpers for putting a
//! container file on disk behind it.

pub mod files;
pub mod store;

// Re-exports for convenience
pub use files::{create_container, open_container, open_container_rw, FileError};
pub use store::{
    read_limited, read_up_to, sync_cursor, write_zeros, InstrumentedStore, IoCounters, Storage,
};

use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;

/// Open a container file for inspection, with a descriptive error
pub fn open_for_reading(path: &Path) -> Result<File> {
    open_container(path).with_context(|| format!("Failed to open container {:?}", path))
}

/// Open a container file for in-place edits, with a descriptive error
pub fn open_for_update(path: &Path) -> Result<File> {
    open_container_rw(path)
        .with_context(|| format!("Failed to open container {:?} for writing", path))
}
