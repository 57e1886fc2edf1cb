//! The inspection tool's work: parse a container file, optionally relocate
//! one root child, write back, and render the tree.

use std::io::{Seek, SeekFrom};
use std::path::Path;

use anyhow::{Context, Result};

use crate::chunk::header::read_id;
use crate::chunk::{standard_resolver, ChunkNode, Dialect, GroupChunk};
use crate::config::Options;
use crate::dump::format_tree;
use crate::io::{open_for_reading, open_for_update, Storage};

/// Dialect of the container in `store`, judged from its root chunk id
pub fn detect_dialect(store: &mut dyn Storage) -> Result<Dialect> {
    store.seek(SeekFrom::Start(0))?;
    let id = read_id(store).context("Failed to read root chunk id")?;
    Dialect::for_root_id(id).with_context(|| {
        format!(
            "Cannot detect the dialect of a container starting with '{}'; pass --dialect",
            id
        )
    })
}

/// Parse the root group of `store` and apply the requested edits.
/// Returns the rendered tree after any changes.
pub fn process(store: &mut dyn Storage, options: &Options) -> Result<String> {
    let dialect = match options.dialect {
        Some(dialect) => dialect,
        None => detect_dialect(store)?,
    };
    log::info!("Reading container as {}", dialect);

    store.seek(SeekFrom::Start(0))?;
    let resolver = standard_resolver(options.group_ids.iter().copied());
    let mut root = GroupChunk::read_from(store, dialect, &resolver)
        .with_context(|| format!("Failed to parse root chunk as {}", dialect))?;
    root.set_copy_window(options.copy_window);

    if let Some(id) = options.move_to_end {
        let moved = root
            .move_to_end_by_id(store, id)
            .with_context(|| format!("Failed to move '{}' to the end of '{}'", id, root.id()))?;
        if moved {
            log::info!("Moved '{}' to the end of '{}'", id, root.id());
        } else {
            log::info!("'{}' is already the last chunk", id);
        }
    }

    if options.write {
        let wrote = root.flush(store).context("Failed to write chunk headers")?;
        log::debug!("Flush wrote headers: {}", wrote);
    }

    Ok(format!("{}\n{}", dialect, format_tree(&root)))
}

/// Open `path` (for update when `options.write` is set) and [`process`] it
pub fn run(path: &Path, options: &Options) -> Result<String> {
    let mut file = if options.write {
        open_for_update(path)?
    } else {
        open_for_reading(path)?
    };
    process(&mut file, options).with_context(|| format!("While processing {:?}", path))
}
