//! Group chunks (RIFF, LIST, FORM, CAT ...)
//!
//! A group's payload is a 4-byte form type followed by child chunks. The
//! group's size is never stored: it is always `4 + Σ child total sizes`, so
//! adding or growing a child automatically makes the group header stale.
//!
//! Children are kept sorted by `start_location`. New children are appended at
//! the group's current end, which is only safe while the group itself is the
//! last thing in its parent (or the file).

use std::io::SeekFrom;

use super::base::Chunk;
use super::dialect::Dialect;
use super::header::{self, ChunkId};
use super::node::{
    self, downcast_mut, downcast_ref, ChildResolver, ChunkError, ChunkNode, NewChunk, Result,
};
use super::rotate::{self, DEFAULT_WINDOW};
use super::value::{ChunkValue, ValueChunk};
use crate::io::{sync_cursor, Storage};

/// Chunk containing a form type and an ordered list of child chunks
#[derive(Debug)]
pub struct GroupChunk {
    chunk: Chunk,
    form_type: ChunkId,
    children: Vec<Box<dyn ChunkNode>>,
    resolver: ChildResolver,
    /// Buffer size used when relocating children
    copy_window: usize,
}

impl GroupChunk {
    fn placed(chunk: Chunk, form_type: ChunkId, resolver: ChildResolver, copy_window: usize) -> Self {
        Self {
            chunk,
            form_type,
            children: Vec::new(),
            resolver,
            copy_window,
        }
    }

    /// Read a group and all of its descendants at the current position.
    ///
    /// `resolver` picks the kind of every child, including children of
    /// nested groups.
    pub fn read_from(
        store: &mut dyn Storage,
        dialect: Dialect,
        resolver: &ChildResolver,
    ) -> Result<Self> {
        node::read_as(store, dialect, resolver)
    }

    /// Write a new, empty group at the current position
    pub fn create(
        store: &mut dyn Storage,
        dialect: Dialect,
        id: ChunkId,
        form_type: ChunkId,
        resolver: ChildResolver,
    ) -> Result<Self> {
        let start = store.stream_position()?;
        let chunk = Chunk::placed(id, dialect, start);
        let mut group = Self::placed(chunk, form_type, resolver, DEFAULT_WINDOW);
        node::create_node(&mut group, store)?;
        Ok(group)
    }

    pub fn resolver(&self) -> &ChildResolver {
        &self.resolver
    }

    pub fn copy_window(&self) -> usize {
        self.copy_window
    }

    /// Set the buffer size used by [`move_to_end`](Self::move_to_end)
    pub fn set_copy_window(&mut self, bytes: usize) {
        self.copy_window = bytes.max(1);
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn ChunkNode> + '_ {
        self.children.iter().map(|child| child.as_ref())
    }

    pub fn first(&self) -> Option<&dyn ChunkNode> {
        self.children.first().map(|child| child.as_ref())
    }

    pub fn last(&self) -> Option<&dyn ChunkNode> {
        self.children.last().map(|child| child.as_ref())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.children.len() {
            return Err(ChunkError::IndexOutOfRange {
                index,
                len: self.children.len(),
            });
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> Result<&dyn ChunkNode> {
        self.check_index(index)?;
        Ok(self.children[index].as_ref())
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut dyn ChunkNode> {
        self.check_index(index)?;
        Ok(self.children[index].as_mut())
    }

    /// Index of the first child with the given id
    pub fn position(&self, id: impl Into<ChunkId>) -> Option<usize> {
        let id = id.into();
        self.children.iter().position(|child| child.id() == id)
    }

    fn position_or_err(&self, id: ChunkId) -> Result<usize> {
        self.position(id).ok_or(ChunkError::NotFound { id })
    }

    /// First child with the given id
    pub fn find(&self, id: impl Into<ChunkId>) -> Result<&dyn ChunkNode> {
        let index = self.position_or_err(id.into())?;
        Ok(self.children[index].as_ref())
    }

    pub fn find_mut(&mut self, id: impl Into<ChunkId>) -> Result<&mut dyn ChunkNode> {
        let index = self.position_or_err(id.into())?;
        Ok(self.children[index].as_mut())
    }

    /// Child at `index`, as its concrete kind
    pub fn get_as<T: ChunkNode>(&self, index: usize) -> Result<&T> {
        let child = self.get(index)?;
        let id = child.id();
        downcast_ref::<T>(child).ok_or_else(|| kind_mismatch::<T>(id))
    }

    pub fn get_as_mut<T: ChunkNode>(&mut self, index: usize) -> Result<&mut T> {
        let child = self.get_mut(index)?;
        let id = child.id();
        downcast_mut::<T>(child).ok_or_else(|| kind_mismatch::<T>(id))
    }

    /// First child with the given id, as its concrete kind
    pub fn find_as<T: ChunkNode>(&self, id: impl Into<ChunkId>) -> Result<&T> {
        let index = self.position_or_err(id.into())?;
        self.get_as(index)
    }

    pub fn find_as_mut<T: ChunkNode>(&mut self, id: impl Into<ChunkId>) -> Result<&mut T> {
        let index = self.position_or_err(id.into())?;
        self.get_as_mut(index)
    }

    /// Append a freshly written child and hand it back as its concrete kind
    fn append_node<T: ChunkNode>(&mut self, child: T) -> Result<&mut T> {
        let id = child.id();
        self.children.push(Box::new(child));
        self.chunk.mark_dirty();
        let index = self.children.len() - 1;
        downcast_mut::<T>(self.children[index].as_mut()).ok_or_else(|| kind_mismatch::<T>(id))
    }

    /// Move the store to where the next child goes
    fn seek_to_append(&self, store: &mut dyn Storage) -> Result<()> {
        store.seek(SeekFrom::Start(self.end_location()))?;
        Ok(())
    }

    /// Write a new child of kind `T` at the end of this group.
    ///
    /// The child's header is written immediately so later additions know
    /// their offsets. This group's header becomes stale until flushed.
    pub fn add<T: NewChunk>(
        &mut self,
        store: &mut dyn Storage,
        id: impl Into<ChunkId>,
        initial_size: u64,
    ) -> Result<&mut T> {
        self.seek_to_append(store)?;
        let child: T =
            node::create_as(store, self.chunk.dialect(), id.into(), initial_size, &self.resolver)?;
        self.append_node(child)
    }

    /// Write a nested group with its form type at the end of this group.
    /// It inherits this group's resolver and copy window.
    pub fn add_group(
        &mut self,
        store: &mut dyn Storage,
        id: impl Into<ChunkId>,
        form_type: impl Into<ChunkId>,
    ) -> Result<&mut GroupChunk> {
        let resolver = self.resolver.clone();
        self.add_group_with(store, id, form_type, resolver)
    }

    /// Like [`add_group`](Self::add_group) with a different resolver for the
    /// nested group
    pub fn add_group_with(
        &mut self,
        store: &mut dyn Storage,
        id: impl Into<ChunkId>,
        form_type: impl Into<ChunkId>,
        resolver: ChildResolver,
    ) -> Result<&mut GroupChunk> {
        self.seek_to_append(store)?;
        let chunk = Chunk::placed(id.into(), self.chunk.dialect(), self.end_location());
        let mut group = GroupChunk::placed(chunk, form_type.into(), resolver, self.copy_window);
        node::create_node(&mut group, store)?;
        self.append_node(group)
    }

    /// Write a typed value child at the end of this group
    pub fn add_value<V: ChunkValue + 'static>(
        &mut self,
        store: &mut dyn Storage,
        id: impl Into<ChunkId>,
        value: V,
    ) -> Result<&mut ValueChunk<V>> {
        self.seek_to_append(store)?;
        let child = ValueChunk::create(store, self.chunk.dialect(), id.into(), value)?;
        self.append_node(child)
    }

    /// Physically move the child at `index` behind all of its later siblings.
    ///
    /// The bytes from the child's start to the group's last child are rotated
    /// in place, then cached offsets are adjusted without re-reading headers.
    /// Returns `false` if the child is already last.
    pub fn move_to_end(&mut self, store: &mut dyn Storage, index: usize) -> Result<bool> {
        self.check_index(index)?;
        if index + 1 == self.children.len() {
            return Ok(false);
        }

        let left_start = self.children[index].start_location();
        let left_end = self.children[index].end_location();
        let right_start = self.children[index + 1].start_location();
        if left_end != right_start {
            return Err(ChunkError::NonContiguous {
                left_end,
                right_start,
            });
        }
        let right_end = self.children.iter().map(|c| c.end_location()).max().unwrap_or(right_start);

        let left_size = left_end - left_start;
        let right_size = right_end - right_start;
        log::debug!(
            "Moving '{}' ({} bytes at {}) behind {} bytes of siblings in '{}'",
            self.children[index].id(),
            left_size,
            left_start,
            right_size,
            self.chunk.id()
        );
        rotate::rotate_right(
            store,
            left_start,
            left_size + right_size,
            right_size,
            self.copy_window,
        )?;

        self.children[index].shift(right_size as i64);
        for sibling in &mut self.children[index + 1..] {
            sibling.shift(-(left_size as i64));
        }
        self.children.sort_by_key(|child| child.start_location());
        Ok(true)
    }

    /// [`move_to_end`](Self::move_to_end) for the first child with the given id
    pub fn move_to_end_by_id(&mut self, store: &mut dyn Storage, id: impl Into<ChunkId>) -> Result<bool> {
        let index = self.position_or_err(id.into())?;
        self.move_to_end(store, index)
    }

    /// Reject layouts where a child no longer ends exactly where its next
    /// sibling starts: grown into it, or shrunk away from it.
    fn check_layout(&self) -> Result<()> {
        for pair in self.children.windows(2) {
            let id = pair[0].id();
            let end = pair[0].end_location();
            let next_start = pair[1].start_location();
            if end > next_start {
                return Err(ChunkError::Overlap { id, end, next_start });
            }
            if end < next_start {
                return Err(ChunkError::Gap { id, end, next_start });
            }
        }
        Ok(())
    }
}

fn kind_mismatch<T>(id: ChunkId) -> ChunkError {
    // "iffkit::chunk::value::ValueChunk<u32>" -> "ValueChunk"
    let name = std::any::type_name::<T>();
    let base = name.split('<').next().unwrap_or(name);
    ChunkError::KindMismatch {
        id,
        expected: base.rsplit("::").next().unwrap_or(base),
    }
}

impl ChunkNode for GroupChunk {
    fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    fn chunk_mut(&mut self) -> &mut Chunk {
        &mut self.chunk
    }

    fn kind_name(&self) -> &'static str {
        "group"
    }

    fn data_byte_size(&self) -> u64 {
        4 + self
            .children
            .iter()
            .map(|child| child.total_byte_size())
            .sum::<u64>()
    }

    fn header_dirty(&self) -> bool {
        self.chunk.is_marked_dirty()
            || self.data_byte_size() != self.chunk.flushed_size()
            || self.children.iter().any(|child| child.header_dirty())
    }

    fn read_body(&mut self, store: &mut dyn Storage) -> Result<()> {
        let dialect = self.chunk.dialect();
        let data = self.chunk.data_location();
        sync_cursor(store, data)?;
        self.form_type = header::read_id(store)?;

        let mut end = data + self.chunk.stored_size();
        if self.chunk.is_extended_size() {
            // True size lives in a lookup chunk; walk to the end of the store
            end = store.seek(SeekFrom::End(0))?;
            store.seek(SeekFrom::Start(data + 4))?;
        }

        let header_size = dialect.header_byte_size();
        let mut position = data + 4;
        while position < end {
            let left = end - position;
            if left < header_size {
                if !self.chunk.is_extended_size() {
                    return Err(ChunkError::TrailingBytes {
                        id: self.chunk.id(),
                        count: left,
                    });
                }
                log::debug!("Ignoring {} bytes at the end of '{}'", left, self.chunk.id());
                break;
            }
            let (child, child_end) = node::read_node(store, dialect, &self.resolver)?;
            self.children.push(child);
            position = child_end;
        }

        let derived = self.data_byte_size();
        if self.chunk.is_extended_size() {
            self.chunk.resolve_extended_size(derived);
        } else if derived != self.chunk.stored_size() {
            log::warn!(
                "Group '{}' declares {} bytes but its children span {}",
                self.chunk.id(),
                self.chunk.stored_size(),
                derived
            );
        }
        Ok(())
    }

    fn write_body(&mut self, store: &mut dyn Storage) -> Result<()> {
        sync_cursor(store, self.chunk.data_location())?;
        header::write_id(store, self.form_type)?;
        for child in &mut self.children {
            child.flush(store)?;
        }
        store.seek(SeekFrom::Start(self.end_location()))?;
        Ok(())
    }

    /// Flush descendants depth-first, then this group's own header
    fn flush(&mut self, store: &mut dyn Storage) -> Result<bool> {
        self.check_layout()?;
        let mut wrote = false;
        for child in &mut self.children {
            wrote |= child.flush(store)?;
        }
        if self.header_dirty() {
            log::trace!(
                "Flushing group '{}' at {} ({} bytes)",
                self.chunk.id(),
                self.chunk.start_location(),
                self.data_byte_size()
            );
            self.write_header(store)?;
            self.write_padding(store)?;
            store.flush()?;
            wrote = true;
        }
        Ok(wrote)
    }

    fn shift(&mut self, delta: i64) {
        self.chunk.shift(delta);
        for child in &mut self.children {
            child.shift(delta);
        }
    }

    fn children(&self) -> &[Box<dyn ChunkNode>] {
        &self.children
    }

    fn form_type(&self) -> Option<ChunkId> {
        Some(self.form_type)
    }
}

impl NewChunk for GroupChunk {
    fn from_chunk(chunk: Chunk, resolver: &ChildResolver) -> Self {
        Self::placed(chunk, ChunkId::BLANK, resolver.clone(), DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::bulk::BulkChunk;
    use crate::chunk::node::{standard_resolver, ChunkKind, STANDARD_GROUP_IDS};
    use crate::io::InstrumentedStore;
    use std::io::{Cursor, Seek};

    fn assert_size_invariant(group: &GroupChunk) {
        let expected: u64 = 4 + group
            .iter()
            .map(|c| c.header_byte_size() + c.data_byte_size() + c.padding_bytes())
            .sum::<u64>();
        assert_eq!(group.data_byte_size(), expected);
    }

    fn new_riff(store: &mut Cursor<Vec<u8>>) -> GroupChunk {
        GroupChunk::create(
            store,
            Dialect::RIFF,
            ChunkId::RIFF,
            ChunkId::new(*b"WAVE"),
            ChildResolver::default(),
        )
        .unwrap()
    }

    /// Group with contiguous children A (6 bytes) and B (4 bytes)
    fn two_child_group() -> (Cursor<Vec<u8>>, GroupChunk) {
        let mut store = Cursor::new(Vec::new());
        let mut group = new_riff(&mut store);
        group
            .add::<Chunk>(&mut store, b"AAAA", 0)
            .unwrap()
            .write(&mut store, b"aaaaaa")
            .unwrap();
        group
            .add::<Chunk>(&mut store, b"BBBB", 0)
            .unwrap()
            .write(&mut store, b"bbbb")
            .unwrap();
        group.flush(&mut store).unwrap();
        (store, group)
    }

    #[test]
    fn test_create_writes_form_type() {
        let mut store = Cursor::new(Vec::new());
        let group = new_riff(&mut store);
        assert_eq!(group.data_byte_size(), 4);
        assert!(!group.header_dirty());
        assert_eq!(store.get_ref().as_slice(), b"RIFF\x04\x00\x00\x00WAVE");
        assert_eq!(group.form_type(), Some(ChunkId::new(*b"WAVE")));
    }

    #[test]
    fn test_size_invariant_after_each_add() {
        let mut store = Cursor::new(Vec::new());
        let mut group = new_riff(&mut store);

        group.add::<Chunk>(&mut store, b"fmt ", 16).unwrap();
        assert_size_invariant(&group);
        assert!(group.header_dirty());

        group.add::<Chunk>(&mut store, b"odd ", 3).unwrap();
        assert_size_invariant(&group);

        group.add_value(&mut store, b"cue ", 7u32).unwrap();
        assert_size_invariant(&group);

        let list = group.add_group(&mut store, ChunkId::LIST, b"INFO").unwrap();
        list.add_value(&mut store, b"INAM", b"song\0".to_vec()).unwrap();
        assert_size_invariant(&group);

        assert_eq!(group.data_byte_size(), 4 + 24 + 12 + 12 + (12 + 14));
        assert!(group.flush(&mut store).unwrap());
        assert!(!group.header_dirty());
        assert_eq!(store.get_ref().len() as u64, group.end_location());
    }

    #[test]
    fn test_nested_group_round_trip() {
        let mut store = Cursor::new(Vec::new());
        let mut group = new_riff(&mut store);
        group.add_value(&mut store, b"fmt ", 0x0102u16).unwrap();
        let list = group.add_group(&mut store, ChunkId::LIST, b"INFO").unwrap();
        list.add_value(&mut store, b"ICMT", b"abc".to_vec()).unwrap();
        group.add::<Chunk>(&mut store, b"data", 2).unwrap();
        group.flush(&mut store).unwrap();

        store.seek(SeekFrom::Start(0)).unwrap();
        let resolver = standard_resolver(STANDARD_GROUP_IDS);
        let read = GroupChunk::read_from(&mut store, Dialect::RIFF, &resolver).unwrap();
        assert_eq!(read.form_type(), Some(ChunkId::new(*b"WAVE")));
        assert_eq!(read.len(), 3);
        assert_eq!(read.data_byte_size(), group.data_byte_size());
        assert!(!read.header_dirty());

        let info = read.find_as::<GroupChunk>(ChunkId::LIST).unwrap();
        assert_eq!(info.form_type(), Some(ChunkId::new(*b"INFO")));
        assert_eq!(info.len(), 1);
        let comment = info.get(0).unwrap();
        assert_eq!(comment.id(), b"ICMT");
        assert_eq!(comment.data_byte_size(), 3);
        assert_eq!(comment.padding_bytes(), 1);
    }

    #[test]
    fn test_lookup_errors() {
        let (_, group) = two_child_group();
        assert_eq!(group.first().unwrap().id(), b"AAAA");
        assert_eq!(group.last().unwrap().id(), b"BBBB");
        assert!(matches!(
            group.find(b"ZZZZ"),
            Err(ChunkError::NotFound { id }) if id == *b"ZZZZ"
        ));
        assert!(matches!(
            group.get(2),
            Err(ChunkError::IndexOutOfRange { index: 2, len: 2 })
        ));
        assert!(matches!(
            group.find_as::<BulkChunk>(b"AAAA"),
            Err(ChunkError::KindMismatch { expected: "BulkChunk", .. })
        ));
        assert!(group.find_as::<Chunk>(b"AAAA").is_ok());
    }

    #[test]
    fn test_move_to_end_relocates_bytes() {
        let (mut store, mut group) = two_child_group();
        let before = group.end_location();

        assert!(group.move_to_end_by_id(&mut store, b"AAAA").unwrap());

        let ids: Vec<ChunkId> = group.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![ChunkId::new(*b"BBBB"), ChunkId::new(*b"AAAA")]);
        assert_eq!(group.get(0).unwrap().start_location(), 12);
        assert_eq!(group.get(1).unwrap().start_location(), 24);
        assert_eq!(group.end_location(), before);
        assert!(!group.header_dirty());

        let a = group.find_as_mut::<Chunk>(b"AAAA").unwrap();
        assert_eq!(a.read_all(&mut store).unwrap(), b"aaaaaa");
        let b = group.find_as_mut::<Chunk>(b"BBBB").unwrap();
        assert_eq!(b.read_all(&mut store).unwrap(), b"bbbb");

        // Already last
        assert!(!group.move_to_end(&mut store, 1).unwrap());

        // The relocated layout parses back identically
        store.seek(SeekFrom::Start(0)).unwrap();
        let read = GroupChunk::read_from(&mut store, Dialect::RIFF, &ChildResolver::default()).unwrap();
        let ids: Vec<ChunkId> = read.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![ChunkId::new(*b"BBBB"), ChunkId::new(*b"AAAA")]);
    }

    #[test]
    fn test_move_to_end_small_window() {
        let (mut store, mut group) = two_child_group();
        group.set_copy_window(3);
        group.move_to_end(&mut store, 0).unwrap();
        assert_eq!(
            &store.get_ref()[12..],
            b"BBBB\x04\x00\x00\x00bbbbAAAA\x06\x00\x00\x00aaaaaa"
        );
    }

    #[test]
    fn test_move_to_end_then_grow() {
        let (mut store, mut group) = two_child_group();
        group.move_to_end_by_id(&mut store, b"AAAA").unwrap();

        let a = group.find_as_mut::<Chunk>(b"AAAA").unwrap();
        a.seek(&mut store, SeekFrom::Start(6)).unwrap();
        a.write(&mut store, b"++").unwrap();
        assert!(group.header_dirty());
        group.flush(&mut store).unwrap();

        store.seek(SeekFrom::Start(0)).unwrap();
        let mut read = GroupChunk::read_from(&mut store, Dialect::RIFF, &ChildResolver::default()).unwrap();
        let a = read.find_as_mut::<Chunk>(b"AAAA").unwrap();
        assert_eq!(a.read_all(&mut store).unwrap(), b"aaaaaa++");
    }

    #[test]
    fn test_move_nested_group_shifts_descendants() {
        let mut store = Cursor::new(Vec::new());
        let mut group = new_riff(&mut store);
        let list = group.add_group(&mut store, ChunkId::LIST, b"adtl").unwrap();
        list.add::<Chunk>(&mut store, b"note", 2).unwrap();
        group.add::<Chunk>(&mut store, b"data", 4).unwrap();
        group.flush(&mut store).unwrap();

        group.move_to_end_by_id(&mut store, ChunkId::LIST).unwrap();
        let list = group.find_as::<GroupChunk>(ChunkId::LIST).unwrap();
        assert_eq!(list.start_location(), 12 + 12);
        assert_eq!(list.get(0).unwrap().start_location(), 12 + 12 + 12);
        assert_eq!(&store.get_ref()[36..40], b"note");
        assert!(!group.header_dirty());
    }

    #[test]
    fn test_move_non_contiguous_fails() {
        let (mut store, mut group) = two_child_group();
        // Pretend B sits two bytes further along
        group.get_mut(1).unwrap().shift(2);
        assert!(matches!(
            group.move_to_end(&mut store, 0),
            Err(ChunkError::NonContiguous {
                left_end: 26,
                right_start: 28
            })
        ));
    }

    #[test]
    fn test_flush_detects_overlap() {
        let (mut store, mut group) = two_child_group();
        let a = group.find_as_mut::<Chunk>(b"AAAA").unwrap();
        a.seek(&mut store, SeekFrom::Start(6)).unwrap();
        a.write(&mut store, b"xx").unwrap();
        assert!(matches!(
            group.flush(&mut store),
            Err(ChunkError::Overlap { .. })
        ));
    }

    #[test]
    fn test_flush_rejects_shrunk_interior_value() {
        let mut store = Cursor::new(Vec::new());
        let mut group = new_riff(&mut store);
        group.add_value(&mut store, b"name", b"abcdefgh".to_vec()).unwrap();
        group.add::<Chunk>(&mut store, b"data", 4).unwrap();
        group.flush(&mut store).unwrap();
        let before = store.get_ref().clone();

        group
            .find_as_mut::<ValueChunk<Vec<u8>>>(b"name")
            .unwrap()
            .set(b"ab".to_vec());
        assert!(matches!(
            group.flush(&mut store),
            Err(ChunkError::Gap { end: 22, next_start: 28, .. })
        ));
        assert_eq!(store.get_ref(), &before);

        store.seek(SeekFrom::Start(0)).unwrap();
        let read = GroupChunk::read_from(&mut store, Dialect::RIFF, &ChildResolver::default()).unwrap();
        let ids: Vec<ChunkId> = read.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![ChunkId::new(*b"name"), ChunkId::new(*b"data")]);
    }

    #[test]
    fn test_trailing_value_may_shrink() {
        let mut store = Cursor::new(Vec::new());
        let mut group = new_riff(&mut store);
        group.add::<Chunk>(&mut store, b"data", 4).unwrap();
        group.add_value(&mut store, b"name", b"abcdefgh".to_vec()).unwrap();
        group.flush(&mut store).unwrap();

        group
            .find_as_mut::<ValueChunk<Vec<u8>>>(b"name")
            .unwrap()
            .set(b"ab".to_vec());
        assert!(group.flush(&mut store).unwrap());
        assert_eq!(group.data_byte_size(), 4 + 12 + 10);

        store.seek(SeekFrom::Start(0)).unwrap();
        let read = GroupChunk::read_from(&mut store, Dialect::RIFF, &ChildResolver::default()).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read.find(b"name").unwrap().data_byte_size(), 2);
    }

    /// Leaf whose true size comes from a lookup table, as RF64 `data` does
    #[derive(Debug)]
    struct LookupSized(Chunk);

    impl ChunkNode for LookupSized {
        fn chunk(&self) -> &Chunk {
            &self.0
        }

        fn chunk_mut(&mut self) -> &mut Chunk {
            &mut self.0
        }

        fn read_body(&mut self, _store: &mut dyn Storage) -> Result<()> {
            if self.0.is_extended_size() {
                self.0.resolve_extended_size(6);
            }
            Ok(())
        }
    }

    impl NewChunk for LookupSized {
        fn from_chunk(chunk: Chunk, _resolver: &ChildResolver) -> Self {
            LookupSized(chunk)
        }
    }

    #[test]
    fn test_move_past_extended_child_and_unpadded_tail() {
        // RF64 root > fmt, data (extended, 6 bytes), tail (3 bytes, pad never written)
        let mut bytes = b"RF64\xff\xff\xff\xffWAVE".to_vec();
        bytes.extend_from_slice(b"fmt \x04\x00\x00\x00FMT!");
        bytes.extend_from_slice(b"data\xff\xff\xff\xff123456");
        bytes.extend_from_slice(b"tail\x03\x00\x00\x00xyz");
        let mut store = Cursor::new(bytes);

        let resolver = ChildResolver::new(|header| match header.id.as_bytes() {
            b"data" => ChunkKind::of::<LookupSized>(),
            _ => ChunkKind::Raw,
        });
        let mut group = GroupChunk::read_from(&mut store, Dialect::RF64, &resolver).unwrap();
        assert_eq!(group.len(), 3);
        assert_eq!(group.end_location(), 50);

        assert!(group.move_to_end_by_id(&mut store, b"fmt ").unwrap());
        let starts: Vec<u64> = group.iter().map(|c| c.start_location()).collect();
        assert_eq!(starts, vec![12, 26, 38]);
        assert!(group.get(0).unwrap().is_extended_size());
        assert!(!group.flush(&mut store).unwrap());
        assert_eq!(
            &store.get_ref()[12..],
            b"data\xff\xff\xff\xff123456tail\x03\x00\x00\x00xyz\x00fmt \x04\x00\x00\x00FMT!"
        );

        store.seek(SeekFrom::Start(0)).unwrap();
        let read = GroupChunk::read_from(&mut store, Dialect::RF64, &resolver).unwrap();
        let ids: Vec<ChunkId> = read.iter().map(|c| c.id()).collect();
        assert_eq!(
            ids,
            vec![ChunkId::new(*b"data"), ChunkId::new(*b"tail"), ChunkId::new(*b"fmt ")]
        );
    }

    #[test]
    fn test_group_slack_shorter_than_header_is_error() {
        // LIST declares 18 bytes: form type, one 12-byte child, then 2 stray bytes
        let mut bytes = b"RIFF\x2a\x00\x00\x00WAVE".to_vec();
        bytes.extend_from_slice(b"LIST\x12\x00\x00\x00INFOINAM\x04\x00\x00\x00tonezz");
        bytes.extend_from_slice(b"data\x04\x00\x00\x00abcd");
        let mut store = Cursor::new(bytes);

        let resolver = standard_resolver(STANDARD_GROUP_IDS);
        let err = GroupChunk::read_from(&mut store, Dialect::RIFF, &resolver).unwrap_err();
        assert!(matches!(
            err,
            ChunkError::TrailingBytes { id, count: 2 } if id == ChunkId::LIST
        ));
    }

    #[test]
    fn test_extended_group_ignores_short_tail() {
        let mut bytes = b"RF64\xff\xff\xff\xffWAVE".to_vec();
        bytes.extend_from_slice(b"data\x02\x00\x00\x00ab");
        bytes.extend_from_slice(b"\x00\x00\x00");
        let mut store = Cursor::new(bytes);

        let read = GroupChunk::read_from(&mut store, Dialect::RF64, &ChildResolver::default()).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read.data_byte_size(), 4 + 10);
    }

    #[test]
    fn test_group_flush_is_idempotent() {
        let mut store = InstrumentedStore::new(Cursor::new(Vec::new()));
        let mut group = GroupChunk::create(
            &mut store,
            Dialect::IFF,
            ChunkId::FORM,
            ChunkId::new(*b"AIFF"),
            ChildResolver::default(),
        )
        .unwrap();
        group
            .add::<Chunk>(&mut store, b"SSND", 0)
            .unwrap()
            .write(&mut store, b"12345")
            .unwrap();

        store.reset_counters();
        assert!(group.flush(&mut store).unwrap());
        let first = store.counters();
        assert!(first.writes > 0);

        assert!(!group.flush(&mut store).unwrap());
        assert_eq!(store.counters(), first);
    }

    #[test]
    fn test_custom_kind_resolution() {
        let mut store = Cursor::new(Vec::new());
        let mut group = new_riff(&mut store);
        group.add_value(&mut store, b"fact", 1234u32).unwrap();
        group.add::<Chunk>(&mut store, b"data", 6).unwrap();
        group.flush(&mut store).unwrap();

        let resolver = ChildResolver::new(|header| match header.id.as_bytes() {
            b"fact" => ChunkKind::of::<ValueChunk<u32>>(),
            b"data" => ChunkKind::Bulk,
            _ => ChunkKind::Raw,
        });
        store.seek(SeekFrom::Start(0)).unwrap();
        let mut read = GroupChunk::read_from(&mut store, Dialect::RIFF, &resolver).unwrap();
        assert_eq!(*read.find_as::<ValueChunk<u32>>(b"fact").unwrap().value(), 1234);
        let data = read.find_as_mut::<BulkChunk>(b"data").unwrap();
        assert_eq!(data.len(), 6);
    }

    #[test]
    fn test_extended_group_reads_to_store_end() {
        let mut store = Cursor::new(Vec::new());
        let mut group = GroupChunk::create(
            &mut store,
            Dialect::RF64,
            ChunkId::RF64,
            ChunkId::new(*b"WAVE"),
            ChildResolver::default(),
        )
        .unwrap();
        group.add::<Chunk>(&mut store, b"ds64", 28).unwrap();
        group.add::<Chunk>(&mut store, b"data", 4).unwrap();
        group.flush(&mut store).unwrap();

        // Replace the size field with the sentinel
        store.get_mut()[4..8].copy_from_slice(&[0xFF; 4]);
        store.seek(SeekFrom::Start(0)).unwrap();

        let read = GroupChunk::read_from(&mut store, Dialect::RF64, &ChildResolver::default()).unwrap();
        assert!(read.is_extended_size());
        assert_eq!(read.len(), 2);
        assert_eq!(read.data_byte_size(), 4 + 36 + 12);
        assert!(!read.header_dirty());
        assert_eq!(store.stream_position().unwrap(), read.end_location());
    }
}
