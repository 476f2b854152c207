//! Persistent Linked List
//!
//! A doubly linked list whose nodes live in blocks of a [`BlockBuffer`].
//!
//! ## Responsibilities
//! - Keep head/tail in a metadata block (the lowest block id)
//! - Order node writes and link updates with two barriers per change
//! - Validate the chain on open and re-derive the length
//!
//! ## Write Protocol
//! ```text
//! insert:  write node ──► barrier(ordered) ──► link neighbours ──► barrier(commit)
//! remove:  splice out ──► barrier(ordered) ──► clear + free   ──► barrier(commit)
//! ```
//!
//! A crash between the two barriers of an insert leaves a fully written node
//! that nothing points to. Open reports such orphans and leaves them alone.
//!
//! If a link update fails after some of its writes landed, the in-memory
//! view can no longer be trusted: the list is poisoned and every later
//! operation fails with `Poisoned` until the file is reopened (and
//! revalidated).
//!
//! The list is not synchronized; wrap it in [`SharedList`] to share it.

mod cursor;
mod iter;
mod node;

use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::block::{BlockBuffer, BlockId, BlockReader, BlockWriter};
use crate::config::{BarrierPolicy, Config};
use crate::error::{AtlasError, Result};
use crate::select::{open_block_buffer, open_buffer};
use crate::serializer::{default_serializer, Persist, Serializer};

use node::{NodeHeader, META_SIZE};

pub use cursor::Cursor;
pub use iter::Iter;
pub use node::{END_PTR, NODE_HEADER_SIZE, NULL_PTR};

/// Source of per-instance tokens that tie cursors to their list
static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(0);

/// A list shared between threads behind one lock
pub type SharedList<T, S, K = Box<dyn BlockBuffer + Send>> =
    Arc<Mutex<PersistentLinkedList<T, S, K>>>;

/// Doubly linked list of nullable `T` values stored in a block buffer
pub struct PersistentLinkedList<T, S, K = Box<dyn BlockBuffer + Send>> {
    blocks: K,
    serializer: S,
    /// Metadata block holding magic, version, head and tail
    meta: BlockId,
    head: Option<BlockId>,
    tail: Option<BlockId>,
    len: u64,
    /// Bumped on every structural change
    mod_count: u64,
    /// `force` flag for commit barriers
    commit: bool,
    /// Set when a link update failed halfway
    poisoned: bool,
    /// Distinguishes this open list from every other one in the process
    instance: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Persist> PersistentLinkedList<T, T::Serializer> {
    /// Open the list stored in the file named by `config`, using the
    /// built-in serializer for `T`
    pub fn open(config: &Config) -> Result<Self> {
        Self::open_with_serializer(config, default_serializer::<T>())
    }
}

impl<T, S: Serializer<T>> PersistentLinkedList<T, S> {
    /// Open the list stored in the file named by `config`.
    ///
    /// A fixed-size serializer selects a fixed-stride block buffer; anything
    /// else uses the buddy allocator. Reopen with a serializer of the same
    /// kind.
    pub fn open_with_serializer(config: &Config, serializer: S) -> Result<Self> {
        let buffer = open_buffer(config)?;
        let record_size = serializer.fixed_size().map(|n| NODE_HEADER_SIZE + n);
        let blocks = open_block_buffer(buffer, record_size)?;
        Self::with_block_buffer(blocks, serializer, config.barrier_policy)
    }
}

impl<T, S, K> PersistentLinkedList<T, S, K>
where
    S: Serializer<T>,
    K: BlockBuffer,
{
    /// Open the list stored in `blocks`, initializing it if there are no blocks
    pub fn with_block_buffer(mut blocks: K, serializer: S, policy: BarrierPolicy) -> Result<Self> {
        let ids = blocks.iter_block_ids().collect::<Result<BTreeSet<_>>>()?;

        let list = match ids.first() {
            None => {
                let meta = blocks.allocate(META_SIZE)?;
                node::init_meta(&mut blocks, meta)?;
                blocks.barrier(true)?;
                debug!(meta, "initialized empty list");
                Self::from_parts(blocks, serializer, meta, policy)
            }
            Some(&meta) => {
                let mut list = Self::from_parts(blocks, serializer, meta, policy);
                list.load(&ids)?;
                list
            }
        };
        Ok(list)
    }

    fn from_parts(blocks: K, serializer: S, meta: BlockId, policy: BarrierPolicy) -> Self {
        Self {
            blocks,
            serializer,
            meta,
            head: None,
            tail: None,
            len: 0,
            mod_count: 0,
            commit: policy.force(),
            poisoned: false,
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            _marker: PhantomData,
        }
    }

    /// Read head/tail and walk the chain, checking every link
    fn load(&mut self, ids: &BTreeSet<BlockId>) -> Result<()> {
        let (head, tail) = node::read_meta(&self.blocks, self.meta)?;
        let node_blocks = ids.len() as u64 - 1;

        let mut reachable = 0u64;
        let mut prev = None;
        let mut current = head;
        while let Some(id) = current {
            if id == self.meta || !ids.contains(&id) {
                return Err(AtlasError::Corruption(format!(
                    "link to block {} which is not a node",
                    id
                )));
            }
            if reachable >= node_blocks {
                return Err(AtlasError::Corruption(format!(
                    "cycle in list chain at block {}",
                    id
                )));
            }

            let header = node::read_node(&self.blocks, id)?;
            if header.prev != prev {
                return Err(AtlasError::Corruption(format!(
                    "node {} links back to {:?}, expected {:?}",
                    id, header.prev, prev
                )));
            }

            reachable += 1;
            prev = Some(id);
            current = header.next;
        }

        if prev != tail {
            return Err(AtlasError::Corruption(format!(
                "chain ends at {:?} but tail is {:?}",
                prev, tail
            )));
        }

        let orphans = node_blocks - reachable;
        if orphans > 0 {
            warn!(
                orphans,
                "list holds node blocks unreachable from head (interrupted insert)"
            );
        }

        self.head = head;
        self.tail = tail;
        self.len = reachable;
        debug!(meta = self.meta, len = reachable, "opened list");
        Ok(())
    }

    // =========================================================================
    // Size & Access
    // =========================================================================

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn first(&self) -> Result<Option<T>> {
        let head = self.head.ok_or(AtlasError::NoSuchElement)?;
        self.read_element(head)
    }

    pub fn last(&self) -> Result<Option<T>> {
        let tail = self.tail.ok_or(AtlasError::NoSuchElement)?;
        self.read_element(tail)
    }

    /// Element at `index`, walking from the closer end
    pub fn get(&self, index: u64) -> Result<Option<T>> {
        let id = self.node_at(index)?;
        self.read_element(id)
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Append to the end
    pub fn add<'a>(&mut self, element: impl Into<Option<&'a T>>) -> Result<()>
    where
        T: 'a,
    {
        self.add_last(element)
    }

    pub fn add_first<'a>(&mut self, element: impl Into<Option<&'a T>>) -> Result<()>
    where
        T: 'a,
    {
        self.add_entry(self.head, None, element.into())?;
        Ok(())
    }

    pub fn add_last<'a>(&mut self, element: impl Into<Option<&'a T>>) -> Result<()>
    where
        T: 'a,
    {
        self.add_entry(None, self.tail, element.into())?;
        Ok(())
    }

    /// Insert so that the element ends up at `index`
    pub fn insert<'a>(&mut self, index: u64, element: impl Into<Option<&'a T>>) -> Result<()>
    where
        T: 'a,
    {
        if index > self.len {
            return Err(AtlasError::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        if index == self.len {
            return self.add_last(element);
        }

        let successor = self.node_at(index)?;
        self.insert_before(successor, element.into())?;
        Ok(())
    }

    /// Replace the element at `index`, returning the old one.
    ///
    /// The old node is not rewritten in place: a new node is linked after it
    /// and the old one is unlinked, so a crash never exposes a torn element.
    pub fn set<'a>(&mut self, index: u64, element: impl Into<Option<&'a T>>) -> Result<Option<T>>
    where
        T: 'a,
    {
        let id = self.node_at(index)?;
        let old = self.read_element(id)?;
        self.replace(id, element.into())?;
        Ok(old)
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Remove and return the element at `index`
    pub fn remove(&mut self, index: u64) -> Result<Option<T>> {
        let id = self.node_at(index)?;
        self.take(id)
    }

    pub fn remove_first(&mut self) -> Result<Option<T>> {
        let head = self.head.ok_or(AtlasError::NoSuchElement)?;
        self.take(head)
    }

    pub fn remove_last(&mut self) -> Result<Option<T>> {
        let tail = self.tail.ok_or(AtlasError::NoSuchElement)?;
        self.take(tail)
    }

    /// Unlink every node. Head and tail are reset before any node is freed.
    pub fn clear(&mut self) -> Result<()> {
        self.check_poisoned()?;
        if self.head.is_none() {
            return Ok(());
        }

        let mut ids = Vec::with_capacity(self.len as usize);
        let mut current = self.head;
        while let Some(id) = current {
            ids.push(id);
            current = node::read_node(&self.blocks, id)?.next;
        }

        let reset = node::write_head(&mut self.blocks, self.meta, None)
            .and_then(|()| node::write_tail(&mut self.blocks, self.meta, None));
        if let Err(e) = reset {
            self.poison(&e);
            return Err(e);
        }
        self.head = None;
        self.tail = None;
        self.len = 0;
        self.mod_count += 1;
        self.blocks.barrier(false)?;

        for id in &ids {
            node::clear_links(&mut self.blocks, *id)?;
            self.blocks.deallocate(*id)?;
        }
        self.blocks.barrier(self.commit)?;

        debug!(removed = ids.len(), "cleared list");
        Ok(())
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Borrowing iterator, front to back (`.rev()` for back to front)
    pub fn iter(&self) -> Iter<'_, T, S, K> {
        Iter::new(self, self.head, self.tail, self.len)
    }

    /// Detached cursor positioned before the first element
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.instance, self.head, 0, self.mod_count)
    }

    /// Detached cursor whose first `next` returns the element at `index`
    pub fn cursor_at(&self, index: u64) -> Result<Cursor> {
        if index > self.len {
            return Err(AtlasError::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        let next = if index == self.len {
            None
        } else {
            Some(self.node_at(index)?)
        };
        Ok(Cursor::new(self.instance, next, index, self.mod_count))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the underlying block buffer. Later operations fail.
    pub fn close(&mut self) -> Result<()> {
        self.blocks.close()
    }

    pub fn block_buffer(&self) -> &K {
        &self.blocks
    }

    pub fn into_block_buffer(self) -> K {
        self.blocks
    }

    pub fn into_shared(self) -> SharedList<T, S, K> {
        Arc::new(Mutex::new(self))
    }

    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    /// Id of the metadata block
    pub fn meta_block(&self) -> BlockId {
        self.meta
    }

    /// Whether a failed link update left the list unusable until reopened
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    /// Id of the node at `index`, walking from whichever end is closer
    pub(crate) fn node_at(&self, index: u64) -> Result<BlockId> {
        self.check_poisoned()?;
        if index >= self.len {
            return Err(AtlasError::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }

        let broken = || AtlasError::Corruption(format!("chain shorter than length {}", self.len));

        if index < self.len / 2 {
            let mut id = self.head.ok_or_else(broken)?;
            for _ in 0..index {
                id = node::read_node(&self.blocks, id)?.next.ok_or_else(broken)?;
            }
            Ok(id)
        } else {
            let mut id = self.tail.ok_or_else(broken)?;
            for _ in index + 1..self.len {
                id = node::read_node(&self.blocks, id)?.prev.ok_or_else(broken)?;
            }
            Ok(id)
        }
    }

    pub(crate) fn read_node(&self, id: BlockId) -> Result<NodeHeader> {
        self.check_poisoned()?;
        node::read_node(&self.blocks, id)
    }

    pub(crate) fn read_element(&self, id: BlockId) -> Result<Option<T>> {
        self.check_poisoned()?;
        let header = node::read_node(&self.blocks, id)?;
        self.decode_payload(id, &header)
    }

    pub(crate) fn decode_payload(&self, id: BlockId, header: &NodeHeader) -> Result<Option<T>> {
        let size = match header.data_size {
            Some(size) => size,
            None => return Ok(None),
        };

        let mut reader = BlockReader::with_range(&self.blocks, id, NODE_HEADER_SIZE, size)?;
        let value = self.serializer.deserialize(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(AtlasError::Serialization(format!(
                "node {} payload has {} unread bytes",
                id,
                reader.remaining()
            )));
        }
        Ok(Some(value))
    }

    pub(crate) fn mod_count(&self) -> u64 {
        self.mod_count
    }

    pub(crate) fn tail(&self) -> Option<BlockId> {
        self.tail
    }

    pub(crate) fn instance(&self) -> u64 {
        self.instance
    }

    fn check_poisoned(&self) -> Result<()> {
        if self.poisoned {
            return Err(AtlasError::Poisoned);
        }
        Ok(())
    }

    fn poison(&mut self, error: &AtlasError) {
        self.poisoned = true;
        warn!(meta = self.meta, %error, "link update failed halfway, list must be reopened");
    }

    /// Insert a node in front of `successor`
    pub(crate) fn insert_before(&mut self, successor: BlockId, element: Option<&T>) -> Result<BlockId> {
        let predecessor = node::read_node(&self.blocks, successor)?.prev;
        self.add_entry(Some(successor), predecessor, element)
    }

    /// Link a new node for `element` right after `id`, then unlink `id`.
    /// Returns the new node's id.
    pub(crate) fn replace(&mut self, id: BlockId, element: Option<&T>) -> Result<BlockId> {
        let next = node::read_node(&self.blocks, id)?.next;
        let replacement = self.add_entry(next, Some(id), element)?;
        self.unlink(id)?;
        Ok(replacement)
    }

    /// Read the element at `id`, then unlink it
    pub(crate) fn take(&mut self, id: BlockId) -> Result<Option<T>> {
        let value = self.read_element(id)?;
        self.unlink(id)?;
        Ok(value)
    }

    /// Write a new node between `prev` and `next` and link it in
    fn add_entry(
        &mut self,
        next: Option<BlockId>,
        prev: Option<BlockId>,
        element: Option<&T>,
    ) -> Result<BlockId> {
        self.check_poisoned()?;
        let data_size = element
            .map(|value| self.serializer.serialized_size(value))
            .transpose()?;

        let id = self.blocks.allocate(NODE_HEADER_SIZE + data_size.unwrap_or(0))?;
        let header = NodeHeader {
            next,
            prev,
            data_size,
        };

        // Nothing references the block yet, so it can still be released
        let written = self
            .write_entry(id, &header, element)
            .and_then(|()| self.blocks.barrier(false));
        if let Err(e) = written {
            if let Err(release) = self.blocks.deallocate(id) {
                warn!(id, error = %release, "failed to release unlinked node");
            }
            return Err(e);
        }

        if let Err(e) = self.link(id, prev, next) {
            self.poison(&e);
            return Err(e);
        }
        if prev.is_none() {
            self.head = Some(id);
        }
        if next.is_none() {
            self.tail = Some(id);
        }
        self.len += 1;
        self.mod_count += 1;

        self.blocks.barrier(self.commit)?;
        Ok(id)
    }

    /// Point the neighbours of a new node (or head / tail) at `id`
    fn link(&mut self, id: BlockId, prev: Option<BlockId>, next: Option<BlockId>) -> Result<()> {
        match prev {
            Some(prev) => node::write_next(&mut self.blocks, prev, Some(id))?,
            None => node::write_head(&mut self.blocks, self.meta, Some(id))?,
        }
        match next {
            Some(next) => node::write_prev(&mut self.blocks, next, Some(id))?,
            None => node::write_tail(&mut self.blocks, self.meta, Some(id))?,
        }
        Ok(())
    }

    fn write_entry(&mut self, id: BlockId, header: &NodeHeader, element: Option<&T>) -> Result<()> {
        node::write_node(&mut self.blocks, id, header)?;

        if let (Some(value), Some(size)) = (element, header.data_size) {
            let mut writer = BlockWriter::new(&mut self.blocks, id, NODE_HEADER_SIZE)?;
            self.serializer.serialize(value, &mut writer)?;
            if writer.written() != size {
                return Err(AtlasError::Serialization(format!(
                    "serializer wrote {} bytes, announced {}",
                    writer.written(),
                    size
                )));
            }
        }
        Ok(())
    }

    /// Splice `id` out of the chain and free it
    fn unlink(&mut self, id: BlockId) -> Result<()> {
        self.check_poisoned()?;
        let header = node::read_node(&self.blocks, id)?;

        if let Err(e) = self.splice_out(&header) {
            self.poison(&e);
            return Err(e);
        }
        if header.prev.is_none() {
            self.head = header.next;
        }
        if header.next.is_none() {
            self.tail = header.prev;
        }
        debug_assert!(self.len > 0);
        self.len -= 1;
        self.mod_count += 1;
        self.blocks.barrier(false)?;

        node::clear_links(&mut self.blocks, id)?;
        self.blocks.deallocate(id)?;
        self.blocks.barrier(self.commit)
    }

    /// Point the neighbours of an unlinked node (or head / tail) at each other
    fn splice_out(&mut self, header: &NodeHeader) -> Result<()> {
        match header.prev {
            Some(prev) => node::write_next(&mut self.blocks, prev, header.next)?,
            None => node::write_head(&mut self.blocks, self.meta, header.next)?,
        }
        match header.next {
            Some(next) => node::write_prev(&mut self.blocks, next, header.prev)?,
            None => node::write_tail(&mut self.blocks, self.meta, header.prev)?,
        }
        Ok(())
    }
}

// =============================================================================
// Searching
// =============================================================================

impl<T, S, K> PersistentLinkedList<T, S, K>
where
    T: PartialEq,
    S: Serializer<T>,
    K: BlockBuffer,
{
    /// Index of the first element equal to `element`
    pub fn index_of<'a>(&self, element: impl Into<Option<&'a T>>) -> Result<Option<u64>>
    where
        T: 'a,
    {
        let element = element.into();
        for (index, value) in self.iter().enumerate() {
            if value?.as_ref() == element {
                return Ok(Some(index as u64));
            }
        }
        Ok(None)
    }

    /// Index of the last element equal to `element`
    pub fn last_index_of<'a>(&self, element: impl Into<Option<&'a T>>) -> Result<Option<u64>>
    where
        T: 'a,
    {
        let element = element.into();
        let mut index = self.len;
        for value in self.iter().rev() {
            index -= 1;
            if value?.as_ref() == element {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    pub fn contains<'a>(&self, element: impl Into<Option<&'a T>>) -> Result<bool>
    where
        T: 'a,
    {
        Ok(self.index_of(element)?.is_some())
    }

    /// Remove the first element equal to `element`; `false` if none matched
    pub fn remove_first_occurrence<'a>(&mut self, element: impl Into<Option<&'a T>>) -> Result<bool>
    where
        T: 'a,
    {
        let element = element.into();
        let mut current = self.head;
        while let Some(id) = current {
            let header = node::read_node(&self.blocks, id)?;
            if self.decode_payload(id, &header)?.as_ref() == element {
                self.unlink(id)?;
                return Ok(true);
            }
            current = header.next;
        }
        Ok(false)
    }

    /// Remove the last element equal to `element`; `false` if none matched
    pub fn remove_last_occurrence<'a>(&mut self, element: impl Into<Option<&'a T>>) -> Result<bool>
    where
        T: 'a,
    {
        let element = element.into();
        let mut current = self.tail;
        while let Some(id) = current {
            let header = node::read_node(&self.blocks, id)?;
            if self.decode_payload(id, &header)?.as_ref() == element {
                self.unlink(id)?;
                return Ok(true);
            }
            current = header.prev;
        }
        Ok(false)
    }
}

impl<'l, T, S, K> IntoIterator for &'l PersistentLinkedList<T, S, K>
where
    S: Serializer<T>,
    K: BlockBuffer,
{
    type Item = Result<Option<T>>;
    type IntoIter = Iter<'l, T, S, K>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
