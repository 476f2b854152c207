//! Borrowing list iterator
//!
//! Holds a shared borrow of the list, so the list cannot change while the
//! iterator is alive. Use [`Cursor`](super::Cursor) to modify during a walk.

use crate::block::{BlockBuffer, BlockId};
use crate::error::Result;
use crate::serializer::Serializer;

use super::PersistentLinkedList;

/// Double-ended iterator over the elements of a list
pub struct Iter<'a, T, S, K> {
    list: &'a PersistentLinkedList<T, S, K>,
    front: Option<BlockId>,
    back: Option<BlockId>,
    /// Elements not yet yielded from either end
    remaining: u64,
}

impl<'a, T, S, K> Iter<'a, T, S, K> {
    pub(super) fn new(
        list: &'a PersistentLinkedList<T, S, K>,
        front: Option<BlockId>,
        back: Option<BlockId>,
        remaining: u64,
    ) -> Self {
        Self {
            list,
            front,
            back,
            remaining,
        }
    }
}

impl<T, S, K> Iter<'_, T, S, K>
where
    S: Serializer<T>,
    K: BlockBuffer,
{
    /// Read the node at `id`, returning its element and its neighbour in the
    /// walking direction
    fn step(&mut self, id: BlockId, forward: bool) -> Result<(Option<T>, Option<BlockId>)> {
        let header = self.list.read_node(id)?;
        let value = self.list.decode_payload(id, &header)?;
        let neighbour = if forward { header.next } else { header.prev };
        Ok((value, neighbour))
    }

    /// Stop iterating after an error
    fn fuse(&mut self) {
        self.remaining = 0;
        self.front = None;
        self.back = None;
    }
}

impl<T, S, K> Iterator for Iter<'_, T, S, K>
where
    S: Serializer<T>,
    K: BlockBuffer,
{
    type Item = Result<Option<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.front?;

        match self.step(id, true) {
            Ok((value, next)) => {
                self.front = next;
                self.remaining -= 1;
                Some(Ok(value))
            }
            Err(e) => {
                self.fuse();
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining as usize;
        (remaining, Some(remaining))
    }
}

impl<T, S, K> DoubleEndedIterator for Iter<'_, T, S, K>
where
    S: Serializer<T>,
    K: BlockBuffer,
{
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.back?;

        match self.step(id, false) {
            Ok((value, prev)) => {
                self.back = prev;
                self.remaining -= 1;
                Some(Ok(value))
            }
            Err(e) => {
                self.fuse();
                Some(Err(e))
            }
        }
    }
}

impl<T, S, K> ExactSizeIterator for Iter<'_, T, S, K>
where
    S: Serializer<T>,
    K: BlockBuffer,
{
}
