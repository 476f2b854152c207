//! Detached bidirectional cursor
//!
//! A `Cursor` holds no borrow of the list; every call takes the list as an
//! argument. That lets the caller modify the list between steps, so each
//! step checks the list's modification counter and fails with
//! `ConcurrentModification` if the list changed behind the cursor's back.
//! A cursor only works with the list instance that created it.
//!
//! ```text
//!   elements:   e0     e1     e2     e3
//!   gaps:     0      1      2      3      4
//!                           ▲
//!                 cursor sits in a gap; next() returns e2,
//!                 previous() returns e1
//! ```

use crate::block::{BlockBuffer, BlockId};
use crate::error::{AtlasError, Result};
use crate::serializer::Serializer;

use super::PersistentLinkedList;

/// Fail-fast list iterator that supports removal, replacement and insertion
#[derive(Debug, Clone)]
pub struct Cursor {
    /// Instance token of the list that created this cursor
    list: u64,
    /// Node `next` would return (`None` at the end)
    next: Option<BlockId>,
    /// Index of `next` (equals the length at the end)
    next_index: u64,
    /// Node returned by the last `next` / `previous`
    last_returned: Option<BlockId>,
    /// List modification count this cursor is in sync with
    expected_mod_count: u64,
}

impl Cursor {
    pub(super) fn new(list: u64, next: Option<BlockId>, next_index: u64, mod_count: u64) -> Self {
        Self {
            list,
            next,
            next_index,
            last_returned: None,
            expected_mod_count: mod_count,
        }
    }

    pub fn has_next<T, S, K>(&self, list: &PersistentLinkedList<T, S, K>) -> bool
    where
        S: Serializer<T>,
        K: BlockBuffer,
    {
        self.next_index < list.len()
    }

    pub fn has_previous(&self) -> bool {
        self.next_index > 0
    }

    /// Index of the element `next` would return
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Index of the element `previous` would return (`None` at the front)
    pub fn previous_index(&self) -> Option<u64> {
        self.next_index.checked_sub(1)
    }

    /// Return the next element and move forward
    pub fn next<T, S, K>(&mut self, list: &PersistentLinkedList<T, S, K>) -> Result<Option<T>>
    where
        S: Serializer<T>,
        K: BlockBuffer,
    {
        self.check_for_comodification(list)?;
        if !self.has_next(list) {
            return Err(AtlasError::NoSuchElement);
        }
        let id = self.next.ok_or(AtlasError::NoSuchElement)?;

        let header = list.read_node(id)?;
        let value = list.decode_payload(id, &header)?;
        self.last_returned = Some(id);
        self.next = header.next;
        self.next_index += 1;
        Ok(value)
    }

    /// Return the previous element and move backward
    pub fn previous<T, S, K>(&mut self, list: &PersistentLinkedList<T, S, K>) -> Result<Option<T>>
    where
        S: Serializer<T>,
        K: BlockBuffer,
    {
        self.check_for_comodification(list)?;
        if !self.has_previous() {
            return Err(AtlasError::NoSuchElement);
        }

        let id = match self.next {
            Some(next) => list.read_node(next)?.prev,
            None => list.tail(),
        }
        .ok_or(AtlasError::NoSuchElement)?;

        let value = list.read_element(id)?;
        self.next = Some(id);
        self.last_returned = Some(id);
        self.next_index -= 1;
        Ok(value)
    }

    /// Remove the element last returned by `next` or `previous`
    pub fn remove<T, S, K>(&mut self, list: &mut PersistentLinkedList<T, S, K>) -> Result<()>
    where
        S: Serializer<T>,
        K: BlockBuffer,
    {
        self.check_for_comodification(list)?;
        let last = self.last_returned.ok_or_else(no_current_element)?;

        let following = list.read_node(last)?.next;
        list.take(last)?;

        if self.next == Some(last) {
            // Removed after previous(): the cursor moves onto its successor
            self.next = following;
        } else {
            self.next_index -= 1;
        }
        self.last_returned = None;
        self.expected_mod_count = list.mod_count();
        Ok(())
    }

    /// Replace the element last returned by `next` or `previous`
    pub fn set<'a, T, S, K>(
        &mut self,
        list: &mut PersistentLinkedList<T, S, K>,
        element: impl Into<Option<&'a T>>,
    ) -> Result<()>
    where
        T: 'a,
        S: Serializer<T>,
        K: BlockBuffer,
    {
        self.check_for_comodification(list)?;
        let last = self.last_returned.ok_or_else(no_current_element)?;

        let replacement = list.replace(last, element.into())?;
        if self.next == Some(last) {
            self.next = Some(replacement);
        }
        self.last_returned = Some(replacement);
        self.expected_mod_count = list.mod_count();
        Ok(())
    }

    /// Insert before the element `next` would return
    pub fn add<'a, T, S, K>(
        &mut self,
        list: &mut PersistentLinkedList<T, S, K>,
        element: impl Into<Option<&'a T>>,
    ) -> Result<()>
    where
        T: 'a,
        S: Serializer<T>,
        K: BlockBuffer,
    {
        self.check_for_comodification(list)?;

        match self.next {
            Some(next) => {
                list.insert_before(next, element.into())?;
            }
            None => list.add_last(element)?,
        }
        self.last_returned = None;
        self.next_index += 1;
        self.expected_mod_count = list.mod_count();
        Ok(())
    }

    fn check_for_comodification<T, S, K>(&self, list: &PersistentLinkedList<T, S, K>) -> Result<()>
    where
        S: Serializer<T>,
        K: BlockBuffer,
    {
        if list.instance() != self.list {
            return Err(AtlasError::InvalidArgument(
                "cursor belongs to a different list".to_string(),
            ));
        }
        if list.mod_count() != self.expected_mod_count {
            return Err(AtlasError::ConcurrentModification);
        }
        Ok(())
    }
}

fn no_current_element() -> AtlasError {
    AtlasError::IllegalState("no element returned since the last change".to_string())
}
