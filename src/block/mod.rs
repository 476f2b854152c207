//! Block Buffer Module
//!
//! Allocates and frees opaque-id blocks inside a persistent buffer.
//!
//! ## Responsibilities
//! - `allocate(min_size)` / `deallocate(id)`
//! - Bounds-checked access at `(id, offset, len)`
//! - Unordered traversal of allocated ids
//! - Barriers delegate to the underlying buffer
//!
//! A block id is the byte address of the block's header in the buffer.
//! Payload bytes start right after the 1-byte header.
//!
//! ## Strategies
//! ```text
//! Fixed (one stride for every block):
//! ┌────┬─────────────┬────┬─────────────┬────┬─────────────┐
//! │Hdr │  payload    │Hdr │  payload    │Hdr │  payload    │
//! └────┴─────────────┴────┴─────────────┴────┴─────────────┘
//!  id = index * stride
//!
//! Dynamic (buddy regions of 2^n bytes):
//! ┌────┬─────────────────────────┬────┬───────────┬────┬─────┐
//! │Hdr │        2^6 region       │Hdr │ 2^5       │Hdr │ 2^5 │
//! └────┴─────────────────────────┴────┴───────────┴────┴─────┘
//!  Hdr = allocated bit | order
//! ```

mod dynamic;
mod fixed;
mod stream;

use crate::error::{AtlasError, Result};

pub use dynamic::{DynamicBlockBuffer, MAX_ORDER, MIN_ORDER};
pub use fixed::{fixed_stride, FixedBlockBuffer};
pub use stream::{BlockReader, BlockWriter};

/// Opaque block identifier (the block's byte address)
pub type BlockId = u64;

/// Iterator over allocated block ids
pub type BlockIds<'a> = Box<dyn Iterator<Item = Result<BlockId>> + 'a>;

/// Block allocator over a persistent buffer
pub trait BlockBuffer {
    /// Allocate a block with at least `min_size` usable bytes
    fn allocate(&mut self, min_size: u64) -> Result<BlockId>;

    /// Free a block. The id must not be used afterwards.
    fn deallocate(&mut self, id: BlockId) -> Result<()>;

    /// Usable payload size of a block (at least what was requested)
    fn block_size(&self, id: BlockId) -> Result<u64>;

    /// Read `dst.len()` bytes at `offset` inside the block
    fn get(&self, id: BlockId, offset: u64, dst: &mut [u8]) -> Result<()>;

    /// Write `src` at `offset` inside the block
    fn put(&mut self, id: BlockId, offset: u64, src: &[u8]) -> Result<()>;

    /// Currently allocated ids, in no particular order
    fn iter_block_ids(&self) -> BlockIds<'_>;

    fn barrier(&mut self, force: bool) -> Result<()>;

    /// Capacity of the underlying buffer
    fn capacity(&self) -> u64;

    fn close(&mut self) -> Result<()>;

    // =========================================================================
    // Provided Operations
    // =========================================================================

    /// Number of allocated blocks (walks every id)
    fn block_count(&self) -> Result<u64> {
        let mut count = 0;
        for id in self.iter_block_ids() {
            id?;
            count += 1;
        }
        Ok(count)
    }

    fn get_u8(&self, id: BlockId, offset: u64) -> Result<u8> {
        let mut bytes = [0u8; 1];
        self.get(id, offset, &mut bytes)?;
        Ok(bytes[0])
    }

    fn put_u8(&mut self, id: BlockId, offset: u64, value: u8) -> Result<()> {
        self.put(id, offset, &[value])
    }

    fn get_i32(&self, id: BlockId, offset: u64) -> Result<i32> {
        let mut bytes = [0u8; 4];
        self.get(id, offset, &mut bytes)?;
        Ok(i32::from_be_bytes(bytes))
    }

    fn put_i32(&mut self, id: BlockId, offset: u64, value: i32) -> Result<()> {
        self.put(id, offset, &value.to_be_bytes())
    }

    fn get_i64(&self, id: BlockId, offset: u64) -> Result<i64> {
        let mut bytes = [0u8; 8];
        self.get(id, offset, &mut bytes)?;
        Ok(i64::from_be_bytes(bytes))
    }

    fn put_i64(&mut self, id: BlockId, offset: u64, value: i64) -> Result<()> {
        self.put(id, offset, &value.to_be_bytes())
    }
}

impl<K: BlockBuffer + ?Sized> BlockBuffer for Box<K> {
    fn allocate(&mut self, min_size: u64) -> Result<BlockId> {
        (**self).allocate(min_size)
    }

    fn deallocate(&mut self, id: BlockId) -> Result<()> {
        (**self).deallocate(id)
    }

    fn block_size(&self, id: BlockId) -> Result<u64> {
        (**self).block_size(id)
    }

    fn get(&self, id: BlockId, offset: u64, dst: &mut [u8]) -> Result<()> {
        (**self).get(id, offset, dst)
    }

    fn put(&mut self, id: BlockId, offset: u64, src: &[u8]) -> Result<()> {
        (**self).put(id, offset, src)
    }

    fn iter_block_ids(&self) -> BlockIds<'_> {
        (**self).iter_block_ids()
    }

    fn barrier(&mut self, force: bool) -> Result<()> {
        (**self).barrier(force)
    }

    fn capacity(&self) -> u64 {
        (**self).capacity()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Bytes in front of every block's payload
pub(crate) const BLOCK_HEADER_SIZE: u64 = 1;

/// Check `[offset, offset + len)` against a block's usable size.
/// Reads past the end underflow; writes past the end overflow.
pub(crate) fn check_block_range(offset: u64, len: usize, size: u64, write: bool) -> Result<()> {
    let end = offset.checked_add(len as u64).ok_or_else(|| {
        AtlasError::InvalidArgument(format!("offset {} + length {} overflows", offset, len))
    })?;

    if end > size {
        let (position, len, capacity) = (offset, len as u64, size);
        return Err(if write {
            AtlasError::Overflow { position, len, capacity }
        } else {
            AtlasError::Underflow { position, len, capacity }
        });
    }
    Ok(())
}
