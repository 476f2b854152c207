//! Fixed-Size Block Buffer
//!
//! Every block occupies the same power-of-two stride, so block `n` lives at
//! `n * stride` and ids map to ordinal positions in O(1).
//!
//! ## Slot Format
//! ```text
//! ┌──────────┬──────────────────────────────┐
//! │Status (1)│ Payload (stride - 1)         │
//! └──────────┴──────────────────────────────┘
//!  Status: 0 = free (also fresh zero-filled slots), 1 = allocated
//! ```
//!
//! The free slot set is rebuilt by scanning every status byte at open.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use crate::buffer::PersistentBuffer;
use crate::error::{AtlasError, Result};

use super::{check_block_range, BlockBuffer, BlockId, BlockIds, BLOCK_HEADER_SIZE};

const SLOT_FREE: u8 = 0;
const SLOT_ALLOCATED: u8 = 1;

/// Largest stride that is still rounded up to a power of two
const MAX_ROUNDED_STRIDE: u64 = 1 << 62;

/// Stride for blocks of `block_size` usable bytes: header plus payload,
/// rounded up to a power of two unless rounding would pass 2^62.
pub fn fixed_stride(block_size: u64) -> Result<u64> {
    let raw = block_size.checked_add(BLOCK_HEADER_SIZE).ok_or_else(|| {
        AtlasError::InvalidArgument(format!("block size {} too large", block_size))
    })?;

    if raw > MAX_ROUNDED_STRIDE {
        return Ok(raw);
    }
    Ok(raw.next_power_of_two())
}

/// Block buffer with one stride for every block
pub struct FixedBlockBuffer<B> {
    buffer: B,
    stride: u64,
    /// Number of slots the buffer currently holds
    slots: u64,
    /// Indices of free slots
    free: BTreeSet<u64>,
}

impl<B: PersistentBuffer> FixedBlockBuffer<B> {
    /// Open over `buffer` with blocks of at least `block_size` usable bytes.
    ///
    /// The same `block_size` must be used every time a buffer is reopened.
    pub fn open(buffer: B, block_size: u64) -> Result<Self> {
        let stride = fixed_stride(block_size)?;
        let capacity = buffer.capacity();
        if capacity % stride != 0 {
            return Err(AtlasError::Format(format!(
                "capacity {} is not a multiple of the block stride {}",
                capacity, stride
            )));
        }

        let slots = capacity / stride;
        let mut free = BTreeSet::new();
        for index in 0..slots {
            match buffer.get_u8(index * stride)? {
                SLOT_FREE => {
                    free.insert(index);
                }
                SLOT_ALLOCATED => {}
                status => {
                    return Err(AtlasError::Corruption(format!(
                        "slot {} has invalid status byte 0x{:02x}",
                        index, status
                    )));
                }
            }
        }

        debug!(stride, slots, free = free.len(), "opened fixed block buffer");

        Ok(Self {
            buffer,
            stride,
            slots,
            free,
        })
    }

    /// Distance between consecutive blocks
    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Slots currently backed by the buffer (allocated or free)
    pub fn slot_count(&self) -> u64 {
        self.slots
    }

    /// Id of the block in slot `index`
    pub fn block_id(&self, index: u64) -> Result<BlockId> {
        if index >= self.slots {
            return Err(AtlasError::IndexOutOfBounds {
                index,
                len: self.slots,
            });
        }
        Ok(index * self.stride)
    }

    /// Slot index of `id`
    pub fn block_index(&self, id: BlockId) -> Result<u64> {
        if id % self.stride != 0 || id / self.stride >= self.slots {
            return Err(AtlasError::InvalidBlock(id));
        }
        Ok(id / self.stride)
    }

    /// Whether slot `index` holds an allocated block
    pub fn is_allocated(&self, index: u64) -> bool {
        index < self.slots && !self.free.contains(&index)
    }

    /// The underlying buffer
    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    pub fn into_inner(self) -> B {
        self.buffer
    }

    /// Validate `id` and return its usable size
    fn checked_size(&self, id: BlockId) -> Result<u64> {
        let index = self.block_index(id)?;
        if self.free.contains(&index) {
            return Err(AtlasError::InvalidBlock(id));
        }
        Ok(self.stride - BLOCK_HEADER_SIZE)
    }

    /// Add slots, doubling when the buffer allows it and falling back to one
    fn grow(&mut self) -> Result<()> {
        let wanted = self.slots.max(1).saturating_mul(2);
        let capacity = wanted.checked_mul(self.stride);

        let grown = match capacity {
            Some(capacity) => self.buffer.set_capacity(capacity),
            None => Err(AtlasError::CapacityLimit {
                requested: u64::MAX,
                limit: self.buffer.capacity(),
            }),
        };

        let new_slots = match grown {
            Ok(()) => wanted,
            Err(AtlasError::CapacityLimit { .. }) => {
                let one_more = self.slots + 1;
                let capacity = one_more.checked_mul(self.stride).ok_or(AtlasError::CapacityLimit {
                    requested: u64::MAX,
                    limit: self.buffer.capacity(),
                })?;
                self.buffer.set_capacity(capacity)?;
                one_more
            }
            Err(e) => return Err(e),
        };

        // Fresh slots are zero-filled, which reads as free
        self.free.extend(self.slots..new_slots);
        debug!(from = self.slots, to = new_slots, "grew fixed block buffer");
        self.slots = new_slots;
        Ok(())
    }
}

impl<B: PersistentBuffer> BlockBuffer for FixedBlockBuffer<B> {
    fn allocate(&mut self, min_size: u64) -> Result<BlockId> {
        let usable = self.stride - BLOCK_HEADER_SIZE;
        if min_size > usable {
            return Err(AtlasError::InvalidArgument(format!(
                "requested {} bytes, fixed blocks hold {}",
                min_size, usable
            )));
        }

        if self.free.is_empty() {
            self.grow()?;
        }
        let index = self
            .free
            .pop_first()
            .ok_or_else(|| AtlasError::IllegalState("no free slot after growth".to_string()))?;

        let id = index * self.stride;
        if let Err(e) = self.buffer.put_u8(id, SLOT_ALLOCATED) {
            self.free.insert(index);
            return Err(e);
        }

        trace!(id, index, "allocated fixed block");
        Ok(id)
    }

    fn deallocate(&mut self, id: BlockId) -> Result<()> {
        self.checked_size(id)?;
        let index = id / self.stride;
        self.buffer.put_u8(id, SLOT_FREE)?;
        self.free.insert(index);
        trace!(id, index, "freed fixed block");
        Ok(())
    }

    fn block_size(&self, id: BlockId) -> Result<u64> {
        self.checked_size(id)
    }

    fn get(&self, id: BlockId, offset: u64, dst: &mut [u8]) -> Result<()> {
        let size = self.checked_size(id)?;
        check_block_range(offset, dst.len(), size, false)?;
        self.buffer.get(id + BLOCK_HEADER_SIZE + offset, dst)
    }

    fn put(&mut self, id: BlockId, offset: u64, src: &[u8]) -> Result<()> {
        let size = self.checked_size(id)?;
        check_block_range(offset, src.len(), size, true)?;
        self.buffer.put(id + BLOCK_HEADER_SIZE + offset, src)
    }

    fn iter_block_ids(&self) -> BlockIds<'_> {
        let stride = self.stride;
        Box::new(
            (0..self.slots)
                .filter(move |index| !self.free.contains(index))
                .map(move |index| Ok(index * stride)),
        )
    }

    fn barrier(&mut self, force: bool) -> Result<()> {
        self.buffer.barrier(force)
    }

    fn capacity(&self) -> u64 {
        self.buffer.capacity()
    }

    fn close(&mut self) -> Result<()> {
        self.buffer.close()
    }

    fn block_count(&self) -> Result<u64> {
        Ok(self.slots - self.free.len() as u64)
    }
}
