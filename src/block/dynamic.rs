//! Dynamic Block Buffer
//!
//! Variable-size blocks managed with a buddy allocator.
//!
//! ## Region Format
//! ```text
//! ┌──────────┬──────────────────────────────┐
//! │Header (1)│ Payload (2^order - 1)        │
//! └──────────┴──────────────────────────────┘
//!  Header: bit 7 = allocated, bits 0..5 = order
//! ```
//!
//! ## Layout Invariants
//! - Capacity is zero or a power of two
//! - `[0, capacity)` is tiled by regions; a region of order `n` starts at a
//!   multiple of `2^n`
//! - The buddy of region `(addr, n)` is `(addr ^ 2^n, n)`
//!
//! ## Free-Space Map
//! Not persisted. Rebuilt by one scan over every region header at open,
//! which costs O(regions) at startup but needs no separate on-disk index.
//!
//! A zero header byte is never written (order 0 is below `MIN_ORDER`). It is
//! what growth leaves behind when the file was extended but the new region's
//! header was not yet written, and it reads as one free region as large as
//! its alignment and the capacity allow.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use crate::buffer::PersistentBuffer;
use crate::error::{AtlasError, Result};

use super::{check_block_range, BlockBuffer, BlockId, BlockIds, BLOCK_HEADER_SIZE};

/// Smallest region: 16 bytes (15 usable)
pub const MIN_ORDER: u32 = 4;

/// Largest region: 2^62 bytes
pub const MAX_ORDER: u32 = 62;

const ALLOCATED_BIT: u8 = 0x80;
const ORDER_MASK: u8 = 0x3f;

/// Header of zero-filled space that growth has not labelled yet
const UNWRITTEN: u8 = 0;

/// Block buffer with power-of-two regions and buddy split/merge
pub struct DynamicBlockBuffer<B> {
    buffer: B,
    /// `free[n]` holds the addresses of free regions of order `n`
    free: Vec<BTreeSet<u64>>,
    /// Number of allocated regions
    allocated: u64,
}

impl<B: PersistentBuffer> DynamicBlockBuffer<B> {
    /// Open over `buffer`, rebuilding the free-space map by scanning it
    pub fn open(buffer: B) -> Result<Self> {
        let capacity = buffer.capacity();
        if capacity != 0 && !capacity.is_power_of_two() {
            return Err(AtlasError::Format(format!(
                "capacity {} is not a power of two",
                capacity
            )));
        }

        let mut free = vec![BTreeSet::new(); MAX_ORDER as usize + 1];
        let mut allocated = 0;
        let mut position = 0;
        while position < capacity {
            let (order, is_allocated) = read_header(&buffer, position, capacity)?;
            if is_allocated {
                allocated += 1;
            } else {
                free[order as usize].insert(position);
            }
            position += 1 << order;
        }

        let blocks = Self {
            buffer,
            free,
            allocated,
        };
        debug!(
            capacity,
            allocated,
            free_regions = blocks.free_region_count(),
            "opened dynamic block buffer"
        );
        Ok(blocks)
    }

    /// Number of allocated blocks
    pub fn allocated_count(&self) -> u64 {
        self.allocated
    }

    /// Number of free regions in the free-space map
    pub fn free_region_count(&self) -> usize {
        self.free.iter().map(BTreeSet::len).sum()
    }

    /// Total bytes held by free regions (headers included)
    pub fn free_bytes(&self) -> u64 {
        self.free
            .iter()
            .enumerate()
            .map(|(order, set)| (set.len() as u64) << order)
            .sum()
    }

    /// The underlying buffer
    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    pub fn into_inner(self) -> B {
        self.buffer
    }

    /// Validate that `id` names an allocated region and return its order
    fn allocated_order(&self, id: BlockId) -> Result<u32> {
        let capacity = self.buffer.capacity();
        if id >= capacity {
            return Err(AtlasError::InvalidBlock(id));
        }
        match read_header(&self.buffer, id, capacity) {
            Ok((order, true)) => Ok(order),
            Ok((_, false)) | Err(AtlasError::Corruption(_)) => Err(AtlasError::InvalidBlock(id)),
            Err(e) => Err(e),
        }
    }

    fn write_header(&mut self, address: u64, order: u32, allocated: bool) -> Result<()> {
        let mut header = order as u8 & ORDER_MASK;
        if allocated {
            header |= ALLOCATED_BIT;
        }
        self.buffer.put_u8(address, header)
    }

    /// Smallest free region of at least `order`, removed from the map
    fn take_free(&mut self, order: u32) -> Option<(u64, u32)> {
        (order..=MAX_ORDER).find_map(|candidate| {
            self.free[candidate as usize]
                .pop_first()
                .map(|address| (address, candidate))
        })
    }

    /// Return a region to the free map, merging with free buddies upwards
    fn release(&mut self, mut address: u64, mut order: u32) -> Result<()> {
        let capacity = self.buffer.capacity();
        while order < MAX_ORDER && (2u64 << order) <= capacity {
            let buddy = address ^ (1 << order);
            if !self.free[order as usize].remove(&buddy) {
                break;
            }
            address = address.min(buddy);
            order += 1;
        }

        self.write_header(address, order, false)?;
        self.free[order as usize].insert(address);
        Ok(())
    }

    /// Split the free region `(address, found)` down to `order` and mark the
    /// lower part allocated. Upper halves are written before the region's own
    /// header, which keeps describing the whole region until the last write.
    fn claim(&mut self, address: u64, found: u32, order: u32) -> Result<()> {
        for half in (order..found).rev() {
            self.write_header(address + (1 << half), half, false)?;
        }
        self.write_header(address, order, true)?;

        for half in order..found {
            self.free[half as usize].insert(address + (1 << half));
        }
        Ok(())
    }

    /// Double the buffer (or size it for the first region) so that a free
    /// region of at least `order` exists
    fn grow(&mut self, order: u32) -> Result<()> {
        let capacity = self.buffer.capacity();

        if capacity == 0 {
            self.buffer.set_capacity(1 << order)?;
            self.write_header(0, order, false)?;
            self.free[order as usize].insert(0);
            debug!(capacity = 1u64 << order, "initialized dynamic block buffer");
            return Ok(());
        }

        let top = capacity.trailing_zeros();
        if top >= MAX_ORDER {
            return Err(AtlasError::CapacityLimit {
                requested: capacity.saturating_mul(2),
                limit: 1 << MAX_ORDER,
            });
        }

        self.buffer.set_capacity(capacity * 2)?;
        debug!(from = capacity, to = capacity * 2, "grew dynamic block buffer");
        // The new upper half is the buddy of [0, capacity)
        self.release(capacity, top)
    }
}

impl<B: PersistentBuffer> BlockBuffer for DynamicBlockBuffer<B> {
    fn allocate(&mut self, min_size: u64) -> Result<BlockId> {
        let order = order_for(min_size)?;

        let (address, found) = loop {
            if let Some(region) = self.take_free(order) {
                break region;
            }
            self.grow(order)?;
        };

        if let Err(e) = self.claim(address, found, order) {
            self.free[found as usize].insert(address);
            return Err(e);
        }
        self.allocated += 1;
        trace!(id = address, order, "allocated dynamic block");
        Ok(address)
    }

    fn deallocate(&mut self, id: BlockId) -> Result<()> {
        let order = self.allocated_order(id)?;
        self.release(id, order)?;
        self.allocated -= 1;
        trace!(id, order, "freed dynamic block");
        Ok(())
    }

    fn block_size(&self, id: BlockId) -> Result<u64> {
        let order = self.allocated_order(id)?;
        Ok((1 << order) - BLOCK_HEADER_SIZE)
    }

    fn get(&self, id: BlockId, offset: u64, dst: &mut [u8]) -> Result<()> {
        let size = self.block_size(id)?;
        check_block_range(offset, dst.len(), size, false)?;
        self.buffer.get(id + BLOCK_HEADER_SIZE + offset, dst)
    }

    fn put(&mut self, id: BlockId, offset: u64, src: &[u8]) -> Result<()> {
        let size = self.block_size(id)?;
        check_block_range(offset, src.len(), size, true)?;
        self.buffer.put(id + BLOCK_HEADER_SIZE + offset, src)
    }

    fn iter_block_ids(&self) -> BlockIds<'_> {
        Box::new(RegionScan {
            buffer: &self.buffer,
            position: 0,
            capacity: self.buffer.capacity(),
        })
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
        Ok(self.allocated)
    }
}

// =============================================================================
// Region Scan
// =============================================================================

/// Walks region headers from address 0, yielding allocated addresses
struct RegionScan<'a, B> {
    buffer: &'a B,
    position: u64,
    capacity: u64,
}

impl<B: PersistentBuffer> Iterator for RegionScan<'_, B> {
    type Item = Result<BlockId>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.position < self.capacity {
            let address = self.position;
            match read_header(self.buffer, address, self.capacity) {
                Ok((order, allocated)) => {
                    self.position += 1 << order;
                    if allocated {
                        return Some(Ok(address));
                    }
                }
                Err(e) => {
                    self.position = self.capacity;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Order of the smallest region whose payload holds `min_size` bytes
fn order_for(min_size: u64) -> Result<u32> {
    let needed = min_size
        .checked_add(BLOCK_HEADER_SIZE)
        .filter(|&needed| needed <= 1 << MAX_ORDER)
        .ok_or_else(|| {
            AtlasError::InvalidArgument(format!("block of {} bytes is too large", min_size))
        })?;

    let order = needed.next_power_of_two().trailing_zeros();
    Ok(order.max(MIN_ORDER))
}

/// Read and validate the region header at `address`
fn read_header<B: PersistentBuffer + ?Sized>(
    buffer: &B,
    address: u64,
    capacity: u64,
) -> Result<(u32, bool)> {
    let header = buffer.get_u8(address)?;
    if header == UNWRITTEN {
        if let Some(order) = unwritten_order(address, capacity) {
            return Ok((order, false));
        }
    }

    let order = (header & ORDER_MASK) as u32;
    let allocated = header & ALLOCATED_BIT != 0;

    let valid = (MIN_ORDER..=MAX_ORDER).contains(&order)
        && address % (1 << order) == 0
        && address
            .checked_add(1 << order)
            .is_some_and(|end| end <= capacity);

    if !valid {
        return Err(AtlasError::Corruption(format!(
            "invalid region header 0x{:02x} at {}",
            header, address
        )));
    }
    Ok((order, allocated))
}

/// Order of the largest region aligned at `address` that fits in `capacity`
fn unwritten_order(address: u64, capacity: u64) -> Option<u32> {
    let room = capacity.checked_sub(address).filter(|&room| room > 0)?;
    let fits = 63 - room.leading_zeros();
    let aligned = if address == 0 {
        MAX_ORDER
    } else {
        address.trailing_zeros()
    };

    let order = fits.min(aligned).min(MAX_ORDER);
    (order >= MIN_ORDER).then_some(order)
}
