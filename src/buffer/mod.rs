//! Persistent Buffer Module
//!
//! Byte-addressable, growable, durable storage.
//!
//! ## Responsibilities
//! - Primitive and bulk get/put at absolute positions
//! - Capacity growth (zero-filled) and shrinking (tail discarded)
//! - Write-ordering barriers, optionally forced to the device
//! - One advisory whole-file lock per open buffer
//!
//! ## Strategies
//! ```text
//! ┌──────────────────────┬───────────────────────────────────────────┐
//! │ DirectBuffer         │ seek + read/write on the file handle      │
//! │                      │ portable, no size limit, slowest          │
//! ├──────────────────────┼───────────────────────────────────────────┤
//! │ MappedBuffer         │ one mapping of the whole file             │
//! │                      │ fastest, capped at 2^31 bytes             │
//! ├──────────────────────┼───────────────────────────────────────────┤
//! │ ChunkedMappedBuffer  │ 2^30-byte segments, mapped independently  │
//! │                      │ large files on 64-bit hosts               │
//! └──────────────────────┴───────────────────────────────────────────┘
//! ```
//!
//! None of the buffers are internally synchronized. Callers serialize access.

mod chunked;
mod direct;
mod mapped;

use std::fs::{File, OpenOptions};
use std::path::Path;

use fs2::FileExt;
use tracing::warn;

use crate::error::{AtlasError, Result};

pub use chunked::{ChunkedMappedBuffer, DEFAULT_SEGMENT_SHIFT};
pub use direct::DirectBuffer;
pub use mapped::{MappedBuffer, MAX_MAPPED_CAPACITY};

/// A byte-addressable durable address space `[0, capacity)`
pub trait PersistentBuffer {
    /// Current size of the address space in bytes
    fn capacity(&self) -> u64;

    /// Grow (zero-filling) or shrink (discarding the tail) the address space
    fn set_capacity(&mut self, capacity: u64) -> Result<()>;

    /// Read `dst.len()` bytes starting at `position`
    fn get(&self, position: u64, dst: &mut [u8]) -> Result<()>;

    /// Write `src` starting at `position`
    fn put(&mut self, position: u64, src: &[u8]) -> Result<()>;

    /// Make every write issued before this call visible before any write
    /// issued after it. With `force`, also wait until they are on the device.
    fn barrier(&mut self, force: bool) -> Result<()>;

    fn is_read_only(&self) -> bool;

    /// Release the file lock and mapping. Calling it twice is a no-op.
    fn close(&mut self) -> Result<()>;

    // =========================================================================
    // Provided Operations
    // =========================================================================

    /// Grow to at least `capacity`; never shrinks
    fn ensure_capacity(&mut self, capacity: u64) -> Result<()> {
        if capacity > self.capacity() {
            self.set_capacity(capacity)?;
        }
        Ok(())
    }

    /// Overwrite `len` bytes at `position` with zeros
    fn fill_zero(&mut self, position: u64, len: u64) -> Result<()> {
        const CHUNK: u64 = 8192;
        let zeros = [0u8; CHUNK as usize];
        let mut done = 0;
        while done < len {
            let n = (len - done).min(CHUNK);
            self.put(position + done, &zeros[..n as usize])?;
            done += n;
        }
        Ok(())
    }

    fn get_u8(&self, position: u64) -> Result<u8> {
        let mut bytes = [0u8; 1];
        self.get(position, &mut bytes)?;
        Ok(bytes[0])
    }

    fn put_u8(&mut self, position: u64, value: u8) -> Result<()> {
        self.put(position, &[value])
    }

    fn get_i16(&self, position: u64) -> Result<i16> {
        let mut bytes = [0u8; 2];
        self.get(position, &mut bytes)?;
        Ok(i16::from_be_bytes(bytes))
    }

    fn put_i16(&mut self, position: u64, value: i16) -> Result<()> {
        self.put(position, &value.to_be_bytes())
    }

    fn get_i32(&self, position: u64) -> Result<i32> {
        let mut bytes = [0u8; 4];
        self.get(position, &mut bytes)?;
        Ok(i32::from_be_bytes(bytes))
    }

    fn put_i32(&mut self, position: u64, value: i32) -> Result<()> {
        self.put(position, &value.to_be_bytes())
    }

    fn get_i64(&self, position: u64) -> Result<i64> {
        let mut bytes = [0u8; 8];
        self.get(position, &mut bytes)?;
        Ok(i64::from_be_bytes(bytes))
    }

    fn put_i64(&mut self, position: u64, value: i64) -> Result<()> {
        self.put(position, &value.to_be_bytes())
    }

    fn get_f32(&self, position: u64) -> Result<f32> {
        Ok(f32::from_bits(self.get_i32(position)? as u32))
    }

    fn put_f32(&mut self, position: u64, value: f32) -> Result<()> {
        self.put_i32(position, value.to_bits() as i32)
    }

    fn get_f64(&self, position: u64) -> Result<f64> {
        Ok(f64::from_bits(self.get_i64(position)? as u64))
    }

    fn put_f64(&mut self, position: u64, value: f64) -> Result<()> {
        self.put_i64(position, value.to_bits() as i64)
    }
}

impl<B: PersistentBuffer + ?Sized> PersistentBuffer for Box<B> {
    fn capacity(&self) -> u64 {
        (**self).capacity()
    }

    fn set_capacity(&mut self, capacity: u64) -> Result<()> {
        (**self).set_capacity(capacity)
    }

    fn get(&self, position: u64, dst: &mut [u8]) -> Result<()> {
        (**self).get(position, dst)
    }

    fn put(&mut self, position: u64, src: &[u8]) -> Result<()> {
        (**self).put(position, src)
    }

    fn barrier(&mut self, force: bool) -> Result<()> {
        (**self).barrier(force)
    }

    fn is_read_only(&self) -> bool {
        (**self).is_read_only()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

// =============================================================================
// Shared Helpers (used by every strategy)
// =============================================================================

/// Open `path` and take the whole-file advisory lock.
///
/// Read-write buffers take an exclusive lock and create the file if missing;
/// read-only buffers take a shared lock.
pub(crate) fn open_locked(path: &Path, read_only: bool) -> Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(!read_only)
        .create(!read_only)
        .open(path)?;

    // Explicit trait calls: std::fs::File has inherent lock methods of the same name
    let locked = if read_only {
        FileExt::try_lock_shared(&file)
    } else {
        FileExt::try_lock_exclusive(&file)
    };

    if let Err(e) = locked {
        if e.kind() == fs2::lock_contended_error().kind() {
            return Err(AtlasError::Locked(path.to_path_buf()));
        }
        return Err(AtlasError::Io(e));
    }

    Ok(file)
}

/// Release the advisory lock taken by [`open_locked`]
pub(crate) fn unlock(file: &File) -> Result<()> {
    FileExt::unlock(file)?;
    Ok(())
}

/// Put the file back to `len` bytes after a resize that failed halfway
pub(crate) fn restore_len(file: &File, len: u64) {
    if let Err(e) = file.set_len(len) {
        warn!(len, error = %e, "failed to restore file length after a failed resize");
    }
}

/// Bounds check for reads: `[position, position + len)` must lie in `[0, capacity)`
pub(crate) fn check_read(position: u64, len: usize, capacity: u64) -> Result<()> {
    let end = range_end(position, len)?;
    if end > capacity {
        return Err(AtlasError::Underflow {
            position,
            len: len as u64,
            capacity,
        });
    }
    Ok(())
}

/// Bounds check for writes: `[position, position + len)` must lie in `[0, capacity)`
pub(crate) fn check_write(position: u64, len: usize, capacity: u64) -> Result<()> {
    let end = range_end(position, len)?;
    if end > capacity {
        return Err(AtlasError::Overflow {
            position,
            len: len as u64,
            capacity,
        });
    }
    Ok(())
}

fn range_end(position: u64, len: usize) -> Result<u64> {
    position.checked_add(len as u64).ok_or_else(|| {
        AtlasError::InvalidArgument(format!(
            "position {} + length {} overflows",
            position, len
        ))
    })
}

/// Convert a capacity to a mapping length, failing instead of truncating
pub(crate) fn to_map_len(capacity: u64, limit: u64) -> Result<usize> {
    usize::try_from(capacity).map_err(|_| AtlasError::CapacityLimit {
        requested: capacity,
        limit,
    })
}
