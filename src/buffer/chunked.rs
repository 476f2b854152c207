//! Chunked Mapped Buffer
//!
//! Splits the address space into fixed `2^shift`-byte segments, each mapped
//! on its own, so the buffer can grow far past what one mapping addresses.
//!
//! ```text
//!  position ──► segment = position >> shift, offset = position & mask
//!
//!  ┌────────────┬────────────┬────────────┬──────┐
//!  │ segment 0  │ segment 1  │ segment 2  │ tail │   (tail may be partial)
//!  └────────────┴────────────┴────────────┴──────┘
//!                      ◄─── access ───►
//!            split into one copy per segment touched
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{AtlasError, Result};

use super::mapped::Mapping;
use super::{
    check_read, check_write, open_locked, restore_len, to_map_len, unlock, PersistentBuffer,
};

/// Default segment size: 2^30 bytes (1 GiB)
pub const DEFAULT_SEGMENT_SHIFT: u32 = 30;

/// Smallest allowed segment (one 4 KiB page)
const MIN_SEGMENT_SHIFT: u32 = 12;

/// Largest allowed segment (must stay mappable on its own)
const MAX_SEGMENT_SHIFT: u32 = 30;

/// Largest capacity a file offset can address
const MAX_CHUNKED_CAPACITY: u64 = i64::MAX as u64;

/// Buffer backed by a vector of independently mapped segments
pub struct ChunkedMappedBuffer {
    path: PathBuf,
    /// `None` once closed
    file: Option<File>,
    /// Segment `i` maps `[i << shift, min((i + 1) << shift, capacity))`
    segments: Vec<Mapping>,
    shift: u32,
    capacity: u64,
    read_only: bool,
    /// File length changed since the last forced barrier
    resized: bool,
}

impl ChunkedMappedBuffer {
    /// Open with the default 1 GiB segments
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Self> {
        Self::with_segment_shift(path, read_only, DEFAULT_SEGMENT_SHIFT)
    }

    /// Open with `2^shift`-byte segments
    pub fn with_segment_shift(path: impl AsRef<Path>, read_only: bool, shift: u32) -> Result<Self> {
        if !(MIN_SEGMENT_SHIFT..=MAX_SEGMENT_SHIFT).contains(&shift) {
            return Err(AtlasError::InvalidArgument(format!(
                "segment shift {} outside {}..={}",
                shift, MIN_SEGMENT_SHIFT, MAX_SEGMENT_SHIFT
            )));
        }

        let path = path.as_ref().to_path_buf();
        let file = open_locked(&path, read_only)?;
        let capacity = file.metadata()?.len();

        let segments = map_segments(&file, shift, read_only, 0, capacity)?;
        let buffer = Self {
            path,
            file: Some(file),
            segments,
            shift,
            capacity,
            read_only,
            resized: false,
        };

        debug!(
            path = %buffer.path.display(),
            capacity,
            segments = buffer.segments.len(),
            read_only,
            "opened chunked mapped buffer"
        );
        Ok(buffer)
    }

    /// Size of one segment in bytes
    pub fn segment_size(&self) -> u64 {
        1 << self.shift
    }

    /// Number of mapped segments
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_open(&self) -> Result<()> {
        if self.file.is_none() {
            return Err(AtlasError::Closed);
        }
        Ok(())
    }

    /// Walk `[position, position + len)` one segment at a time,
    /// yielding (segment index, offset in segment, bytes in this piece).
    fn pieces(shift: u32, position: u64, len: usize) -> impl Iterator<Item = (usize, usize, usize)> {
        let mask = (1u64 << shift) - 1;
        let segment_size = 1u64 << shift;
        let mut pos = position;
        let mut remaining = len as u64;

        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            let index = (pos >> shift) as usize;
            let offset = pos & mask;
            let n = remaining.min(segment_size - offset);
            pos += n;
            remaining -= n;
            Some((index, offset as usize, n as usize))
        })
    }
}

impl PersistentBuffer for ChunkedMappedBuffer {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn set_capacity(&mut self, capacity: u64) -> Result<()> {
        self.ensure_open()?;
        if self.read_only {
            return Err(AtlasError::ReadOnly);
        }
        if capacity > MAX_CHUNKED_CAPACITY {
            return Err(AtlasError::CapacityLimit {
                requested: capacity,
                limit: MAX_CHUNKED_CAPACITY,
            });
        }
        if capacity == self.capacity {
            return Ok(());
        }

        // Whole segments below both the old and new capacity stay mapped
        let keep = (self.capacity.min(capacity) >> self.shift) as usize;
        let file = self.file.as_ref().ok_or(AtlasError::Closed)?;

        // Nothing is committed until the file length and every new segment
        // are in place, so a failure leaves the old segments and capacity
        let mapped = if capacity > self.capacity {
            file.set_len(capacity)?;
            match map_segments(file, self.shift, false, keep, capacity) {
                Ok(mapped) => mapped,
                Err(e) => {
                    restore_len(file, self.capacity);
                    return Err(e);
                }
            }
        } else {
            let mapped = map_segments(file, self.shift, false, keep, capacity)?;
            file.set_len(capacity)?;
            mapped
        };

        self.segments.truncate(keep);
        self.segments.extend(mapped);

        debug!(
            path = %self.path.display(),
            from = self.capacity,
            to = capacity,
            kept_segments = keep,
            "resized chunked mapped buffer"
        );
        self.capacity = capacity;
        self.resized = true;
        Ok(())
    }

    fn get(&self, position: u64, dst: &mut [u8]) -> Result<()> {
        self.ensure_open()?;
        check_read(position, dst.len(), self.capacity)?;

        let mut done = 0;
        for (index, offset, n) in Self::pieces(self.shift, position, dst.len()) {
            let segment = self.segments[index].as_slice();
            dst[done..done + n].copy_from_slice(&segment[offset..offset + n]);
            done += n;
        }
        Ok(())
    }

    fn put(&mut self, position: u64, src: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if self.read_only {
            return Err(AtlasError::ReadOnly);
        }
        check_write(position, src.len(), self.capacity)?;

        let mut done = 0;
        for (index, offset, n) in Self::pieces(self.shift, position, src.len()) {
            let segment = self.segments[index].as_mut_slice()?;
            segment[offset..offset + n].copy_from_slice(&src[done..done + n]);
            done += n;
        }
        Ok(())
    }

    fn barrier(&mut self, force: bool) -> Result<()> {
        self.ensure_open()?;
        for segment in &self.segments {
            segment.flush(force)?;
        }

        if force && self.resized {
            if let Some(file) = &self.file {
                file.sync_data()?;
            }
            self.resized = false;
        }
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn close(&mut self) -> Result<()> {
        if self.file.is_none() {
            return Ok(());
        }

        if !self.read_only {
            self.barrier(true)?;
        }
        self.segments.clear();
        if let Some(file) = self.file.take() {
            unlock(&file)?;
        }
        debug!(path = %self.path.display(), "closed chunked mapped buffer");
        Ok(())
    }
}

/// Map the segments of `file` from index `first` up to `capacity`
fn map_segments(
    file: &File,
    shift: u32,
    read_only: bool,
    first: usize,
    capacity: u64,
) -> Result<Vec<Mapping>> {
    let segment_size = 1u64 << shift;
    let mut start = (first as u64) << shift;
    let mut segments = Vec::new();

    while start < capacity {
        let len = to_map_len((capacity - start).min(segment_size), segment_size)?;
        segments.push(Mapping::new(file, start, len, read_only)?);
        start += segment_size;
    }
    Ok(segments)
}

impl Drop for ChunkedMappedBuffer {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
