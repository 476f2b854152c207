//! Single Mapped Buffer
//!
//! The whole file is mapped into one region. Growth remaps.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut, MmapOptions};
use tracing::debug;

use crate::error::{AtlasError, Result};

use super::{
    check_read, check_write, open_locked, restore_len, to_map_len, unlock, PersistentBuffer,
};

/// Largest capacity a single mapping is allowed to reach (2 GiB)
pub const MAX_MAPPED_CAPACITY: u64 = 1 << 31;

// =============================================================================
// Mapping (shared with the chunked buffer)
// =============================================================================

/// One mapped window of the backing file
pub(super) enum Mapping {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

impl Mapping {
    /// Map `len` bytes of `file` starting at `offset`
    pub(super) fn new(file: &File, offset: u64, len: usize, read_only: bool) -> Result<Self> {
        let mut options = MmapOptions::new();
        options.offset(offset).len(len);

        // SAFETY: the file is held under an advisory lock for the lifetime of
        // the mapping, and no byte past the file's current length is accessed
        // through a mapping.
        let mapping = unsafe {
            if read_only {
                Mapping::ReadOnly(options.map(file)?)
            } else {
                Mapping::ReadWrite(options.map_mut(file)?)
            }
        };
        Ok(mapping)
    }

    pub(super) fn as_slice(&self) -> &[u8] {
        match self {
            Mapping::ReadOnly(map) => &map[..],
            Mapping::ReadWrite(map) => &map[..],
        }
    }

    pub(super) fn as_mut_slice(&mut self) -> Result<&mut [u8]> {
        match self {
            Mapping::ReadOnly(_) => Err(AtlasError::ReadOnly),
            Mapping::ReadWrite(map) => Ok(&mut map[..]),
        }
    }

    /// Schedule (or, with `force`, wait for) write-back of dirty pages
    pub(super) fn flush(&self, force: bool) -> Result<()> {
        if let Mapping::ReadWrite(map) = self {
            if force {
                map.flush()?;
            } else {
                map.flush_async()?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// MappedBuffer
// =============================================================================

/// Buffer backed by a single memory mapping of the whole file
pub struct MappedBuffer {
    path: PathBuf,
    /// `None` once closed
    file: Option<File>,
    /// `None` while the capacity is zero
    map: Option<Mapping>,
    capacity: u64,
    read_only: bool,
    /// File length changed since the last forced barrier
    resized: bool,
}

impl MappedBuffer {
    /// Open (or create, unless read-only) and map the file at `path`
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_locked(&path, read_only)?;
        let capacity = file.metadata()?.len();

        if capacity > MAX_MAPPED_CAPACITY {
            unlock(&file)?;
            return Err(AtlasError::CapacityLimit {
                requested: capacity,
                limit: MAX_MAPPED_CAPACITY,
            });
        }

        let map = if capacity > 0 {
            let len = to_map_len(capacity, MAX_MAPPED_CAPACITY)?;
            Some(Mapping::new(&file, 0, len, read_only)?)
        } else {
            None
        };

        debug!(path = %path.display(), capacity, read_only, "opened mapped buffer");

        Ok(Self {
            path,
            file: Some(file),
            map,
            capacity,
            read_only,
            resized: false,
        })
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
}

impl PersistentBuffer for MappedBuffer {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn set_capacity(&mut self, capacity: u64) -> Result<()> {
        self.ensure_open()?;
        if self.read_only {
            return Err(AtlasError::ReadOnly);
        }
        if capacity > MAX_MAPPED_CAPACITY {
            return Err(AtlasError::CapacityLimit {
                requested: capacity,
                limit: MAX_MAPPED_CAPACITY,
            });
        }
        if capacity == self.capacity {
            return Ok(());
        }
        let len = to_map_len(capacity, MAX_MAPPED_CAPACITY)?;
        let file = self.file.as_ref().ok_or(AtlasError::Closed)?;
        let map_new = || -> Result<Option<Mapping>> {
            if capacity == 0 {
                return Ok(None);
            }
            Mapping::new(file, 0, len, false).map(Some)
        };

        // The old mapping stays installed until the file and the new mapping
        // are both in place: growth extends the file first, shrinking maps
        // the smaller window first.
        let map = if capacity > self.capacity {
            file.set_len(capacity)?;
            match map_new() {
                Ok(map) => map,
                Err(e) => {
                    restore_len(file, self.capacity);
                    return Err(e);
                }
            }
        } else {
            let map = map_new()?;
            file.set_len(capacity)?;
            map
        };
        self.map = map;

        debug!(path = %self.path.display(), from = self.capacity, to = capacity, "remapped buffer");
        self.capacity = capacity;
        self.resized = true;
        Ok(())
    }

    fn get(&self, position: u64, dst: &mut [u8]) -> Result<()> {
        self.ensure_open()?;
        check_read(position, dst.len(), self.capacity)?;
        if dst.is_empty() {
            return Ok(());
        }

        // Bounds check above guarantees a mapping exists
        let map = self.map.as_ref().ok_or(AtlasError::Closed)?;
        let start = position as usize;
        dst.copy_from_slice(&map.as_slice()[start..start + dst.len()]);
        Ok(())
    }

    fn put(&mut self, position: u64, src: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if self.read_only {
            return Err(AtlasError::ReadOnly);
        }
        check_write(position, src.len(), self.capacity)?;
        if src.is_empty() {
            return Ok(());
        }

        let map = self.map.as_mut().ok_or(AtlasError::Closed)?;
        let start = position as usize;
        map.as_mut_slice()?[start..start + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn barrier(&mut self, force: bool) -> Result<()> {
        self.ensure_open()?;
        if let Some(map) = &self.map {
            map.flush(force)?;
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
        self.map = None;
        if let Some(file) = self.file.take() {
            unlock(&file)?;
        }
        debug!(path = %self.path.display(), "closed mapped buffer");
        Ok(())
    }
}

impl Drop for MappedBuffer {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
