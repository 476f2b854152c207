//! Direct File Buffer
//!
//! Every operation seeks and reads/writes through the file handle.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{AtlasError, Result};

use super::{check_read, check_write, open_locked, unlock, PersistentBuffer};

/// Largest capacity a file offset can address
const MAX_DIRECT_CAPACITY: u64 = i64::MAX as u64;

/// Buffer backed by plain positioned file I/O
///
/// Writes go straight to the OS, so in-process ordering needs no work;
/// a forced barrier calls `sync_data`.
pub struct DirectBuffer {
    /// Path of the backing file (for errors and logging)
    path: PathBuf,
    /// `None` once closed
    file: Option<File>,
    /// Cached file length
    capacity: u64,
    read_only: bool,
}

impl DirectBuffer {
    /// Open (or create, unless read-only) the file at `path`
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_locked(&path, read_only)?;
        let capacity = file.metadata()?.len();

        debug!(path = %path.display(), capacity, read_only, "opened direct buffer");

        Ok(Self {
            path,
            file: Some(file),
            capacity,
            read_only,
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&self) -> Result<&File> {
        self.file.as_ref().ok_or(AtlasError::Closed)
    }

    fn writable_file(&self) -> Result<&File> {
        let file = self.file()?;
        if self.read_only {
            return Err(AtlasError::ReadOnly);
        }
        Ok(file)
    }
}

impl PersistentBuffer for DirectBuffer {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn set_capacity(&mut self, capacity: u64) -> Result<()> {
        let file = self.writable_file()?;
        if capacity > MAX_DIRECT_CAPACITY {
            return Err(AtlasError::CapacityLimit {
                requested: capacity,
                limit: MAX_DIRECT_CAPACITY,
            });
        }

        // set_len zero-fills on growth and discards on shrink
        file.set_len(capacity)?;
        debug!(path = %self.path.display(), from = self.capacity, to = capacity, "resized direct buffer");
        self.capacity = capacity;
        Ok(())
    }

    fn get(&self, position: u64, dst: &mut [u8]) -> Result<()> {
        let mut file = self.file()?;
        check_read(position, dst.len(), self.capacity)?;
        if dst.is_empty() {
            return Ok(());
        }

        file.seek(SeekFrom::Start(position))?;
        file.read_exact(dst)?;
        Ok(())
    }

    fn put(&mut self, position: u64, src: &[u8]) -> Result<()> {
        let mut file = self.writable_file()?;
        check_write(position, src.len(), self.capacity)?;
        if src.is_empty() {
            return Ok(());
        }

        file.seek(SeekFrom::Start(position))?;
        file.write_all(src)?;
        Ok(())
    }

    fn barrier(&mut self, force: bool) -> Result<()> {
        let file = self.file()?;
        if force && !self.read_only {
            file.sync_data()?;
        }
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn close(&mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };

        if !self.read_only {
            file.sync_all()?;
        }
        unlock(&file)?;
        debug!(path = %self.path.display(), "closed direct buffer");
        Ok(())
    }
}

impl Drop for DirectBuffer {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
