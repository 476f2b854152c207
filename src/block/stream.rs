//! Stream-style access to a single block
//!
//! `BlockReader` implements `std::io::Read` and `BlockWriter` implements
//! `std::io::Write`, so serializers can work straight against block storage.

use std::io::{self, Read, Write};

use crate::error::{AtlasError, Result};

use super::{BlockBuffer, BlockId};

/// Sequential reader over a byte range of one block
pub struct BlockReader<'a, K: BlockBuffer + ?Sized> {
    blocks: &'a K,
    id: BlockId,
    position: u64,
    end: u64,
}

impl<'a, K: BlockBuffer + ?Sized> BlockReader<'a, K> {
    /// Read the whole usable area of `id`
    pub fn new(blocks: &'a K, id: BlockId) -> Result<Self> {
        let end = blocks.block_size(id)?;
        Ok(Self {
            blocks,
            id,
            position: 0,
            end,
        })
    }

    /// Read `len` bytes starting at `offset`
    pub fn with_range(blocks: &'a K, id: BlockId, offset: u64, len: u64) -> Result<Self> {
        let size = blocks.block_size(id)?;
        let end = offset.checked_add(len).filter(|&end| end <= size).ok_or(
            AtlasError::Underflow {
                position: offset,
                len,
                capacity: size,
            },
        )?;
        Ok(Self {
            blocks,
            id,
            position: offset,
            end,
        })
    }

    /// Bytes left before the end of the range
    pub fn remaining(&self) -> u64 {
        self.end - self.position
    }
}

impl<K: BlockBuffer + ?Sized> Read for BlockReader<'_, K> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = (buf.len() as u64).min(self.remaining()) as usize;
        if n == 0 {
            return Ok(0);
        }

        self.blocks
            .get(self.id, self.position, &mut buf[..n])
            .map_err(io::Error::other)?;
        self.position += n as u64;
        Ok(n)
    }
}

/// Sequential writer into one block
pub struct BlockWriter<'a, K: BlockBuffer + ?Sized> {
    blocks: &'a mut K,
    id: BlockId,
    start: u64,
    position: u64,
    end: u64,
}

impl<'a, K: BlockBuffer + ?Sized> BlockWriter<'a, K> {
    /// Write into `id` starting at `offset`
    pub fn new(blocks: &'a mut K, id: BlockId, offset: u64) -> Result<Self> {
        let end = blocks.block_size(id)?;
        if offset > end {
            return Err(AtlasError::Overflow {
                position: offset,
                len: 0,
                capacity: end,
            });
        }
        Ok(Self {
            blocks,
            id,
            start: offset,
            position: offset,
            end,
        })
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.position - self.start
    }
}

impl<K: BlockBuffer + ?Sized> Write for BlockWriter<'_, K> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let n = (buf.len() as u64).min(self.end - self.position) as usize;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("block {} is full", self.id),
            ));
        }

        self.blocks
            .put(self.id, self.position, &buf[..n])
            .map_err(io::Error::other)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
