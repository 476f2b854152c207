//! Buffer and Block Buffer Selection
//!
//! Picks a buffer strategy from the expected size of the data and a block
//! allocator from what the serializer knows about record sizes.
//!
//! ```text
//!  expected_max_size < 1 GiB ────────────► MappedBuffer
//!  expected_max_size ≥ 1 GiB, 64-bit ────► ChunkedMappedBuffer
//!  expected_max_size ≥ 1 GiB, 32-bit ────► DirectBuffer
//!
//!  serializer.fixed_size() = Some(n) ────► FixedBlockBuffer(header + n)
//!  serializer.fixed_size() = None ───────► DynamicBlockBuffer
//! ```

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::block::{BlockBuffer, DynamicBlockBuffer, FixedBlockBuffer};
use crate::buffer::{ChunkedMappedBuffer, DirectBuffer, MappedBuffer, PersistentBuffer};
use crate::config::Config;
use crate::error::{AtlasError, Result};

pub use crate::serializer::default_serializer;

/// Expected sizes at or above this use a chunked (or direct) buffer
pub const MAPPED_SIZE_THRESHOLD: u64 = 1 << 30;

/// Buffer strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferKind {
    /// Choose from the expected maximum size
    #[default]
    Auto,
    Direct,
    Mapped,
    ChunkedMapped,
}

impl BufferKind {
    /// Strategy for a buffer expected to reach `max_size` bytes
    pub fn select(max_size: u64) -> BufferKind {
        if max_size < MAPPED_SIZE_THRESHOLD {
            BufferKind::Mapped
        } else if cfg!(target_pointer_width = "64") {
            BufferKind::ChunkedMapped
        } else {
            BufferKind::Direct
        }
    }

    /// Replace `Auto` with a concrete strategy
    pub fn resolve(self, max_size: u64) -> BufferKind {
        match self {
            BufferKind::Auto => BufferKind::select(max_size),
            kind => kind,
        }
    }
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BufferKind::Auto => "auto",
            BufferKind::Direct => "direct",
            BufferKind::Mapped => "mapped",
            BufferKind::ChunkedMapped => "chunked",
        };
        f.write_str(name)
    }
}

impl FromStr for BufferKind {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(BufferKind::Auto),
            "direct" => Ok(BufferKind::Direct),
            "mapped" => Ok(BufferKind::Mapped),
            "chunked" | "chunked-mapped" => Ok(BufferKind::ChunkedMapped),
            other => Err(AtlasError::Config(format!("unknown buffer kind: {}", other))),
        }
    }
}

/// Open the buffer described by `config`
pub fn open_buffer(config: &Config) -> Result<Box<dyn PersistentBuffer + Send>> {
    let kind = config.buffer_kind.resolve(config.expected_max_size);
    debug!(path = %config.path.display(), %kind, "opening buffer");

    let buffer: Box<dyn PersistentBuffer + Send> = match kind {
        BufferKind::Direct => Box::new(DirectBuffer::open(&config.path, config.read_only)?),
        BufferKind::Mapped => Box::new(MappedBuffer::open(&config.path, config.read_only)?),
        BufferKind::ChunkedMapped | BufferKind::Auto => Box::new(
            ChunkedMappedBuffer::with_segment_shift(
                &config.path,
                config.read_only,
                config.segment_shift,
            )?,
        ),
    };
    Ok(buffer)
}

/// Wrap `buffer` in a block allocator.
///
/// `record_size` is the usable size every block needs when it is known up
/// front; it selects a fixed-stride allocator. `None` selects the buddy
/// allocator.
pub fn open_block_buffer<B>(buffer: B, record_size: Option<u64>) -> Result<Box<dyn BlockBuffer + Send>>
where
    B: PersistentBuffer + Send + 'static,
{
    let blocks: Box<dyn BlockBuffer + Send> = match record_size {
        Some(size) => Box::new(FixedBlockBuffer::open(buffer, size)?),
        None => Box::new(DynamicBlockBuffer::open(buffer)?),
    };
    Ok(blocks)
}
