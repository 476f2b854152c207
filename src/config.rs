//! Configuration for AtlasBlock
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::select::BufferKind;

/// Main configuration for opening a persistent buffer (and anything built on it)
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Backing file. Created on first open unless `read_only` is set.
    pub path: PathBuf,

    /// Buffer strategy; `Auto` picks one from `expected_max_size`
    pub buffer_kind: BufferKind,

    /// Largest size the buffer is expected to reach (in bytes)
    pub expected_max_size: u64,

    /// Open the file read-only with a shared lock
    pub read_only: bool,

    /// log2 of the segment size used by the chunked mapped buffer
    pub segment_shift: u32,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// Whether commit barriers wait for the storage device
    pub barrier_policy: BarrierPolicy,
}

/// Barrier strategy for commit points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BarrierPolicy {
    /// Commit barriers are forced to the device (survives process and OS crashes)
    #[default]
    Durable,

    /// Commit barriers only order writes (faster, survives nothing beyond the process)
    Ordered,
}

impl BarrierPolicy {
    /// Value passed as `force` to commit barriers
    pub fn force(self) -> bool {
        matches!(self, BarrierPolicy::Durable)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./atlasblock.dat"),
            buffer_kind: BufferKind::Auto,
            expected_max_size: 64 * 1024 * 1024, // 64 MB
            read_only: false,
            segment_shift: crate::buffer::DEFAULT_SEGMENT_SHIFT,
            barrier_policy: BarrierPolicy::Durable,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the backing file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Force a buffer strategy instead of size-based selection
    pub fn buffer_kind(mut self, kind: BufferKind) -> Self {
        self.config.buffer_kind = kind;
        self
    }

    /// Set the expected maximum size (in bytes)
    pub fn expected_max_size(mut self, size: u64) -> Self {
        self.config.expected_max_size = size;
        self
    }

    /// Open read-only
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.read_only = read_only;
        self
    }

    /// Set the chunked segment size as a power of two
    pub fn segment_shift(mut self, shift: u32) -> Self {
        self.config.segment_shift = shift;
        self
    }

    /// Set the commit barrier policy
    pub fn barrier_policy(mut self, policy: BarrierPolicy) -> Self {
        self.config.barrier_policy = policy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
