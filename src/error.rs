//! Error types for AtlasBlock
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using AtlasError
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Unified error type for AtlasBlock operations
#[derive(Debug, Error)]
pub enum AtlasError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Argument Errors (caller's fault, never retried)
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Buffer is closed")]
    Closed,

    #[error("Buffer is read-only")]
    ReadOnly,

    #[error("File is locked by another buffer: {}", .0.display())]
    Locked(PathBuf),

    // -------------------------------------------------------------------------
    // Capacity / Bounds Errors
    // -------------------------------------------------------------------------
    #[error("Overflow: writing {len} bytes at {position} exceeds capacity {capacity}")]
    Overflow { position: u64, len: u64, capacity: u64 },

    #[error("Underflow: reading {len} bytes at {position} exceeds capacity {capacity}")]
    Underflow { position: u64, len: u64, capacity: u64 },

    #[error("Capacity {requested} exceeds the {limit} byte limit of this buffer")]
    CapacityLimit { requested: u64, limit: u64 },

    #[error("Invalid block id: {0}")]
    InvalidBlock(u64),

    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: u64, len: u64 },

    #[error("No such element")]
    NoSuchElement,

    // -------------------------------------------------------------------------
    // Format Errors (fatal at open time)
    // -------------------------------------------------------------------------
    #[error("Format error: {0}")]
    Format(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("List links were left half-updated by a failed write; reopen the list")]
    Poisoned,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Iteration Errors
    // -------------------------------------------------------------------------
    #[error("Concurrent modification detected")]
    ConcurrentModification,

    #[error("Illegal state: {0}")]
    IllegalState(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for AtlasError {
    fn from(err: bincode::Error) -> Self {
        AtlasError::Serialization(err.to_string())
    }
}
