//! Tests for the block buffers
//!
//! These tests verify:
//! - Fixed-stride allocation, slot reuse and id/index mapping
//! - Buddy allocation: split, merge, growth and space reclamation
//! - Free-space rebuild when reopening
//! - Bounds checks and stream access inside blocks

mod fixed_tests;

use std::path::{Path, PathBuf};

use atlasblock::block::{DynamicBlockBuffer, FixedBlockBuffer};
use atlasblock::buffer::{DirectBuffer, MappedBuffer};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

pub fn setup_temp_file(name: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(name);
    (temp_dir, path)
}

pub fn open_fixed(path: &Path, block_size: u64) -> FixedBlockBuffer<MappedBuffer> {
    FixedBlockBuffer::open(MappedBuffer::open(path, false).unwrap(), block_size).unwrap()
}

pub fn open_dynamic(path: &Path) -> DynamicBlockBuffer<MappedBuffer> {
    DynamicBlockBuffer::open(MappedBuffer::open(path, false).unwrap()).unwrap()
}

pub fn open_dynamic_direct(path: &Path) -> DynamicBlockBuffer<DirectBuffer> {
    DynamicBlockBuffer::open(DirectBuffer::open(path, false).unwrap()).unwrap()
}

/// Byte ranges `[id, id + size + header)` must not overlap
pub fn assert_disjoint(ranges: &mut [(u64, u64)]) {
    ranges.sort();
    for pair in ranges.windows(2) {
        let (start, len) = pair[0];
        assert!(
            start + len <= pair[1].0,
            "blocks at {} and {} overlap",
            start,
            pair[1].0
        );
    }
}
