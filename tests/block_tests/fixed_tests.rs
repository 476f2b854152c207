//! Tests for FixedBlockBuffer

use atlasblock::block::{fixed_stride, FixedBlockBuffer};
use atlasblock::buffer::{DirectBuffer, MappedBuffer};
use atlasblock::{AtlasError, BlockBuffer, PersistentBuffer};

use super::*;

#[test]
fn test_stride_rounding() {
    assert_eq!(fixed_stride(0).unwrap(), 1);
    assert_eq!(fixed_stride(15).unwrap(), 16);
    assert_eq!(fixed_stride(16).unwrap(), 32);
    assert_eq!(fixed_stride(24 + 8).unwrap(), 64);
    assert_eq!(fixed_stride(1000).unwrap(), 1024);

    // Past 2^62 the size is used as is
    assert_eq!(fixed_stride(1 << 62).unwrap(), (1 << 62) + 1);
    assert!(fixed_stride(u64::MAX).is_err());
}

#[test]
fn test_sequential_allocation() {
    let (_temp, path) = setup_temp_file("fixed.dat");
    let mut blocks = open_fixed(&path, 31);
    assert_eq!(blocks.stride(), 32);

    let ids: Vec<u64> = (0..5).map(|_| blocks.allocate(31).unwrap()).collect();
    assert_eq!(ids, vec![0, 32, 64, 96, 128]);

    for (index, id) in ids.iter().enumerate() {
        assert_eq!(blocks.block_id(index as u64).unwrap(), *id);
        assert_eq!(blocks.block_index(*id).unwrap(), index as u64);
        assert_eq!(blocks.block_size(*id).unwrap(), 31);
    }
    assert_eq!(blocks.block_count().unwrap(), 5);
}

#[test]
fn test_allocations_never_overlap() {
    let (_temp, path) = setup_temp_file("fixed.dat");
    let mut blocks = open_fixed(&path, 20);

    let mut live = Vec::new();
    for round in 0..200u64 {
        live.push(blocks.allocate(20).unwrap());
        if round % 3 == 0 {
            let id = live.remove(live.len() / 2);
            blocks.deallocate(id).unwrap();
        }
    }

    let stride = blocks.stride();
    let mut ranges: Vec<(u64, u64)> = live.iter().map(|&id| (id, stride)).collect();
    assert_disjoint(&mut ranges);
    assert_eq!(blocks.block_count().unwrap(), live.len() as u64);
}

#[test]
fn test_lowest_free_slot_is_reused() {
    let (_temp, path) = setup_temp_file("fixed.dat");
    let mut blocks = open_fixed(&path, 7);

    let ids: Vec<u64> = (0..4).map(|_| blocks.allocate(0).unwrap()).collect();
    blocks.deallocate(ids[2]).unwrap();
    blocks.deallocate(ids[1]).unwrap();

    assert!(!blocks.is_allocated(1));
    assert_eq!(blocks.allocate(7).unwrap(), ids[1]);
    assert_eq!(blocks.allocate(7).unwrap(), ids[2]);
}

#[test]
fn test_capacity_doubles() {
    let (_temp, path) = setup_temp_file("fixed.dat");
    let mut blocks = open_fixed(&path, 15);

    blocks.allocate(1).unwrap();
    assert_eq!(blocks.slot_count(), 2);
    blocks.allocate(1).unwrap();
    blocks.allocate(1).unwrap();
    assert_eq!(blocks.slot_count(), 4);
    assert_eq!(blocks.capacity(), 4 * 16);
}

#[test]
fn test_oversized_request_is_rejected() {
    let (_temp, path) = setup_temp_file("fixed.dat");
    let mut blocks = open_fixed(&path, 15);

    assert!(matches!(
        blocks.allocate(16),
        Err(AtlasError::InvalidArgument(_))
    ));
}

#[test]
fn test_invalid_ids() {
    let (_temp, path) = setup_temp_file("fixed.dat");
    let mut blocks = open_fixed(&path, 15);
    let id = blocks.allocate(15).unwrap();

    // Misaligned, past the end, and freed ids
    assert!(matches!(blocks.block_size(id + 1), Err(AtlasError::InvalidBlock(_))));
    assert!(matches!(blocks.block_size(4096), Err(AtlasError::InvalidBlock(_))));
    blocks.deallocate(id).unwrap();
    assert!(matches!(blocks.get_u8(id, 0), Err(AtlasError::InvalidBlock(_))));
    assert!(matches!(blocks.deallocate(id), Err(AtlasError::InvalidBlock(_))));
}

#[test]
fn test_block_bounds() {
    let (_temp, path) = setup_temp_file("fixed.dat");
    let mut blocks = open_fixed(&path, 15);
    let id = blocks.allocate(15).unwrap();

    blocks.put_i64(id, 7, -9).unwrap();
    assert_eq!(blocks.get_i64(id, 7).unwrap(), -9);

    assert!(matches!(
        blocks.put_i64(id, 8, 1),
        Err(AtlasError::Overflow { .. })
    ));
    let mut dst = [0u8; 16];
    assert!(matches!(
        blocks.get(id, 0, &mut dst),
        Err(AtlasError::Underflow { .. })
    ));
}

#[test]
fn test_payload_does_not_touch_neighbours() {
    let (_temp, path) = setup_temp_file("fixed.dat");
    let mut blocks = open_fixed(&path, 15);
    let a = blocks.allocate(15).unwrap();
    let b = blocks.allocate(15).unwrap();

    blocks.put(a, 0, &[0xAA; 15]).unwrap();
    blocks.put(b, 0, &[0xBB; 15]).unwrap();

    let mut bytes = [0u8; 15];
    blocks.get(a, 0, &mut bytes).unwrap();
    assert_eq!(bytes, [0xAA; 15]);
    assert!(blocks.block_size(b).is_ok());
}

#[test]
fn test_reopen_rebuilds_free_slots() {
    let (_temp, path) = setup_temp_file("fixed.dat");

    let kept = {
        let mut blocks = open_fixed(&path, 15);
        let ids: Vec<u64> = (0..6).map(|_| blocks.allocate(15).unwrap()).collect();
        blocks.put_i32(ids[4], 0, 444).unwrap();
        blocks.deallocate(ids[1]).unwrap();
        blocks.deallocate(ids[3]).unwrap();
        blocks.barrier(true).unwrap();
        ids
    };

    let mut blocks = open_fixed(&path, 15);
    let mut live: Vec<u64> = blocks.iter_block_ids().map(|id| id.unwrap()).collect();
    live.sort();
    assert_eq!(live, vec![kept[0], kept[2], kept[4], kept[5]]);
    assert_eq!(blocks.get_i32(kept[4], 0).unwrap(), 444);

    assert_eq!(blocks.allocate(1).unwrap(), kept[1]);
    assert_eq!(blocks.allocate(1).unwrap(), kept[3]);
}

#[test]
fn test_capacity_not_multiple_of_stride() {
    let (_temp, path) = setup_temp_file("fixed.dat");
    {
        let mut buffer = DirectBuffer::open(&path, false).unwrap();
        buffer.set_capacity(40).unwrap();
    }

    let result = FixedBlockBuffer::open(DirectBuffer::open(&path, false).unwrap(), 15);
    assert!(matches!(result, Err(AtlasError::Format(_))));
}

#[test]
fn test_bad_status_byte_is_corruption() {
    let (_temp, path) = setup_temp_file("fixed.dat");
    {
        let mut buffer = MappedBuffer::open(&path, false).unwrap();
        buffer.set_capacity(32).unwrap();
        buffer.put_u8(16, 7).unwrap();
    }

    let result = FixedBlockBuffer::open(MappedBuffer::open(&path, false).unwrap(), 15);
    assert!(matches!(result, Err(AtlasError::Corruption(_))));
}
