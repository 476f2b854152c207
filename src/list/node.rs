//! On-disk node and metadata layout
//!
//! ## Metadata Block
//! ```text
//! ┌──────────┬─────────────┬───────────┬───────────┐
//! │ "PLL\n"  │ Version (4) │ Head (8)  │ Tail (8)  │
//! └──────────┴─────────────┴───────────┴───────────┘
//! ```
//!
//! ## Node Block
//! ```text
//! ┌──────────┬──────────┬────────────────┬─────────────────────┐
//! │ Next (8) │ Prev (8) │ DataSize (8)   │ Payload (DataSize)  │
//! └──────────┴──────────┴────────────────┴─────────────────────┘
//!  DataSize = -1 for a null element (no payload)
//! ```
//!
//! Pointers are big-endian `i64`: a block id, `END_PTR` past either end of the
//! chain, or `NULL_PTR` in a node that has been unlinked.

use crate::block::{BlockBuffer, BlockId};
use crate::error::{AtlasError, Result};

/// Pointer stored in an unlinked node
pub const NULL_PTR: i64 = -1;

/// Pointer past the head or tail of the chain
pub const END_PTR: i64 = -2;

pub(crate) const MAGIC: [u8; 4] = *b"PLL\n";
pub(crate) const FORMAT_VERSION: i32 = 3;

pub(crate) const META_SIZE: u64 = 24;
const META_MAGIC: u64 = 0;
const META_VERSION: u64 = 4;
const META_HEAD: u64 = 8;
const META_TAIL: u64 = 16;

/// Bytes in front of every node's payload
pub const NODE_HEADER_SIZE: u64 = 24;
const NODE_NEXT: u64 = 0;
const NODE_PREV: u64 = 8;
const NODE_DATA_SIZE: u64 = 16;

/// `data_size` of a node holding a null element
const NULL_DATA_SIZE: i64 = -1;

/// Decoded node header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeHeader {
    pub next: Option<BlockId>,
    pub prev: Option<BlockId>,
    /// `None` for a null element
    pub data_size: Option<u64>,
}

// =============================================================================
// Pointer Encoding
// =============================================================================

pub(crate) fn encode_ptr(id: Option<BlockId>) -> i64 {
    match id {
        Some(id) => {
            debug_assert!(id <= i64::MAX as u64);
            id as i64
        }
        None => END_PTR,
    }
}

/// Decode a pointer read from a live node or the metadata block
pub(crate) fn decode_ptr(raw: i64, owner: BlockId) -> Result<Option<BlockId>> {
    match raw {
        END_PTR => Ok(None),
        ptr if ptr >= 0 => Ok(Some(ptr as u64)),
        NULL_PTR => Err(AtlasError::Corruption(format!(
            "block {} links to an unlinked node",
            owner
        ))),
        other => Err(AtlasError::Corruption(format!(
            "block {} holds invalid pointer {}",
            owner, other
        ))),
    }
}

// =============================================================================
// Node Access
// =============================================================================

pub(crate) fn read_node<K: BlockBuffer + ?Sized>(blocks: &K, id: BlockId) -> Result<NodeHeader> {
    let mut raw = [0u8; NODE_HEADER_SIZE as usize];
    blocks.get(id, 0, &mut raw)?;

    let field = |offset: u64| {
        let start = offset as usize;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&raw[start..start + 8]);
        i64::from_be_bytes(bytes)
    };

    let data_size = match field(NODE_DATA_SIZE) {
        NULL_DATA_SIZE => None,
        size if size >= 0 => Some(size as u64),
        size => {
            return Err(AtlasError::Corruption(format!(
                "node {} has invalid data size {}",
                id, size
            )))
        }
    };

    Ok(NodeHeader {
        next: decode_ptr(field(NODE_NEXT), id)?,
        prev: decode_ptr(field(NODE_PREV), id)?,
        data_size,
    })
}

/// Write a complete node header in one put
pub(crate) fn write_node<K: BlockBuffer + ?Sized>(
    blocks: &mut K,
    id: BlockId,
    header: &NodeHeader,
) -> Result<()> {
    let data_size = match header.data_size {
        Some(size) => size as i64,
        None => NULL_DATA_SIZE,
    };

    let mut raw = [0u8; NODE_HEADER_SIZE as usize];
    raw[0..8].copy_from_slice(&encode_ptr(header.next).to_be_bytes());
    raw[8..16].copy_from_slice(&encode_ptr(header.prev).to_be_bytes());
    raw[16..24].copy_from_slice(&data_size.to_be_bytes());
    blocks.put(id, 0, &raw)
}

pub(crate) fn write_next<K: BlockBuffer + ?Sized>(
    blocks: &mut K,
    id: BlockId,
    next: Option<BlockId>,
) -> Result<()> {
    blocks.put_i64(id, NODE_NEXT, encode_ptr(next))
}

pub(crate) fn write_prev<K: BlockBuffer + ?Sized>(
    blocks: &mut K,
    id: BlockId,
    prev: Option<BlockId>,
) -> Result<()> {
    blocks.put_i64(id, NODE_PREV, encode_ptr(prev))
}

/// Mark a node as unlinked before it is freed
pub(crate) fn clear_links<K: BlockBuffer + ?Sized>(blocks: &mut K, id: BlockId) -> Result<()> {
    let mut raw = [0u8; 16];
    raw[0..8].copy_from_slice(&NULL_PTR.to_be_bytes());
    raw[8..16].copy_from_slice(&NULL_PTR.to_be_bytes());
    blocks.put(id, NODE_NEXT, &raw)
}

// =============================================================================
// Metadata Access
// =============================================================================

/// Write magic, version and an empty chain
pub(crate) fn init_meta<K: BlockBuffer + ?Sized>(blocks: &mut K, id: BlockId) -> Result<()> {
    let mut raw = [0u8; META_SIZE as usize];
    raw[0..4].copy_from_slice(&MAGIC);
    raw[4..8].copy_from_slice(&FORMAT_VERSION.to_be_bytes());
    raw[8..16].copy_from_slice(&END_PTR.to_be_bytes());
    raw[16..24].copy_from_slice(&END_PTR.to_be_bytes());
    blocks.put(id, META_MAGIC, &raw)
}

/// Validate magic and version, returning (head, tail)
pub(crate) fn read_meta<K: BlockBuffer + ?Sized>(
    blocks: &K,
    id: BlockId,
) -> Result<(Option<BlockId>, Option<BlockId>)> {
    if blocks.block_size(id)? < META_SIZE {
        return Err(AtlasError::Format(format!(
            "metadata block {} is smaller than {} bytes",
            id, META_SIZE
        )));
    }

    let mut magic = [0u8; 4];
    blocks.get(id, META_MAGIC, &mut magic)?;
    if magic != MAGIC {
        return Err(AtlasError::Format(format!("bad list magic {:02x?}", magic)));
    }

    let version = blocks.get_i32(id, META_VERSION)?;
    if version != FORMAT_VERSION {
        return Err(AtlasError::Format(format!(
            "unsupported list version {} (expected {})",
            version, FORMAT_VERSION
        )));
    }

    let head = decode_ptr(blocks.get_i64(id, META_HEAD)?, id)?;
    let tail = decode_ptr(blocks.get_i64(id, META_TAIL)?, id)?;
    Ok((head, tail))
}

pub(crate) fn write_head<K: BlockBuffer + ?Sized>(
    blocks: &mut K,
    id: BlockId,
    head: Option<BlockId>,
) -> Result<()> {
    blocks.put_i64(id, META_HEAD, encode_ptr(head))
}

pub(crate) fn write_tail<K: BlockBuffer + ?Sized>(
    blocks: &mut K,
    id: BlockId,
    tail: Option<BlockId>,
) -> Result<()> {
    blocks.put_i64(id, META_TAIL, encode_ptr(tail))
}
