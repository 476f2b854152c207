//! Serializer Module
//!
//! Pluggable binary codecs for values stored in blocks.
//!
//! ## Built-in Wire Formats (big-endian)
//! ```text
//! ┌───────────────────────┬────────────────────────────────────────┐
//! │ bool                  │ 1 byte (0 / 1)                         │
//! │ i8, u8                │ 1 byte                                 │
//! │ i16, u16              │ 2 bytes                                │
//! │ i32, u32, f32         │ 4 bytes (floats as raw IEEE-754 bits)  │
//! │ i64, u64, f64         │ 8 bytes (floats as raw IEEE-754 bits)  │
//! │ Vec<u8>               │ Len: u32 (4) + raw bytes               │
//! │ String                │ Units: u32 (4) + 2 bytes per UTF-16    │
//! │ any serde type        │ Len: u32 (4) + bincode encoding        │
//! └───────────────────────┴────────────────────────────────────────┘
//! ```
//!
//! A fixed-size serializer reports the same `serialized_size` for every value,
//! which lets the block layer choose a fixed-stride allocator.

mod buffered;
mod primitive;
mod sequence;

use std::io::{Read, Write};

use crate::error::Result;

pub use buffered::BufferedSerializer;
pub use primitive::{
    BoolSerializer, F32Serializer, F64Serializer, I16Serializer, I32Serializer, I64Serializer,
    I8Serializer, U16Serializer, U32Serializer, U64Serializer, U8Serializer,
};
pub use sequence::{BytesSerializer, StringSerializer};

/// Binary codec for values of type `T`
pub trait Serializer<T> {
    /// `Some(n)` if every value encodes to exactly `n` bytes
    fn fixed_size(&self) -> Option<u64>;

    fn is_fixed_size(&self) -> bool {
        self.fixed_size().is_some()
    }

    /// Exact number of bytes `serialize` will write for `value`
    fn serialized_size(&self, value: &T) -> Result<u64>;

    fn serialize(&self, value: &T, sink: &mut dyn Write) -> Result<()>;

    fn deserialize(&self, source: &mut dyn Read) -> Result<T>;
}

/// Types with a built-in default serializer
pub trait Persist: Sized {
    type Serializer: Serializer<Self> + Default;
}

/// Default serializer for `T`
pub fn default_serializer<T: Persist>() -> T::Serializer {
    T::Serializer::default()
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Read a 4-byte big-endian length prefix
pub(crate) fn read_len(source: &mut dyn Read) -> Result<u64> {
    let mut bytes = [0u8; 4];
    source.read_exact(&mut bytes)?;
    Ok(u32::from_be_bytes(bytes) as u64)
}

/// Write a 4-byte big-endian length prefix, rejecting lengths that do not fit
pub(crate) fn write_len(sink: &mut dyn Write, len: u64) -> Result<()> {
    let len = u32::try_from(len).map_err(|_| {
        crate::AtlasError::Serialization(format!("length {} does not fit in 4 bytes", len))
    })?;
    sink.write_all(&len.to_be_bytes())?;
    Ok(())
}

/// Read exactly `len` bytes without trusting `len` for the allocation size
pub(crate) fn read_exact_vec(source: &mut dyn Read, len: u64) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    source.take(len).read_to_end(&mut bytes)?;
    if bytes.len() as u64 != len {
        return Err(crate::AtlasError::Serialization(format!(
            "expected {} bytes, found {}",
            len,
            bytes.len()
        )));
    }
    Ok(bytes)
}
