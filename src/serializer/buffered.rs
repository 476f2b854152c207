//! Generic buffered serializer
//!
//! Encodes any serde type with bincode into a scratch buffer, then writes it
//! length-delimited. The encoding of the last value is cached, so the usual
//! `serialized_size(v)` followed by `serialize(v)` encodes only once.

use std::cell::RefCell;
use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

use super::{read_exact_vec, read_len, write_len, Serializer};

/// Length-delimited bincode serializer with a last-value cache
///
/// The cache is keyed by equality: a value equal to the previous one reuses
/// the previous encoding. Not `Sync`; each list owns its serializer.
pub struct BufferedSerializer<T> {
    /// Reused encoding buffer
    scratch: RefCell<BytesMut>,
    /// Last encoded value and its bytes
    cache: RefCell<Option<(T, Bytes)>>,
}

impl<T> BufferedSerializer<T> {
    pub fn new() -> Self {
        Self {
            scratch: RefCell::new(BytesMut::with_capacity(256)),
            cache: RefCell::new(None),
        }
    }

    /// Drop the cached encoding
    pub fn clear_cache(&self) {
        self.cache.borrow_mut().take();
    }
}

impl<T> Default for BufferedSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BufferedSerializer<T>
where
    T: Serialize + PartialEq + Clone,
{
    /// Whether `value` would be served from the cache
    pub fn is_cached(&self, value: &T) -> bool {
        matches!(&*self.cache.borrow(), Some((cached, _)) if cached == value)
    }

    /// Encoding of `value`, from the cache when possible
    fn encoded(&self, value: &T) -> Result<Bytes> {
        if let Some((cached, bytes)) = &*self.cache.borrow() {
            if cached == value {
                return Ok(bytes.clone());
            }
        }

        let mut scratch = self.scratch.borrow_mut();
        scratch.clear();
        bincode::serialize_into((&mut *scratch).writer(), value)?;
        let bytes = scratch.split().freeze();

        *self.cache.borrow_mut() = Some((value.clone(), bytes.clone()));
        Ok(bytes)
    }
}

impl<T> Serializer<T> for BufferedSerializer<T>
where
    T: Serialize + DeserializeOwned + PartialEq + Clone,
{
    fn fixed_size(&self) -> Option<u64> {
        None
    }

    fn serialized_size(&self, value: &T) -> Result<u64> {
        Ok(4 + self.encoded(value)?.len() as u64)
    }

    fn serialize(&self, value: &T, sink: &mut dyn Write) -> Result<()> {
        let bytes = self.encoded(value)?;
        write_len(sink, bytes.len() as u64)?;
        sink.write_all(&bytes)?;
        Ok(())
    }

    fn deserialize(&self, source: &mut dyn Read) -> Result<T> {
        let len = read_len(source)?;
        let bytes = read_exact_vec(source, len)?;
        Ok(bincode::deserialize(&bytes)?)
    }
}
