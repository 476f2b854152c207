//! Length-prefixed sequence serializers

use std::io::{Read, Write};

use crate::error::{AtlasError, Result};

use super::{read_exact_vec, read_len, write_len, Persist, Serializer};

/// Raw bytes: `[Len: u32][bytes]`
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesSerializer;

impl Serializer<Vec<u8>> for BytesSerializer {
    fn fixed_size(&self) -> Option<u64> {
        None
    }

    fn serialized_size(&self, value: &Vec<u8>) -> Result<u64> {
        Ok(4 + value.len() as u64)
    }

    fn serialize(&self, value: &Vec<u8>, sink: &mut dyn Write) -> Result<()> {
        write_len(sink, value.len() as u64)?;
        sink.write_all(value)?;
        Ok(())
    }

    fn deserialize(&self, source: &mut dyn Read) -> Result<Vec<u8>> {
        let len = read_len(source)?;
        read_exact_vec(source, len)
    }
}

impl Persist for Vec<u8> {
    type Serializer = BytesSerializer;
}

/// Character sequence: `[Units: u32][u16 per UTF-16 code unit]`
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerializer;

impl Serializer<String> for StringSerializer {
    fn fixed_size(&self) -> Option<u64> {
        None
    }

    fn serialized_size(&self, value: &String) -> Result<u64> {
        Ok(4 + 2 * value.encode_utf16().count() as u64)
    }

    fn serialize(&self, value: &String, sink: &mut dyn Write) -> Result<()> {
        let units: Vec<u8> = value.encode_utf16().flat_map(u16::to_be_bytes).collect();
        write_len(sink, units.len() as u64 / 2)?;
        sink.write_all(&units)?;
        Ok(())
    }

    fn deserialize(&self, source: &mut dyn Read) -> Result<String> {
        let units = read_len(source)?;
        let bytes = read_exact_vec(source, units * 2)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();

        String::from_utf16(&units)
            .map_err(|e| AtlasError::Serialization(format!("invalid UTF-16 string: {}", e)))
    }
}

impl Persist for String {
    type Serializer = StringSerializer;
}
