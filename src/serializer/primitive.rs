//! Fixed-size primitive serializers

use std::io::{Read, Write};

use crate::error::Result;

use super::{Persist, Serializer};

/// Declare a fixed-size big-endian serializer for a numeric type
macro_rules! fixed_serializer {
    ($(#[$meta:meta])* $name:ident, $ty:ty, $size:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl Serializer<$ty> for $name {
            fn fixed_size(&self) -> Option<u64> {
                Some($size as u64)
            }

            fn serialized_size(&self, _value: &$ty) -> Result<u64> {
                Ok($size as u64)
            }

            fn serialize(&self, value: &$ty, sink: &mut dyn Write) -> Result<()> {
                sink.write_all(&value.to_be_bytes())?;
                Ok(())
            }

            fn deserialize(&self, source: &mut dyn Read) -> Result<$ty> {
                let mut bytes = [0u8; $size];
                source.read_exact(&mut bytes)?;
                Ok(<$ty>::from_be_bytes(bytes))
            }
        }

        impl Persist for $ty {
            type Serializer = $name;
        }
    };
}

fixed_serializer!(
    /// 1-byte signed integer
    I8Serializer, i8, 1
);
fixed_serializer!(
    /// 1-byte unsigned integer
    U8Serializer, u8, 1
);
fixed_serializer!(
    /// 2-byte short
    I16Serializer, i16, 2
);
fixed_serializer!(
    /// 2-byte unsigned short (also a UTF-16 code unit)
    U16Serializer, u16, 2
);
fixed_serializer!(I32Serializer, i32, 4);
fixed_serializer!(U32Serializer, u32, 4);
fixed_serializer!(I64Serializer, i64, 8);
fixed_serializer!(U64Serializer, u64, 8);
fixed_serializer!(
    /// Raw IEEE-754 bits of an `f32`
    F32Serializer, f32, 4
);
fixed_serializer!(
    /// Raw IEEE-754 bits of an `f64`
    F64Serializer, f64, 8
);

/// 1-byte boolean: 0 is false, anything else reads back as true
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolSerializer;

impl Serializer<bool> for BoolSerializer {
    fn fixed_size(&self) -> Option<u64> {
        Some(1)
    }

    fn serialized_size(&self, _value: &bool) -> Result<u64> {
        Ok(1)
    }

    fn serialize(&self, value: &bool, sink: &mut dyn Write) -> Result<()> {
        sink.write_all(&[*value as u8])?;
        Ok(())
    }

    fn deserialize(&self, source: &mut dyn Read) -> Result<bool> {
        let mut byte = [0u8; 1];
        source.read_exact(&mut byte)?;
        Ok(byte[0] != 0)
    }
}

impl Persist for bool {
    type Serializer = BoolSerializer;
}
