//! Tests for the built-in serializers
//!
//! These tests verify:
//! - Round trips for every primitive codec
//! - Constant sizes for fixed-size codecs
//! - Length-prefixed byte and UTF-16 string layouts
//! - The bincode-backed buffered serializer and its cache

mod sequence_tests;

use std::fmt::Debug;
use std::io::Cursor;

use atlasblock::Serializer;

// =============================================================================
// Helper Functions
// =============================================================================

/// Serialize into a Vec, checking the announced size
pub fn encode<T, S: Serializer<T>>(serializer: &S, value: &T) -> Vec<u8> {
    let mut bytes = Vec::new();
    serializer.serialize(value, &mut bytes).unwrap();
    assert_eq!(
        bytes.len() as u64,
        serializer.serialized_size(value).unwrap(),
        "serialized_size must match the bytes written"
    );
    bytes
}

pub fn decode<T, S: Serializer<T>>(serializer: &S, bytes: &[u8]) -> T {
    serializer.deserialize(&mut Cursor::new(bytes)).unwrap()
}

pub fn assert_round_trip<T, S>(serializer: &S, values: &[T])
where
    T: PartialEq + Debug,
    S: Serializer<T>,
{
    for value in values {
        let bytes = encode(serializer, value);
        assert_eq!(&decode(serializer, &bytes), value);
    }
}
