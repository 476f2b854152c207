//! Tests for byte and string serializers

use atlasblock::serializer::{BytesSerializer, StringSerializer};
use atlasblock::{AtlasError, Serializer};

use super::*;

#[test]
fn test_bytes_round_trip() {
    assert_round_trip(
        &BytesSerializer,
        &[Vec::new(), vec![0u8], vec![1, 2, 3], vec![0xFF; 1000]],
    );
    assert!(!BytesSerializer.is_fixed_size());
}

#[test]
fn test_bytes_layout() {
    assert_eq!(
        encode(&BytesSerializer, &vec![9u8, 8, 7]),
        vec![0, 0, 0, 3, 9, 8, 7]
    );
}

#[test]
fn test_string_round_trip() {
    let values: Vec<String> = ["", "a", "hello world", "héllo", "日本語", "emoji 😀 pair"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_round_trip(&StringSerializer, &values);
}

#[test]
fn test_string_counts_utf16_units() {
    // "é" is one UTF-16 unit (two UTF-8 bytes)
    assert_eq!(
        encode(&StringSerializer, &"é".to_string()),
        vec![0, 0, 0, 1, 0x00, 0xE9]
    );

    // A non-BMP character is a surrogate pair
    let emoji = "😀".to_string();
    assert_eq!(StringSerializer.serialized_size(&emoji).unwrap(), 4 + 4);
    assert_eq!(&encode(&StringSerializer, &emoji)[..4], &[0, 0, 0, 2]);
}

#[test]
fn test_unpaired_surrogate_is_rejected() {
    let bytes = [0, 0, 0, 1, 0xD8, 0x3D];
    let result = StringSerializer.deserialize(&mut std::io::Cursor::new(&bytes[..]));
    assert!(matches!(result, Err(AtlasError::Serialization(_))));
}

#[test]
fn test_short_payload_is_rejected() {
    // Announces 10 bytes, holds 2
    let bytes = [0, 0, 0, 10, 1, 2];
    let result = BytesSerializer.deserialize(&mut std::io::Cursor::new(&bytes[..]));
    assert!(matches!(result, Err(AtlasError::Serialization(_))));
}
