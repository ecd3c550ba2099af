// packages/engine/src/schema/wire.rs
//! Protobuf wire-format reader
//!
//! Thin layer over `prost::encoding` that yields one `(field number, value)`
//! pair at a time and rejects anything malformed instead of guessing.

use prost::encoding::{decode_key, decode_varint, WireType};
use thiserror::Error;

/// Why a buffer could not be read as protobuf wire format
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("malformed wire data: {0}")]
    Malformed(String),

    #[error("truncated {0} value")]
    Truncated(&'static str),

    #[error("group wire types are not supported")]
    Group,
}

/// A raw field value as it appears on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireValue<'a> {
    Varint(u64),
    Fixed64(u64),
    Fixed32(u32),
    LengthDelimited(&'a [u8]),
}

impl WireValue<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            WireValue::Varint(_) => "varint",
            WireValue::Fixed64(_) => "64-bit",
            WireValue::Fixed32(_) => "32-bit",
            WireValue::LengthDelimited(_) => "length-delimited",
        }
    }
}

/// Read the next field from `buf`, advancing it past the field
pub fn next_field<'a>(buf: &mut &'a [u8]) -> Result<(u32, WireValue<'a>), WireError> {
    let (number, wire_type) = decode_key(buf).map_err(|e| WireError::Malformed(e.to_string()))?;

    let value = match wire_type {
        WireType::Varint => WireValue::Varint(read_varint(buf)?),
        WireType::SixtyFourBit => {
            let raw = take(buf, 8, "64-bit")?;
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(raw);
            WireValue::Fixed64(u64::from_le_bytes(bytes))
        }
        WireType::ThirtyTwoBit => {
            let raw = take(buf, 4, "32-bit")?;
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(raw);
            WireValue::Fixed32(u32::from_le_bytes(bytes))
        }
        WireType::LengthDelimited => {
            let len = read_varint(buf)?;
            let len = usize::try_from(len).map_err(|_| WireError::Truncated("length-delimited"))?;
            WireValue::LengthDelimited(take(buf, len, "length-delimited")?)
        }
        WireType::StartGroup | WireType::EndGroup => return Err(WireError::Group),
    };

    Ok((number, value))
}

pub fn read_varint(buf: &mut &[u8]) -> Result<u64, WireError> {
    decode_varint(buf).map_err(|e| WireError::Malformed(e.to_string()))
}

fn take<'a>(buf: &mut &'a [u8], len: usize, kind: &'static str) -> Result<&'a [u8], WireError> {
    let slice: &'a [u8] = *buf;
    if slice.len() < len {
        return Err(WireError::Truncated(kind));
    }
    let (head, rest) = slice.split_at(len);
    *buf = rest;
    Ok(head)
}

/// Zig-zag decoding for `sint32`/`sint64`
pub fn zigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_each_wire_type() {
        // 1: varint 150, 2: "hi", 3: fixed32 1, 4: fixed64 2
        let data = [
            0x08, 0x96, 0x01, 0x12, 0x02, b'h', b'i', 0x1d, 1, 0, 0, 0, 0x21, 2, 0, 0, 0, 0, 0, 0, 0,
        ];
        let mut buf = &data[..];

        assert_eq!(next_field(&mut buf).unwrap(), (1, WireValue::Varint(150)));
        assert_eq!(next_field(&mut buf).unwrap(), (2, WireValue::LengthDelimited(b"hi")));
        assert_eq!(next_field(&mut buf).unwrap(), (3, WireValue::Fixed32(1)));
        assert_eq!(next_field(&mut buf).unwrap(), (4, WireValue::Fixed64(2)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_rejects_malformed_input() {
        // Field number 0
        assert!(next_field(&mut &[0x00, 0x01][..]).is_err());
        // Truncated varint
        assert!(next_field(&mut &[0x08, 0x96][..]).is_err());
        // Length past the end of the buffer
        assert_eq!(
            next_field(&mut &[0x12, 0x05, b'a'][..]),
            Err(WireError::Truncated("length-delimited"))
        );
        // Start group
        assert_eq!(next_field(&mut &[0x0b][..]), Err(WireError::Group));
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag(0), 0);
        assert_eq!(zigzag(1), -1);
        assert_eq!(zigzag(2), 1);
        assert_eq!(zigzag(3), -2);
        assert_eq!(zigzag(u64::MAX), i64::MIN);
    }
}
