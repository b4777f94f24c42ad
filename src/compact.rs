//! Compressed integer codec.
//!
//! Every compressed integer on the wire is a one-byte [`CompressType`] tag
//! followed by the value in the narrowest of eight widths that holds it
//! losslessly:
//!
//! - non-negative values use `Byte`, `UInt16`, `UInt32` or `UInt64`
//! - negative values use `SByte`, `Int16`, `Int32` or `Int64`
//!
//! The tag is picked from the value actually written, never from the declared
//! width of the member holding it. Decoding dispatches on the tag found on the
//! wire, so a 64-bit member holding `5` comes back as a [`Value::U8`] that the
//! caller coerces to the declared type.
//!
//! The same scheme prefixes every variable-size payload (string and byte run
//! lengths, sequence lengths, map entry counts, include-all member counts).

use crate::desc::IntKind;
use crate::io::{Reader, Writer};
use crate::value::Value;
use crate::{EncoderError, Result};

/// Width tag written in front of a compressed integer payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompressType {
    Byte = 0,
    SByte = 1,
    Int16 = 2,
    UInt16 = 3,
    Int32 = 4,
    UInt32 = 5,
    Int64 = 6,
    UInt64 = 7,
}

impl CompressType {
    /// Picks the narrowest width class that represents `value` without loss.
    ///
    /// Returns `None` when `value` lies outside the 64-bit range.
    pub fn narrowest(value: i128) -> Option<Self> {
        if value >= 0 {
            if value <= u8::MAX as i128 {
                Some(CompressType::Byte)
            } else if value <= u16::MAX as i128 {
                Some(CompressType::UInt16)
            } else if value <= u32::MAX as i128 {
                Some(CompressType::UInt32)
            } else if value <= u64::MAX as i128 {
                Some(CompressType::UInt64)
            } else {
                None
            }
        } else if value >= i8::MIN as i128 {
            Some(CompressType::SByte)
        } else if value >= i16::MIN as i128 {
            Some(CompressType::Int16)
        } else if value >= i32::MIN as i128 {
            Some(CompressType::Int32)
        } else if value >= i64::MIN as i128 {
            Some(CompressType::Int64)
        } else {
            None
        }
    }

    /// Payload size in bytes following the tag.
    pub fn payload_len(self) -> usize {
        match self {
            CompressType::Byte | CompressType::SByte => 1,
            CompressType::Int16 | CompressType::UInt16 => 2,
            CompressType::Int32 | CompressType::UInt32 => 4,
            CompressType::Int64 | CompressType::UInt64 => 8,
        }
    }
}

impl TryFrom<u8> for CompressType {
    type Error = EncoderError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(CompressType::Byte),
            1 => Ok(CompressType::SByte),
            2 => Ok(CompressType::Int16),
            3 => Ok(CompressType::UInt16),
            4 => Ok(CompressType::Int32),
            5 => Ok(CompressType::UInt32),
            6 => Ok(CompressType::Int64),
            7 => Ok(CompressType::UInt64),
            other => Err(EncoderError::UnsupportedTag(other)),
        }
    }
}

/// Writes `tag` and the payload. `value` must already fit `tag`.
fn write_payload(writer: &mut Writer, tag: CompressType, value: i128) {
    writer.write_compress_type(tag);
    match tag {
        CompressType::Byte => writer.write_u8(value as u8),
        CompressType::SByte => writer.write_i8(value as i8),
        CompressType::Int16 => writer.write_i16(value as i16),
        CompressType::UInt16 => writer.write_u16(value as u16),
        CompressType::Int32 => writer.write_i32(value as i32),
        CompressType::UInt32 => writer.write_u32(value as u32),
        CompressType::Int64 => writer.write_i64(value as i64),
        CompressType::UInt64 => writer.write_u64(value as u64),
    }
}

/// Writes a length or count prefix.
pub fn write_length(writer: &mut Writer, len: usize) {
    let len = len as u64 as i128;
    // usize never exceeds u64, so UInt64 always fits.
    let tag = CompressType::narrowest(len).unwrap_or(CompressType::UInt64);
    write_payload(writer, tag, len);
}

/// Reads a length or count prefix written by [`write_length`].
///
/// # Errors
/// Fails on an unknown tag, a negative value, or a value that does not fit `usize`.
pub fn read_length(reader: &mut Reader) -> Result<usize> {
    let value = read_integer(reader)?;
    let raw = value.as_integer().unwrap_or_default();
    usize::try_from(raw)
        .map_err(|_| EncoderError::Decode(format!("Invalid length prefix: {}", raw)))
}

/// Writes `value` as a compressed integer of the declared width.
///
/// # Errors
/// Returns an encode error if `value` is outside the range of `declared`.
pub fn write_integer(writer: &mut Writer, value: i128, declared: IntKind) -> Result<()> {
    if !declared.contains(value) {
        return Err(EncoderError::Encode(format!(
            "Value {} does not fit declared width {}",
            value, declared
        )));
    }
    let tag = CompressType::narrowest(value).ok_or_else(|| {
        EncoderError::Encode(format!("Value {} exceeds 64-bit range", value))
    })?;
    write_payload(writer, tag, value);
    Ok(())
}

/// Reads a tag and the compressed integer it describes.
///
/// The returned [`Value`] has the width named by the tag.
pub fn read_integer(reader: &mut Reader) -> Result<Value> {
    let tag = reader.read_compress_type()?;
    read_integer_with(tag, reader)
}

/// Reads the payload of a compressed integer whose tag was already consumed.
pub fn read_integer_with(tag: CompressType, reader: &mut Reader) -> Result<Value> {
    Ok(match tag {
        CompressType::Byte => Value::U8(reader.read_u8()?),
        CompressType::SByte => Value::I8(reader.read_i8()?),
        CompressType::Int16 => Value::I16(reader.read_i16()?),
        CompressType::UInt16 => Value::U16(reader.read_u16()?),
        CompressType::Int32 => Value::I32(reader.read_i32()?),
        CompressType::UInt32 => Value::U32(reader.read_u32()?),
        CompressType::Int64 => Value::I64(reader.read_i64()?),
        CompressType::UInt64 => Value::U64(reader.read_u64()?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_of(value: i128, declared: IntKind) -> (CompressType, Vec<u8>) {
        let mut writer = Writer::new();
        write_integer(&mut writer, value, declared).unwrap();
        let bytes = writer.into_bytes().to_vec();
        (CompressType::try_from(bytes[0]).unwrap(), bytes)
    }

    #[test]
    fn picks_narrowest_width() {
        assert_eq!(tag_of(0, IntKind::I64).0, CompressType::Byte);
        assert_eq!(tag_of(255, IntKind::I32).0, CompressType::Byte);
        assert_eq!(tag_of(256, IntKind::I32).0, CompressType::UInt16);
        assert_eq!(tag_of(65_536, IntKind::U64).0, CompressType::UInt32);
        assert_eq!(tag_of(300_000_000, IntKind::I32).0, CompressType::UInt32);
        assert_eq!(tag_of(u32::MAX as i128 + 1, IntKind::I64).0, CompressType::UInt64);
        assert_eq!(tag_of(-1, IntKind::I32).0, CompressType::SByte);
        assert_eq!(tag_of(-129, IntKind::I32).0, CompressType::Int16);
        assert_eq!(tag_of(-40_000, IntKind::I64).0, CompressType::Int32);
        assert_eq!(tag_of(i64::MIN as i128, IntKind::I64).0, CompressType::Int64);
    }

    #[test]
    fn payload_has_tag_width() {
        for value in [0i128, 200, 1_000, 70_000, -5, -1_000, -70_000, 1 << 40, -(1 << 40)] {
            let (tag, bytes) = tag_of(value, IntKind::I64);
            assert_eq!(bytes.len(), 1 + tag.payload_len(), "value {}", value);
        }
    }

    #[test]
    fn reads_back_exact_values() {
        let values = [
            0i128,
            1,
            127,
            128,
            255,
            256,
            65_535,
            65_536,
            u32::MAX as i128,
            u64::MAX as i128,
            -1,
            -128,
            -129,
            i16::MIN as i128,
            i32::MIN as i128,
            i64::MIN as i128,
        ];
        let mut writer = Writer::new();
        for value in values {
            let declared = if value > i64::MAX as i128 { IntKind::U64 } else { IntKind::I64 };
            write_integer(&mut writer, value, declared).unwrap();
        }
        let mut reader = Reader::new(writer.into_bytes());
        for value in values {
            assert_eq!(read_integer(&mut reader).unwrap().as_integer(), Some(value));
        }
        assert!(reader.is_end());
    }

    #[test]
    fn rejects_value_outside_declared_width() {
        let mut writer = Writer::new();
        assert!(matches!(
            write_integer(&mut writer, -1, IntKind::U32),
            Err(EncoderError::Encode(_))
        ));
        assert!(writer.is_empty());
    }

    #[test]
    fn rejects_unknown_tag() {
        let mut reader = Reader::new(bytes::Bytes::from_static(&[9, 0]));
        assert!(matches!(
            read_integer(&mut reader),
            Err(EncoderError::UnsupportedTag(9))
        ));
    }

    #[test]
    fn length_accepts_any_non_negative_tag() {
        // Int16 tag carrying 300
        let mut reader = Reader::new(bytes::Bytes::from_static(&[2, 0x2C, 0x01]));
        assert_eq!(read_length(&mut reader).unwrap(), 300);

        // SByte tag carrying -1
        let mut reader = Reader::new(bytes::Bytes::from_static(&[1, 0xFF]));
        assert!(matches!(read_length(&mut reader), Err(EncoderError::Decode(_))));
    }

    #[test]
    fn length_round_trip() {
        let mut writer = Writer::new();
        for len in [0usize, 3, 300, 70_000] {
            write_length(&mut writer, len);
        }
        let mut reader = Reader::new(writer.into_bytes());
        for len in [0usize, 3, 300, 70_000] {
            assert_eq!(read_length(&mut reader).unwrap(), len);
        }
    }
}
