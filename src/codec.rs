//! Recursive value codec.
//!
//! [`encode_value`] and [`decode_value`] walk a value by its declared
//! [`TypeDesc`], trying each category in a fixed order:
//!
//! 1. primitives: `u8`, `i8`, `i16`, `u16` as raw fixed-width values; `i32`,
//!    `u32`, `i64`, `u64` as compressed integers; everything else through the
//!    primitive reader/writer
//! 2. enums, as their underlying integer
//! 3. arrays and 4. lists: a length prefix then each element; byte sequences
//!    move in one bulk copy with the same wire layout
//! 5. maps: an entry count then key and value per entry
//! 6. objects: a registered custom converter for the exact type, otherwise
//!    the nested object encoder/decoder sharing the active reader/writer
//!
//! Decoded elements, keys and values are coerced to their declared types.

use crate::compact;
use crate::desc::{ObjectDesc, TypeDesc};
use crate::io::{Reader, Writer};
use crate::registry;
use crate::value::Value;
use crate::{EncoderError, Result, SchemaError};

fn mismatch(value: &Value, desc: &TypeDesc) -> EncoderError {
    EncoderError::Coercion {
        from: value.kind_name().to_string(),
        to: desc.to_string(),
    }
}

/// Copies a scalar `value` converted to the declared scalar type.
fn scalar(value: &Value, desc: &TypeDesc) -> Result<Value> {
    let copy = match *value {
        Value::Bool(v) => Value::Bool(v),
        Value::U8(v) => Value::U8(v),
        Value::I8(v) => Value::I8(v),
        Value::I16(v) => Value::I16(v),
        Value::U16(v) => Value::U16(v),
        Value::I32(v) => Value::I32(v),
        Value::U32(v) => Value::U32(v),
        Value::I64(v) => Value::I64(v),
        Value::U64(v) => Value::U64(v),
        Value::F32(v) => Value::F32(v),
        Value::F64(v) => Value::F64(v),
        Value::Decimal(v) => Value::Decimal(v),
        Value::Char(v) => Value::Char(v),
        _ => return Err(mismatch(value, desc)),
    };
    copy.coerce_to(desc)
}

/// Encodes `value` as declared by `desc`.
///
/// # Errors
/// Fails if `value` does not fit `desc`, or on a missing converter/schema for
/// a nested type.
pub fn encode_value(writer: &mut Writer, value: &Value, desc: &TypeDesc) -> Result<()> {
    match desc {
        TypeDesc::U8 | TypeDesc::I8 | TypeDesc::I16 | TypeDesc::U16 => {
            match scalar(value, desc)? {
                Value::U8(v) => writer.write_u8(v),
                Value::I8(v) => writer.write_i8(v),
                Value::I16(v) => writer.write_i16(v),
                Value::U16(v) => writer.write_u16(v),
                other => return Err(mismatch(&other, desc)),
            }
        }
        TypeDesc::I32 | TypeDesc::U32 | TypeDesc::I64 | TypeDesc::U64 => {
            let raw = value.as_integer().ok_or_else(|| mismatch(value, desc))?;
            let kind = desc.int_kind().ok_or_else(|| mismatch(value, desc))?;
            compact::write_integer(writer, raw, kind)?;
        }
        TypeDesc::Bool
        | TypeDesc::F32
        | TypeDesc::F64
        | TypeDesc::Decimal
        | TypeDesc::Char => match scalar(value, desc)? {
            Value::Bool(v) => writer.write_bool(v),
            Value::F32(v) => writer.write_f32(v),
            Value::F64(v) => writer.write_f64(v),
            Value::Decimal(v) => writer.write_decimal(&v),
            Value::Char(v) => writer.write_char(v),
            other => return Err(mismatch(&other, desc)),
        },
        TypeDesc::String => match value {
            Value::String(v) => writer.write_str(v),
            other => return Err(mismatch(other, desc)),
        },
        TypeDesc::Enum(e) => encode_value(writer, value, &e.repr().desc())?,
        TypeDesc::Array(elem) | TypeDesc::List(elem) => encode_sequence(writer, value, elem)?,
        TypeDesc::Map(key_desc, value_desc) => match value {
            Value::Map(entries) => {
                compact::write_length(writer, entries.len());
                for (key, entry) in entries {
                    encode_value(writer, key, key_desc)?;
                    encode_value(writer, entry, value_desc)?;
                }
            }
            other => return Err(mismatch(other, desc)),
        },
        TypeDesc::Object(object) => encode_object_value(writer, value, object)?,
    }
    Ok(())
}

fn encode_sequence(writer: &mut Writer, value: &Value, elem: &TypeDesc) -> Result<()> {
    match value {
        Value::Bytes(bytes) if *elem == TypeDesc::U8 => writer.write_bytes(bytes),
        Value::Bytes(bytes) => {
            compact::write_length(writer, bytes.len());
            for byte in bytes.iter() {
                encode_value(writer, &Value::U8(*byte), elem)?;
            }
        }
        Value::Seq(items) if *elem == TypeDesc::U8 => {
            let raw = items
                .iter()
                .map(|item| match scalar(item, elem)? {
                    Value::U8(byte) => Ok(byte),
                    other => Err(mismatch(&other, elem)),
                })
                .collect::<Result<Vec<u8>>>()?;
            writer.write_bytes(&raw);
        }
        Value::Seq(items) => {
            compact::write_length(writer, items.len());
            for item in items {
                encode_value(writer, item, elem)?;
            }
        }
        other => return Err(mismatch(other, &TypeDesc::list(elem.clone()))),
    }
    Ok(())
}

fn encode_object_value(writer: &mut Writer, value: &Value, desc: &ObjectDesc) -> Result<()> {
    let object = match value {
        Value::Object(object) => object.as_ref(),
        other => return Err(mismatch(other, &TypeDesc::Object(*desc))),
    };
    if let Some(converter) = registry::converter(desc.key()) {
        let object = object.ok_or_else(|| {
            EncoderError::Encode(format!(
                "Absent value for converter type {}",
                desc.key().name()
            ))
        })?;
        return (converter.encode)(object, writer);
    }
    match desc.codec() {
        Some(codec) => (codec.encode)(object, writer),
        None => Err(SchemaError::NoConverter {
            type_name: desc.key().name(),
        }
        .into()),
    }
}

/// Decodes one value declared as `desc`.
///
/// Compressed integers come back at the width of the tag found on the wire;
/// callers coerce them with [`Value::coerce_to`].
///
/// # Errors
/// Fails on truncated or malformed input, an unknown integer tag, or a missing
/// converter/schema for a nested type.
pub fn decode_value(reader: &mut Reader, desc: &TypeDesc) -> Result<Value> {
    Ok(match desc {
        TypeDesc::U8 => Value::U8(reader.read_u8()?),
        TypeDesc::I8 => Value::I8(reader.read_i8()?),
        TypeDesc::I16 => Value::I16(reader.read_i16()?),
        TypeDesc::U16 => Value::U16(reader.read_u16()?),
        TypeDesc::I32 | TypeDesc::U32 | TypeDesc::I64 | TypeDesc::U64 => {
            compact::read_integer(reader)?
        }
        TypeDesc::Bool => Value::Bool(reader.read_bool()?),
        TypeDesc::F32 => Value::F32(reader.read_f32()?),
        TypeDesc::F64 => Value::F64(reader.read_f64()?),
        TypeDesc::Decimal => Value::Decimal(reader.read_decimal()?),
        TypeDesc::Char => Value::Char(reader.read_char()?),
        TypeDesc::String => Value::String(reader.read_string()?),
        TypeDesc::Enum(e) => decode_value(reader, &e.repr().desc())?,
        TypeDesc::Array(elem) | TypeDesc::List(elem) => decode_sequence(reader, elem)?,
        TypeDesc::Map(key_desc, value_desc) => {
            let len = compact::read_length(reader)?;
            let mut entries = Vec::with_capacity(len.min(reader.remaining()));
            for _ in 0..len {
                let key = decode_value(reader, key_desc)?.coerce_to(key_desc)?;
                let value = decode_value(reader, value_desc)?.coerce_to(value_desc)?;
                entries.push((key, value));
            }
            Value::Map(entries)
        }
        TypeDesc::Object(object) => decode_object_value(reader, object)?,
    })
}

fn decode_sequence(reader: &mut Reader, elem: &TypeDesc) -> Result<Value> {
    if *elem == TypeDesc::U8 {
        return reader.read_bytes().map(Value::Bytes);
    }
    let len = compact::read_length(reader)?;
    let mut items = Vec::with_capacity(len.min(reader.remaining()));
    for _ in 0..len {
        items.push(decode_value(reader, elem)?.coerce_to(elem)?);
    }
    Ok(Value::Seq(items))
}

fn decode_object_value(reader: &mut Reader, desc: &ObjectDesc) -> Result<Value> {
    if let Some(converter) = registry::converter(desc.key()) {
        return Ok(Value::Object(Some((converter.decode)(reader)?)));
    }
    match desc.codec() {
        Some(codec) => Ok(Value::Object((codec.decode)(reader)?)),
        None => Err(SchemaError::NoConverter {
            type_name: desc.key().name(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn encoded(value: &Value, desc: &TypeDesc) -> Vec<u8> {
        let mut writer = Writer::new();
        encode_value(&mut writer, value, desc).unwrap();
        writer.as_slice().to_vec()
    }

    #[test]
    fn byte_lists_are_bulk_with_element_layout() {
        let desc = TypeDesc::list(TypeDesc::U8);
        let bulk = encoded(&Value::Bytes(Bytes::from_static(&[1, 2, 3])), &desc);
        let items = encoded(
            &Value::Seq(vec![Value::U8(1), Value::U8(2), Value::U8(3)]),
            &desc,
        );
        assert_eq!(bulk, vec![0, 3, 1, 2, 3]);
        assert_eq!(bulk, items);

        let mut reader = Reader::new(Bytes::from(bulk));
        assert!(matches!(
            decode_value(&mut reader, &desc).unwrap(),
            Value::Bytes(b) if b[..] == [1, 2, 3]
        ));
    }

    #[test]
    fn short_integers_are_raw() {
        assert_eq!(encoded(&Value::I16(-2), &TypeDesc::I16), vec![0xFE, 0xFF]);
        // a narrower runtime value is widened to the declared raw width
        assert_eq!(encoded(&Value::U8(7), &TypeDesc::U16), vec![7, 0]);
        assert!(encode_value(&mut Writer::new(), &Value::U16(300), &TypeDesc::U8).is_err());
    }

    #[test]
    fn decoded_elements_take_declared_types() {
        let desc = TypeDesc::map(TypeDesc::U64, TypeDesc::array(TypeDesc::I32));
        let value = Value::Map(vec![(
            Value::U64(1),
            Value::Seq(vec![Value::I32(-1), Value::I32(100_000)]),
        )]);
        let bytes = encoded(&value, &desc);

        let mut reader = Reader::new(Bytes::from(bytes));
        match decode_value(&mut reader, &desc).unwrap() {
            Value::Map(entries) => {
                assert_eq!(entries.len(), 1);
                assert!(matches!(entries[0].0, Value::U64(1)));
                assert!(matches!(
                    &entries[0].1,
                    Value::Seq(items)
                        if matches!(items[..], [Value::I32(-1), Value::I32(100_000)])
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(reader.is_end());
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let mut writer = Writer::new();
        assert!(matches!(
            encode_value(&mut writer, &Value::Bool(true), &TypeDesc::String),
            Err(EncoderError::Coercion { .. })
        ));
        assert!(matches!(
            encode_value(&mut writer, &Value::String("x".into()), &TypeDesc::list(TypeDesc::I32)),
            Err(EncoderError::Coercion { .. })
        ));
        assert!(matches!(
            encode_value(&mut writer, &Value::F64(1.0), &TypeDesc::I64),
            Err(EncoderError::Coercion { .. })
        ));
    }

    #[test]
    fn huge_length_prefix_does_not_preallocate() {
        let mut writer = Writer::new();
        compact::write_length(&mut writer, u32::MAX as usize);
        let mut reader = Reader::new(writer.into_bytes());
        assert!(matches!(
            decode_value(&mut reader, &TypeDesc::list(TypeDesc::String)),
            Err(EncoderError::InsufficientData)
        ));
    }
}
