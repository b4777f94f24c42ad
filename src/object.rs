//! Object encoder and decoder.
//!
//! Every object starts with a presence flag (`bool`). A present object is then
//! written by its registered generated routine if there is one; otherwise by
//! walking the schema members in ascending index order. Include-all types
//! write a member count followed by `(name, type name, value)` triples so a
//! reader can match members by name.

use std::any::type_name;
use std::collections::HashMap;

use crate::codec::{decode_value, encode_value};
use crate::compact;
use crate::desc::TypeDesc;
use crate::io::{Reader, Writer};
use crate::schema::{self, Dispatch, Model, Schema};
use crate::value::{ObjectValue, Value};
use crate::{EncoderError, Result};

/// Encodes `value` (or the absent marker) into `writer`.
///
/// # Errors
/// Fails if the schema of `T` cannot be built or a member cannot be encoded.
pub fn encode_object<T: Model>(value: Option<&T>, writer: &mut Writer) -> Result<()> {
    writer.write_bool(value.is_some());
    let Some(value) = value else {
        return Ok(());
    };

    let schema = schema::resolve::<T>()?;
    if let Some(routine) = schema.generated_encoder() {
        return routine(value, writer);
    }
    if let Dispatch::Invalid = schema.dispatch() {
        return Ok(());
    }

    if schema.include_all() {
        compact::write_length(writer, schema.len());
        for member in schema.members() {
            writer.write_str(member.name());
            writer.write_str(&member.type_desc().to_string());
            encode_value(writer, &member.get(value), member.type_desc())?;
        }
    } else {
        for member in schema.members() {
            encode_value(writer, &member.get(value), member.type_desc())?;
        }
    }
    Ok(())
}

/// Decodes an object written by [`encode_object`]. Returns `None` for the
/// absent marker.
///
/// Members missing from the end of a truncated payload keep their default.
///
/// # Errors
/// Fails on malformed input, unknown type names, or values that cannot be
/// coerced to the declared member types.
pub fn decode_object<T: Model>(reader: &mut Reader) -> Result<Option<T>> {
    if !reader.read_bool()? {
        return Ok(None);
    }

    let schema = schema::resolve::<T>()?;
    if let Some(routine) = schema.generated_decoder() {
        return routine(reader).map(Some);
    }

    let mut instance = T::default();
    match schema.dispatch() {
        Dispatch::Invalid => {}
        _ if schema.include_all() => decode_named(reader, &schema, &mut instance)?,
        _ => decode_indexed(reader, &schema, &mut instance)?,
    }
    Ok(Some(instance))
}

fn decode_indexed<T: Model>(reader: &mut Reader, schema: &Schema<T>, instance: &mut T) -> Result<()> {
    for member in schema.members() {
        if reader.is_end() {
            log::debug!(
                "Input for {} ends before member {} (index {}), keeping defaults",
                type_name::<T>(),
                member.name(),
                member.index()
            );
            break;
        }
        let value = decode_value(reader, member.type_desc())?.coerce_to(member.type_desc())?;
        member.set(instance, value)?;
    }
    Ok(())
}

fn decode_named<T: Model>(reader: &mut Reader, schema: &Schema<T>, instance: &mut T) -> Result<()> {
    let count = compact::read_length(reader)?;
    let mut values: HashMap<String, Value> = HashMap::with_capacity(count.min(reader.remaining()));
    for _ in 0..count {
        let name = reader.read_string()?;
        let desc = TypeDesc::parse(&reader.read_string()?)?;
        let value = decode_value(reader, &desc)?.coerce_to(&desc)?;
        values.insert(name, value);
    }

    for member in schema.members() {
        if let Some(value) = values.remove(member.name()) {
            member.set(instance, value.coerce_to(member.type_desc())?)?;
        }
    }
    if !values.is_empty() {
        log::trace!(
            "Ignoring {} unknown members while decoding {}",
            values.len(),
            type_name::<T>()
        );
    }
    Ok(())
}

pub(crate) fn encode_erased<T: Model>(value: Option<&ObjectValue>, writer: &mut Writer) -> Result<()> {
    let typed = match value {
        Some(object) => Some(object.downcast_ref::<T>().ok_or_else(|| {
            EncoderError::Coercion {
                from: object.key().name().to_string(),
                to: type_name::<T>().to_string(),
            }
        })?),
        None => None,
    };
    encode_object(typed, writer)
}

pub(crate) fn decode_erased<T: Model>(reader: &mut Reader) -> Result<Option<ObjectValue>> {
    Ok(decode_object::<T>(reader)?.map(ObjectValue::new))
}
