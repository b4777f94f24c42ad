//! Support for types from optional third-party crates.
//!
//! String-like types get a descriptor of their own. Everything else is opaque
//! to the member walk and travels through the converters installed by
//! [`register_builtin_converters`]; mark such fields `#[graphpack(opaque)]`.

#[cfg(feature = "chrono")]
use chrono::{DateTime, Datelike, NaiveDate, Utc};
#[cfg(feature = "smol_str")]
use smol_str::SmolStr;
#[cfg(feature = "ulid")]
use ulid::Ulid;
#[cfg(feature = "uuid")]
use uuid::Uuid;

#[cfg(feature = "chrono")]
use crate::compact;
#[cfg(feature = "chrono")]
use crate::desc::IntKind;
#[cfg(any(feature = "chrono", feature = "uuid", feature = "ulid"))]
use crate::io::{Reader, Writer};
#[cfg(any(feature = "chrono", feature = "uuid", feature = "ulid"))]
use crate::registry::register_converter;
#[cfg(feature = "smol_str")]
use crate::{
    desc::{Describe, TypeDesc},
    value::{FromValue, ToValue, Value},
};
#[allow(unused_imports)]
use crate::{EncoderError, Result};

static BUILTINS: std::sync::Once = std::sync::Once::new();

/// Installs converters for every enabled third-party type.
///
/// Safe to call more than once; only the first call registers anything. A
/// converter the application registered earlier for the same type is kept.
pub fn register_builtin_converters() {
    BUILTINS.call_once(|| {
        #[cfg(feature = "chrono")]
        {
            register_converter::<DateTime<Utc>>(encode_datetime, decode_datetime);
            register_converter::<NaiveDate>(encode_date, decode_date);
        }
        #[cfg(feature = "uuid")]
        register_converter::<Uuid>(encode_uuid, decode_uuid);
        #[cfg(feature = "ulid")]
        register_converter::<Ulid>(encode_ulid, decode_ulid);
        log::debug!("Built-in converters registered");
    });
}

#[cfg(feature = "chrono")]
fn encode_datetime(value: &DateTime<Utc>, writer: &mut Writer) -> Result<()> {
    compact::write_integer(writer, i128::from(value.timestamp()), IntKind::I64)?;
    writer.write_u32(value.timestamp_subsec_nanos());
    Ok(())
}

#[cfg(feature = "chrono")]
fn decode_datetime(reader: &mut Reader) -> Result<DateTime<Utc>> {
    let seconds: i64 = crate::value::FromValue::from_value(compact::read_integer(reader)?)?;
    let nanos = reader.read_u32()?;
    DateTime::from_timestamp(seconds, nanos).ok_or_else(|| {
        EncoderError::Decode(format!(
            "Invalid timestamp: {} seconds, {} nanos",
            seconds, nanos
        ))
    })
}

/// Dates travel as days since 0001-01-01 (day 1).
#[cfg(feature = "chrono")]
fn encode_date(value: &NaiveDate, writer: &mut Writer) -> Result<()> {
    compact::write_integer(writer, i128::from(value.num_days_from_ce()), IntKind::I32)
}

#[cfg(feature = "chrono")]
fn decode_date(reader: &mut Reader) -> Result<NaiveDate> {
    let days: i32 = crate::value::FromValue::from_value(compact::read_integer(reader)?)?;
    NaiveDate::from_num_days_from_ce_opt(days)
        .ok_or_else(|| EncoderError::Decode(format!("Invalid date: {} days from CE", days)))
}

#[cfg(any(feature = "uuid", feature = "ulid"))]
fn read_16(reader: &mut Reader) -> Result<[u8; 16]> {
    let raw = reader.read_raw(16)?;
    let mut out = [0u8; 16];
    out.copy_from_slice(&raw);
    Ok(out)
}

#[cfg(feature = "uuid")]
fn encode_uuid(value: &Uuid, writer: &mut Writer) -> Result<()> {
    writer.write_raw(value.as_bytes());
    Ok(())
}

#[cfg(feature = "uuid")]
fn decode_uuid(reader: &mut Reader) -> Result<Uuid> {
    read_16(reader).map(Uuid::from_bytes)
}

#[cfg(feature = "ulid")]
fn encode_ulid(value: &Ulid, writer: &mut Writer) -> Result<()> {
    writer.write_raw(&value.to_bytes());
    Ok(())
}

#[cfg(feature = "ulid")]
fn decode_ulid(reader: &mut Reader) -> Result<Ulid> {
    read_16(reader).map(Ulid::from_bytes)
}

#[cfg(feature = "smol_str")]
impl Describe for SmolStr {
    fn type_desc() -> TypeDesc {
        TypeDesc::String
    }
}

#[cfg(feature = "smol_str")]
impl ToValue for SmolStr {
    fn to_value(&self) -> Value {
        Value::String(self.to_string())
    }
}

#[cfg(feature = "smol_str")]
impl FromValue for SmolStr {
    fn from_value(value: Value) -> Result<Self> {
        String::from_value(value).map(SmolStr::from)
    }
}
