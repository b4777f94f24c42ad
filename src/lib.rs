//! # graphpack
//!
//! A compact, schema-indexed binary serialization engine for Rust object graphs.
//!
//! - Per-type schemas derived once and cached for the life of the process
//! - Members addressed by small integer indices, written in ascending order
//! - Signed/unsigned 32- and 64-bit integers stored in their narrowest width
//! - Nested objects, fixed arrays, lists and maps handled recursively
//! - Custom converters for foreign types and registered routines that bypass
//!   the generic member walk
//!
//! ## Attribute Macros
//!
//! `#[derive(Reflect)]` generates the accessor table of a struct or fieldless enum.
//!
//! - `#[graphpack(serialize)]` marks a struct as serializable. Members opt in
//!   with `#[graphpack(index = N)]`.
//! - `#[graphpack(serialize(include_all))]` includes every member not marked
//!   `#[graphpack(ignore)]`, numbered in declaration order. Members are written
//!   with their names and type names and matched by name when decoding.
//! - `#[graphpack(opaque)]` on a field whose type has no descriptor (a foreign
//!   library type). Such fields need a converter from [`register_converter`].
//! - `#[graphpack(property(name = "..", ty = T, get = path, set = path, index = N))]`
//!   declares an accessor pair as a member. Properties follow fields in
//!   declaration order.
//!
//! ```rust
//! use graphpack::{deserialize, serialize, Reflect};
//!
//! #[derive(Reflect, Default, Clone, PartialEq, Debug)]
//! #[graphpack(serialize)]
//! struct Point {
//!     #[graphpack(index = 0)]
//!     x: i64,
//!     #[graphpack(index = 1)]
//!     y: i64,
//!     scratch: u8,
//! }
//!
//! let point = Point { x: 3, y: -300, scratch: 9 };
//! let bytes = serialize(&point).unwrap();
//! let decoded: Point = deserialize(&bytes).unwrap().unwrap();
//! assert_eq!(decoded, Point { x: 3, y: -300, scratch: 0 });
//! ```
//!
//! ## Feature Flags
//!
//! - `deflate`: whole-payload compression through `flate2`.
//! - `indexmap`: `IndexMap` as a map type.
//! - `chrono`: converters for `DateTime<Utc>` and `NaiveDate`.
//! - `uuid`: converter for `uuid::Uuid`.
//! - `ulid`: converter for `ulid::Ulid`.
//! - `smol_str`: `SmolStr` as a string type.
//!
//! Converter-backed types are opaque members (`#[graphpack(opaque)]`); call
//! [`register_builtin_converters`] once before using them.

pub mod codec;
pub mod compact;
pub mod desc;
mod features;
pub mod io;
pub mod object;
pub mod payload;
pub mod registry;
pub mod schema;
pub mod value;

use bytes::Bytes;

pub use desc::{Describe, EnumDesc, IntKind, ObjectDesc, TypeDesc, TypeKey};
pub use features::register_builtin_converters;
pub use graphpack_derive::Reflect;
pub use io::{Reader, Writer};
pub use object::{decode_object, encode_object};
pub use payload::Compression;
pub use registry::{register_converter, register_decoder, register_encoder};
pub use schema::{resolve, Model, Schema};
pub use value::{FromValue, ObjectValue, ToValue, Value};

/// Items referenced by `#[derive(Reflect)]` output. Not public API.
#[doc(hidden)]
pub mod __private {
    pub use crate::registry::LinkedType;
    pub use inventory;
}

/// Errors that can occur during encoding or decoding operations.
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    /// The value could not be encoded.
    #[error("Encode error: {0}")]
    Encode(String),
    /// The input could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
    /// The buffer did not contain enough data to complete the operation.
    #[error("Insufficient data in buffer")]
    InsufficientData,
    #[error("Unsupported compressed integer tag: {0}")]
    UnsupportedTag(u8),
    /// A value is not representable as the declared type.
    #[error("Cannot convert {from} to {to}")]
    Coercion { from: String, to: String },
    /// A type name on the wire names no known type.
    #[error("Unresolvable type name: {0}")]
    UnknownTypeName(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, EncoderError>;

/// A type declaration that cannot be turned into a schema, or a type the
/// encoder has no way to handle.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Type {type_name} is not marked serializable")]
    NotSerializable { type_name: &'static str },
    #[error("Property '{property}' of {type_name} must have both a getter and a setter")]
    PropertyNotReadWrite {
        property: &'static str,
        type_name: &'static str,
    },
    #[error("Index {index} is used twice in {type_name}")]
    DuplicateIndex {
        index: u16,
        type_name: &'static str,
    },
    #[error("Too many members in {type_name}")]
    IndexOverflow { type_name: &'static str },
    #[error("No custom converter registered for {type_name}")]
    NoConverter { type_name: &'static str },
}

/// Encodes `value` into a fresh buffer.
///
/// # Example
/// ```rust
/// use graphpack::{serialize, Reflect};
///
/// #[derive(Reflect, Default, Clone)]
/// #[graphpack(serialize)]
/// struct Counter {
///     #[graphpack(index = 0)]
///     hits: u64,
/// }
///
/// // presence flag, compressed integer tag (Byte), payload
/// assert_eq!(serialize(&Counter { hits: 5 }).unwrap().as_ref(), &[1, 0, 5]);
/// ```
pub fn serialize<T: Model>(value: &T) -> Result<Bytes> {
    serialize_with(Some(value), Compression::None)
}

/// Encodes a possibly absent value. `None` encodes as a single `false` byte.
pub fn serialize_nullable<T: Model>(value: Option<&T>) -> Result<Bytes> {
    serialize_with(value, Compression::None)
}

/// Encodes a possibly absent value and wraps the payload with `compression`.
pub fn serialize_with<T: Model>(value: Option<&T>, compression: Compression) -> Result<Bytes> {
    let mut writer = Writer::new();
    encode_object(value, &mut writer)?;
    compression.compress(writer.into_bytes())
}

/// Decodes a value written by [`serialize`]. Returns `None` for an absent value.
pub fn deserialize<T: Model>(bytes: &[u8]) -> Result<Option<T>> {
    deserialize_with(bytes, Compression::None)
}

/// Unwraps a payload with `compression`, then decodes it.
pub fn deserialize_with<T: Model>(bytes: &[u8], compression: Compression) -> Result<Option<T>> {
    let payload = compression.decompress(Bytes::copy_from_slice(bytes))?;
    let mut reader = Reader::new(payload);
    decode_object(&mut reader)
}
