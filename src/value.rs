//! Dynamic values flowing between member accessors and the recursive codec.
//!
//! Member getters turn a typed field into a [`Value`]; the codec writes it
//! according to the member's [`TypeDesc`]. On the way back the codec produces
//! a [`Value`] whose runtime shape may be narrower than the declared type (a
//! compressed `i64` holding `7` decodes as [`Value::U8`]), and
//! [`Value::coerce_to`] brings it to the declared type before it reaches a
//! setter.

use std::any::{type_name, Any};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{BuildHasher, Hash};

use bytes::Bytes;
use rust_decimal::Decimal;

use crate::desc::{Describe, IntKind, TypeDesc, TypeKey};
use crate::{EncoderError, Result};

/// A boxed instance of a nested object or opaque type.
pub struct ObjectValue {
    key: TypeKey,
    inner: Box<dyn Any + Send + Sync>,
}

impl ObjectValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            inner: Box::new(value),
        }
    }

    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Takes the boxed value out as `T`.
    pub fn downcast<T: Any>(self) -> Result<T> {
        let name = self.key.name();
        self.inner
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| EncoderError::Coercion {
                from: name.to_string(),
                to: type_name::<T>().to_string(),
            })
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectValue({})", self.key.name())
    }
}

/// A decoded or to-be-encoded value.
#[derive(Debug)]
pub enum Value {
    Bool(bool),
    U8(u8),
    I8(i8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Char(char),
    String(String),
    /// A byte sequence read or written in one bulk operation.
    Bytes(Bytes),
    /// Elements of an array or list.
    Seq(Vec<Value>),
    /// Map entries in iteration order.
    Map(Vec<(Value, Value)>),
    /// A nested object; `None` is the absent value.
    Object(Option<ObjectValue>),
}

impl Value {
    /// Short name of the runtime shape, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::U8(_) => "u8",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::U16(_) => "u16",
            Value::I32(_) => "i32",
            Value::U32(_) => "u32",
            Value::I64(_) => "i64",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Decimal(_) => "decimal",
            Value::Char(_) => "char",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "map",
            Value::Object(Some(o)) => o.key().name(),
            Value::Object(None) => "absent object",
        }
    }

    /// The numeric value of any integer variant.
    pub fn as_integer(&self) -> Option<i128> {
        match *self {
            Value::U8(v) => Some(v.into()),
            Value::I8(v) => Some(v.into()),
            Value::I16(v) => Some(v.into()),
            Value::U16(v) => Some(v.into()),
            Value::I32(v) => Some(v.into()),
            Value::U32(v) => Some(v.into()),
            Value::I64(v) => Some(v.into()),
            Value::U64(v) => Some(v.into()),
            _ => None,
        }
    }

    /// Builds the integer variant of `kind` holding `value`.
    ///
    /// # Errors
    /// Returns a coercion error if `value` does not fit `kind`.
    pub fn integer(value: i128, kind: IntKind) -> Result<Value> {
        if !kind.contains(value) {
            return Err(EncoderError::Coercion {
                from: value.to_string(),
                to: kind.to_string(),
            });
        }
        Ok(match kind {
            IntKind::U8 => Value::U8(value as u8),
            IntKind::I8 => Value::I8(value as i8),
            IntKind::I16 => Value::I16(value as i16),
            IntKind::U16 => Value::U16(value as u16),
            IntKind::I32 => Value::I32(value as i32),
            IntKind::U32 => Value::U32(value as u32),
            IntKind::I64 => Value::I64(value as i64),
            IntKind::U64 => Value::U64(value as u64),
        })
    }

    /// Returns true if a scalar value already has exactly the declared type.
    pub fn is_exact(&self, desc: &TypeDesc) -> bool {
        matches!(
            (self, desc),
            (Value::Bool(_), TypeDesc::Bool)
                | (Value::U8(_), TypeDesc::U8)
                | (Value::I8(_), TypeDesc::I8)
                | (Value::I16(_), TypeDesc::I16)
                | (Value::U16(_), TypeDesc::U16)
                | (Value::I32(_), TypeDesc::I32)
                | (Value::U32(_), TypeDesc::U32)
                | (Value::I64(_), TypeDesc::I64)
                | (Value::U64(_), TypeDesc::U64)
                | (Value::F32(_), TypeDesc::F32)
                | (Value::F64(_), TypeDesc::F64)
                | (Value::Decimal(_), TypeDesc::Decimal)
                | (Value::Char(_), TypeDesc::Char)
                | (Value::String(_), TypeDesc::String)
        )
    }

    fn mismatch(&self, desc: &TypeDesc) -> EncoderError {
        EncoderError::Coercion {
            from: self.kind_name().to_string(),
            to: desc.to_string(),
        }
    }

    /// Converts `self` to the exact declared type `desc`.
    ///
    /// This is a numeric or representation conversion, never a reinterpretation
    /// of bytes. Containers are converted element by element.
    ///
    /// # Errors
    /// Returns `EncoderError::Coercion` if the value is not representable as `desc`.
    pub fn coerce_to(self, desc: &TypeDesc) -> Result<Value> {
        if self.is_exact(desc) {
            return Ok(self);
        }
        if let Some(kind) = desc.int_kind() {
            let raw = self.as_integer().ok_or_else(|| self.mismatch(desc))?;
            return Value::integer(raw, kind).map_err(|_| self.mismatch(desc));
        }
        match desc {
            TypeDesc::F32 => {
                let narrowed = match &self {
                    Value::F64(v) if v.is_nan() || (*v as f32) as f64 == *v => Some(*v as f32),
                    other => other
                        .as_integer()
                        .filter(|n| (*n as f32) as i128 == *n)
                        .map(|n| n as f32),
                };
                narrowed.map(Value::F32).ok_or_else(|| self.mismatch(desc))
            }
            TypeDesc::F64 => {
                let widened = match &self {
                    Value::F32(v) => Some(f64::from(*v)),
                    other => other
                        .as_integer()
                        .filter(|n| (*n as f64) as i128 == *n)
                        .map(|n| n as f64),
                };
                widened.map(Value::F64).ok_or_else(|| self.mismatch(desc))
            }
            TypeDesc::Decimal => {
                let converted = match &self {
                    Value::F32(v) => Decimal::try_from(*v).ok(),
                    Value::F64(v) => Decimal::try_from(*v).ok(),
                    other => other
                        .as_integer()
                        .and_then(|n| Decimal::try_from_i128_with_scale(n, 0).ok()),
                };
                converted.map(Value::Decimal).ok_or_else(|| self.mismatch(desc))
            }
            TypeDesc::Char => self
                .as_integer()
                .and_then(|n| u32::try_from(n).ok())
                .and_then(char::from_u32)
                .map(Value::Char)
                .ok_or_else(|| self.mismatch(desc)),
            TypeDesc::Array(elem) | TypeDesc::List(elem) => match self {
                Value::Bytes(bytes) if **elem == TypeDesc::U8 => Ok(Value::Bytes(bytes)),
                Value::Bytes(bytes) => bytes
                    .iter()
                    .map(|b| Value::U8(*b).coerce_to(elem))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Seq),
                Value::Seq(items) => items
                    .into_iter()
                    .map(|item| item.coerce_to(elem))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Seq),
                other => Err(other.mismatch(desc)),
            },
            TypeDesc::Map(key, value) => match self {
                Value::Map(entries) => entries
                    .into_iter()
                    .map(|(k, v)| -> Result<(Value, Value)> {
                        Ok((k.coerce_to(key)?, v.coerce_to(value)?))
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Map),
                other => Err(other.mismatch(desc)),
            },
            TypeDesc::Object(o) => match self {
                Value::Object(None) => Ok(Value::Object(None)),
                Value::Object(Some(obj)) if obj.key() == o.key() => Ok(Value::Object(Some(obj))),
                other => Err(other.mismatch(desc)),
            },
            _ => Err(self.mismatch(desc)),
        }
    }
}

/// Conversion of a typed value into a [`Value`].
pub trait ToValue {
    fn to_value(&self) -> Value;
}

/// Conversion of a [`Value`] back into a typed value, coercing as needed.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

macro_rules! impl_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ToValue for $ty {
                #[inline]
                fn to_value(&self) -> Value {
                    Value::$variant(self.clone())
                }
            }

            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self> {
                    let desc = <$ty as Describe>::type_desc();
                    match value.coerce_to(&desc)? {
                        Value::$variant(v) => Ok(v),
                        other => Err(other.mismatch(&desc)),
                    }
                }
            }
        )*
    };
}

impl_scalar! {
    bool => Bool,
    u8 => U8,
    i8 => I8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Decimal => Decimal,
    char => Char,
    String => String,
}

impl ToValue for Bytes {
    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }
}

impl FromValue for Bytes {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bytes(bytes) => Ok(bytes),
            Value::Seq(items) => items
                .into_iter()
                .map(u8::from_value)
                .collect::<Result<Vec<u8>>>()
                .map(Bytes::from),
            other => Err(other.mismatch(&TypeDesc::list(TypeDesc::U8))),
        }
    }
}

fn seq_items<T: FromValue>(value: Value, desc: impl FnOnce() -> TypeDesc) -> Result<Vec<T>> {
    match value {
        Value::Seq(items) => items.into_iter().map(T::from_value).collect(),
        Value::Bytes(bytes) => bytes.iter().map(|b| T::from_value(Value::U8(*b))).collect(),
        other => Err(other.mismatch(&desc())),
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::Seq(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: FromValue + Describe> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self> {
        seq_items(value, Self::type_desc)
    }
}

impl<T: ToValue> ToValue for Box<[T]> {
    fn to_value(&self) -> Value {
        Value::Seq(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: FromValue + Describe> FromValue for Box<[T]> {
    fn from_value(value: Value) -> Result<Self> {
        seq_items(value, Self::type_desc).map(Vec::into_boxed_slice)
    }
}

impl<T: ToValue, const N: usize> ToValue for [T; N] {
    fn to_value(&self) -> Value {
        Value::Seq(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: FromValue + Describe, const N: usize> FromValue for [T; N] {
    fn from_value(value: Value) -> Result<Self> {
        let items = seq_items::<T>(value, Self::type_desc)?;
        let len = items.len();
        items.try_into().map_err(|_| {
            EncoderError::Decode(format!("Expected array of length {}, got {}", N, len))
        })
    }
}

fn map_entries<K: FromValue, V: FromValue>(
    value: Value,
    desc: impl FnOnce() -> TypeDesc,
) -> Result<impl Iterator<Item = Result<(K, V)>>> {
    match value {
        Value::Map(entries) => Ok(entries
            .into_iter()
            .map(|(k, v)| -> Result<(K, V)> { Ok((K::from_value(k)?, V::from_value(v)?)) })),
        other => Err(other.mismatch(&desc())),
    }
}

impl<K: ToValue, V: ToValue, S> ToValue for HashMap<K, V, S> {
    fn to_value(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.to_value(), v.to_value())).collect())
    }
}

impl<K, V, S> FromValue for HashMap<K, V, S>
where
    K: FromValue + Describe + Eq + Hash,
    V: FromValue + Describe,
    S: BuildHasher + Default,
{
    fn from_value(value: Value) -> Result<Self> {
        map_entries(value, Self::type_desc)?.collect()
    }
}

impl<K: ToValue, V: ToValue> ToValue for BTreeMap<K, V> {
    fn to_value(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.to_value(), v.to_value())).collect())
    }
}

impl<K: FromValue + Describe + Ord, V: FromValue + Describe> FromValue for BTreeMap<K, V> {
    fn from_value(value: Value) -> Result<Self> {
        map_entries(value, Self::type_desc)?.collect()
    }
}

#[cfg(feature = "indexmap")]
impl<K: ToValue, V: ToValue, S> ToValue for indexmap::IndexMap<K, V, S> {
    fn to_value(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.to_value(), v.to_value())).collect())
    }
}

#[cfg(feature = "indexmap")]
impl<K, V, S> FromValue for indexmap::IndexMap<K, V, S>
where
    K: FromValue + Describe + Eq + Hash,
    V: FromValue + Describe,
    S: BuildHasher + Default,
{
    fn from_value(value: Value) -> Result<Self> {
        map_entries(value, Self::type_desc)?.collect()
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(value) => value.to_value(),
            None => Value::Object(None),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(None) => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Boxes a nested object or opaque value. Used by derived getters.
pub fn object_to_value<T: Any + Send + Sync + Clone>(value: &T) -> Value {
    Value::Object(Some(ObjectValue::new(value.clone())))
}

/// Unboxes a nested object or opaque value. Used by derived setters.
///
/// # Errors
/// Fails if the value is absent or holds another type.
pub fn object_from_value<T: Any>(value: Value) -> Result<T> {
    match value {
        Value::Object(Some(obj)) => obj.downcast::<T>(),
        Value::Object(None) => Err(EncoderError::Decode(format!(
            "Absent value for non-optional {}",
            type_name::<T>()
        ))),
        other => Err(EncoderError::Coercion {
            from: other.kind_name().to_string(),
            to: type_name::<T>().to_string(),
        }),
    }
}

/// Reads an enum discriminant out of `value`, coercing it to `repr` first.
pub fn enum_discriminant(value: Value, repr: IntKind) -> Result<i128> {
    let coerced = value.coerce_to(&repr.desc())?;
    Ok(coerced.as_integer().unwrap_or_default())
}

/// Error for a discriminant that names no variant of `T`.
pub fn unknown_discriminant<T>(discriminant: i128) -> EncoderError {
    EncoderError::Coercion {
        from: discriminant.to_string(),
        to: type_name::<T>().to_string(),
    }
}
