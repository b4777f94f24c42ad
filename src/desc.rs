//! Static type descriptors.
//!
//! A [`TypeDesc`] is the declared type of a member, element, key or value. The
//! recursive codec dispatches on it, never on the runtime shape of a value.
//! Descriptors are produced at compile time through [`Describe`] and can be
//! rendered to and parsed from a compact type name, which the include-all wire
//! carries next to each member value.

use std::any::{type_name, Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};

use bytes::Bytes;

use crate::io::{Reader, Writer};
use crate::registry;
use crate::schema::Model;
use crate::value::ObjectValue;
use crate::{EncoderError, Result};

/// Identity of a Rust type plus its name for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// The eight integer widths a member can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntKind {
    U8,
    I8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
}

impl IntKind {
    /// Returns true if `value` is representable in this width.
    pub fn contains(self, value: i128) -> bool {
        let (min, max) = match self {
            IntKind::U8 => (0, u8::MAX as i128),
            IntKind::I8 => (i8::MIN as i128, i8::MAX as i128),
            IntKind::I16 => (i16::MIN as i128, i16::MAX as i128),
            IntKind::U16 => (0, u16::MAX as i128),
            IntKind::I32 => (i32::MIN as i128, i32::MAX as i128),
            IntKind::U32 => (0, u32::MAX as i128),
            IntKind::I64 => (i64::MIN as i128, i64::MAX as i128),
            IntKind::U64 => (0, u64::MAX as i128),
        };
        (min..=max).contains(&value)
    }

    pub fn desc(self) -> TypeDesc {
        match self {
            IntKind::U8 => TypeDesc::U8,
            IntKind::I8 => TypeDesc::I8,
            IntKind::I16 => TypeDesc::I16,
            IntKind::U16 => TypeDesc::U16,
            IntKind::I32 => TypeDesc::I32,
            IntKind::U32 => TypeDesc::U32,
            IntKind::I64 => TypeDesc::I64,
            IntKind::U64 => TypeDesc::U64,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "u8" => IntKind::U8,
            "i8" => IntKind::I8,
            "i16" => IntKind::I16,
            "u16" => IntKind::U16,
            "i32" => IntKind::I32,
            "u32" => IntKind::U32,
            "i64" => IntKind::I64,
            "u64" => IntKind::U64,
            _ => return None,
        };
        Some(kind)
    }

    fn as_str(self) -> &'static str {
        match self {
            IntKind::U8 => "u8",
            IntKind::I8 => "i8",
            IntKind::I16 => "i16",
            IntKind::U16 => "u16",
            IntKind::I32 => "i32",
            IntKind::U32 => "u32",
            IntKind::I64 => "i64",
            IntKind::U64 => "u64",
        }
    }
}

impl fmt::Display for IntKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fieldless enum travelling as its underlying integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumDesc {
    key: TypeKey,
    repr: IntKind,
}

impl EnumDesc {
    pub fn of<T: Any>(repr: IntKind) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            repr,
        }
    }

    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    pub fn repr(&self) -> IntKind {
        self.repr
    }
}

/// Type-erased entry points into the object encoder/decoder for one model type.
#[derive(Clone, Copy)]
pub struct ObjectCodec {
    pub encode: fn(Option<&ObjectValue>, &mut Writer) -> Result<()>,
    pub decode: fn(&mut Reader) -> Result<Option<ObjectValue>>,
}

/// A nested object type: either a [`Model`] with its own schema, or an opaque
/// type that only a registered custom converter can handle.
#[derive(Clone, Copy)]
pub struct ObjectDesc {
    key: TypeKey,
    codec: Option<ObjectCodec>,
}

impl ObjectDesc {
    pub fn model<T: Model>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            codec: Some(ObjectCodec {
                encode: crate::object::encode_erased::<T>,
                decode: crate::object::decode_erased::<T>,
            }),
        }
    }

    pub fn opaque<T: Any>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            codec: None,
        }
    }

    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    pub fn codec(&self) -> Option<ObjectCodec> {
        self.codec
    }
}

impl PartialEq for ObjectDesc {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ObjectDesc {}

impl fmt::Debug for ObjectDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectDesc")
            .field("type", &self.key.name)
            .field("model", &self.codec.is_some())
            .finish()
    }
}

/// Declared static type of a member, element, key or value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDesc {
    Bool,
    U8,
    I8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Decimal,
    Char,
    String,
    Enum(EnumDesc),
    /// Fixed-size sequence.
    Array(Box<TypeDesc>),
    /// Resizable sequence.
    List(Box<TypeDesc>),
    Map(Box<TypeDesc>, Box<TypeDesc>),
    Object(ObjectDesc),
}

impl TypeDesc {
    pub fn array(elem: TypeDesc) -> Self {
        TypeDesc::Array(Box::new(elem))
    }

    pub fn list(elem: TypeDesc) -> Self {
        TypeDesc::List(Box::new(elem))
    }

    pub fn map(key: TypeDesc, value: TypeDesc) -> Self {
        TypeDesc::Map(Box::new(key), Box::new(value))
    }

    /// The integer width of an integer descriptor; enums report their repr.
    pub fn int_kind(&self) -> Option<IntKind> {
        match self {
            TypeDesc::U8 => Some(IntKind::U8),
            TypeDesc::I8 => Some(IntKind::I8),
            TypeDesc::I16 => Some(IntKind::I16),
            TypeDesc::U16 => Some(IntKind::U16),
            TypeDesc::I32 => Some(IntKind::I32),
            TypeDesc::U32 => Some(IntKind::U32),
            TypeDesc::I64 => Some(IntKind::I64),
            TypeDesc::U64 => Some(IntKind::U64),
            TypeDesc::Enum(e) => Some(e.repr),
            _ => None,
        }
    }

    /// Calls `f` for every enum and object descriptor nested in `self`, `self` included.
    pub fn visit_named(&self, f: &mut impl FnMut(&TypeDesc)) {
        match self {
            TypeDesc::Enum(_) | TypeDesc::Object(_) => f(self),
            TypeDesc::Array(elem) | TypeDesc::List(elem) => elem.visit_named(f),
            TypeDesc::Map(key, value) => {
                key.visit_named(f);
                value.visit_named(f);
            }
            _ => {}
        }
    }

    /// Parses a type name produced by the `Display` impl.
    ///
    /// Enum and object names resolve through the types seen while building
    /// schemas in this process.
    ///
    /// # Errors
    /// Returns `EncoderError::UnknownTypeName` for malformed or unknown names.
    pub fn parse(name: &str) -> Result<TypeDesc> {
        let mut parser = NameParser { src: name, pos: 0 };
        let desc = parser.parse_desc()?;
        if parser.pos != name.len() {
            return Err(EncoderError::UnknownTypeName(name.to_string()));
        }
        Ok(desc)
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Bool => f.write_str("bool"),
            TypeDesc::F32 => f.write_str("f32"),
            TypeDesc::F64 => f.write_str("f64"),
            TypeDesc::Decimal => f.write_str("decimal"),
            TypeDesc::Char => f.write_str("char"),
            TypeDesc::String => f.write_str("string"),
            TypeDesc::Enum(e) => write!(f, "enum{{{}:{}}}", e.key.name, e.repr),
            TypeDesc::Array(elem) => write!(f, "[{}]", elem),
            TypeDesc::List(elem) => write!(f, "list<{}>", elem),
            TypeDesc::Map(key, value) => write!(f, "map<{},{}>", key, value),
            TypeDesc::Object(o) => write!(f, "obj{{{}}}", o.key.name),
            int => match int.int_kind() {
                Some(kind) => f.write_str(kind.as_str()),
                None => Ok(()),
            },
        }
    }
}

struct NameParser<'a> {
    src: &'a str,
    pos: usize,
}

impl NameParser<'_> {
    fn error(&self) -> EncoderError {
        EncoderError::UnknownTypeName(self.src.to_string())
    }

    fn rest(&self) -> &str {
        &self.src[self.pos..]
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error())
        }
    }

    /// Reads a `{path}` body. Rust type paths never contain braces.
    fn braced_path(&mut self) -> Result<String> {
        let end = self.rest().find('}').ok_or_else(|| self.error())?;
        let path = self.rest()[..end].to_string();
        self.pos += end + 1;
        Ok(path)
    }

    fn parse_desc(&mut self) -> Result<TypeDesc> {
        if self.eat("[") {
            let elem = self.parse_desc()?;
            self.expect("]")?;
            return Ok(TypeDesc::array(elem));
        }
        if self.eat("list<") {
            let elem = self.parse_desc()?;
            self.expect(">")?;
            return Ok(TypeDesc::list(elem));
        }
        if self.eat("map<") {
            let key = self.parse_desc()?;
            self.expect(",")?;
            let value = self.parse_desc()?;
            self.expect(">")?;
            return Ok(TypeDesc::map(key, value));
        }
        if self.eat("enum{") {
            let body = self.braced_path()?;
            let (path, repr) = body
                .rsplit_once(':')
                .and_then(|(path, repr)| Some((path, IntKind::from_name(repr)?)))
                .ok_or_else(|| self.error())?;
            // An enum this process does not know still reads as its integer.
            return Ok(match registry::named_type(path) {
                Some(desc) if matches!(&desc, TypeDesc::Enum(e) if e.repr == repr) => desc,
                _ => repr.desc(),
            });
        }
        if self.eat("obj{") {
            let path = self.braced_path()?;
            return match registry::named_type(&path) {
                Some(desc @ TypeDesc::Object(_)) => Ok(desc),
                _ => Err(EncoderError::UnknownTypeName(path)),
            };
        }

        let rest = self.rest();
        let end = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        let desc = match &rest[..end] {
            "bool" => TypeDesc::Bool,
            "f32" => TypeDesc::F32,
            "f64" => TypeDesc::F64,
            "decimal" => TypeDesc::Decimal,
            "char" => TypeDesc::Char,
            "string" => TypeDesc::String,
            name => match IntKind::from_name(name) {
                Some(kind) => kind.desc(),
                None => return Err(self.error()),
            },
        };
        self.pos += end;
        Ok(desc)
    }
}

/// Types with a static descriptor.
pub trait Describe {
    fn type_desc() -> TypeDesc;
}

macro_rules! impl_describe {
    ($($ty:ty => $desc:expr),* $(,)?) => {
        $(
            impl Describe for $ty {
                #[inline]
                fn type_desc() -> TypeDesc {
                    $desc
                }
            }
        )*
    };
}

impl_describe! {
    bool => TypeDesc::Bool,
    u8 => TypeDesc::U8,
    i8 => TypeDesc::I8,
    i16 => TypeDesc::I16,
    u16 => TypeDesc::U16,
    i32 => TypeDesc::I32,
    u32 => TypeDesc::U32,
    i64 => TypeDesc::I64,
    u64 => TypeDesc::U64,
    f32 => TypeDesc::F32,
    f64 => TypeDesc::F64,
    rust_decimal::Decimal => TypeDesc::Decimal,
    char => TypeDesc::Char,
    String => TypeDesc::String,
    Bytes => TypeDesc::list(TypeDesc::U8),
}

impl<T: Describe, const N: usize> Describe for [T; N] {
    fn type_desc() -> TypeDesc {
        TypeDesc::array(T::type_desc())
    }
}

impl<T: Describe> Describe for Box<[T]> {
    fn type_desc() -> TypeDesc {
        TypeDesc::array(T::type_desc())
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn type_desc() -> TypeDesc {
        TypeDesc::list(T::type_desc())
    }
}

impl<K: Describe, V: Describe, S> Describe for HashMap<K, V, S> {
    fn type_desc() -> TypeDesc {
        TypeDesc::map(K::type_desc(), V::type_desc())
    }
}

impl<K: Describe, V: Describe> Describe for BTreeMap<K, V> {
    fn type_desc() -> TypeDesc {
        TypeDesc::map(K::type_desc(), V::type_desc())
    }
}

#[cfg(feature = "indexmap")]
impl<K: Describe, V: Describe, S> Describe for indexmap::IndexMap<K, V, S> {
    fn type_desc() -> TypeDesc {
        TypeDesc::map(K::type_desc(), V::type_desc())
    }
}

/// `None` travels as an absent object (presence flag `false`).
impl<T: Model> Describe for Option<T> {
    fn type_desc() -> TypeDesc {
        T::type_desc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_nested_names() {
        let desc = TypeDesc::map(
            TypeDesc::String,
            TypeDesc::list(TypeDesc::array(TypeDesc::I32)),
        );
        assert_eq!(desc.to_string(), "map<string,list<[i32]>>");
    }

    #[test]
    fn parses_primitive_and_container_names() {
        for desc in [
            TypeDesc::Bool,
            TypeDesc::U64,
            TypeDesc::Decimal,
            TypeDesc::list(TypeDesc::U8),
            TypeDesc::map(TypeDesc::Char, TypeDesc::array(TypeDesc::F64)),
        ] {
            assert_eq!(TypeDesc::parse(&desc.to_string()).unwrap(), desc);
        }
    }

    #[test]
    fn rejects_unknown_names() {
        for name in [
            "",
            "int",
            "list<i32",
            "map<i32>",
            "[i32]x",
            "obj{no::such::Type}",
            "enum{no::such::Type}",
            "enum{no::such::Type:i128}",
        ] {
            assert!(
                matches!(TypeDesc::parse(name), Err(EncoderError::UnknownTypeName(_))),
                "{:?}",
                name
            );
        }
    }

    #[test]
    fn unknown_enum_names_read_as_their_repr() {
        assert_eq!(
            TypeDesc::parse("list<enum{gone::Shade:u16}>").unwrap(),
            TypeDesc::list(TypeDesc::U16)
        );
    }

    #[test]
    fn int_kind_ranges() {
        assert!(IntKind::U8.contains(255));
        assert!(!IntKind::U8.contains(256));
        assert!(!IntKind::U64.contains(-1));
        assert!(IntKind::I64.contains(i64::MIN as i128));
        assert!(!IntKind::I32.contains(i32::MAX as i128 + 1));
    }

    #[test]
    fn static_descriptors() {
        assert_eq!(<Vec<u16>>::type_desc(), TypeDesc::list(TypeDesc::U16));
        assert_eq!(<[bool; 3]>::type_desc(), TypeDesc::array(TypeDesc::Bool));
        assert_eq!(
            <BTreeMap<String, Vec<i64>>>::type_desc(),
            TypeDesc::map(TypeDesc::String, TypeDesc::list(TypeDesc::I64))
        );
    }
}
