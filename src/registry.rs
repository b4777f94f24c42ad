//! Process-wide registration tables.
//!
//! - generated routines: a per-type encode and/or decode function supplied
//!   ahead of time that replaces the generic per-member loop
//! - custom converters: encode/decode pairs for types the generic path cannot
//!   walk structurally, typically foreign library types
//! - named types: enum and object descriptors of every derived type (submitted
//!   at link time) and of every type seen while building schemas, used to
//!   resolve type names carried by the include-all wire
//!
//! Every table is insert-if-absent. Registering a type twice keeps the first
//! entry and logs a warning.

use std::any::{type_name, Any, TypeId};
use std::sync::{Arc, Once};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::desc::{TypeDesc, TypeKey};
use crate::io::{Reader, Writer};
use crate::schema;
use crate::value::ObjectValue;
use crate::{EncoderError, Result};

/// A generated encode routine. It writes the member body only; the presence
/// flag is handled by the object encoder.
pub type EncodeFn<T> = fn(&T, &mut Writer) -> Result<()>;

/// A generated decode routine. It reads the member body only.
pub type DecodeFn<T> = fn(&mut Reader) -> Result<T>;

type Erased = Arc<dyn Any + Send + Sync>;

static GENERATED_ENCODERS: Lazy<DashMap<TypeId, Erased>> = Lazy::new(DashMap::new);
static GENERATED_DECODERS: Lazy<DashMap<TypeId, Erased>> = Lazy::new(DashMap::new);
static CONVERTERS: Lazy<DashMap<TypeId, Converter>> = Lazy::new(DashMap::new);
static NAMED_TYPES: Lazy<DashMap<&'static str, TypeDesc>> = Lazy::new(DashMap::new);
static LINKED_TYPES: Once = Once::new();

/// Descriptor of a derived type, collected at link time.
#[doc(hidden)]
pub struct LinkedType(pub fn() -> TypeDesc);

inventory::collect!(LinkedType);

/// Type-erased custom converter.
#[derive(Clone)]
pub struct Converter {
    pub encode: Arc<dyn Fn(&ObjectValue, &mut Writer) -> Result<()> + Send + Sync>,
    pub decode: Arc<dyn Fn(&mut Reader) -> Result<ObjectValue> + Send + Sync>,
}

fn insert_first<K, V>(table: &DashMap<K, V>, key: K, value: V, what: &str, name: &str) -> bool
where
    K: Eq + std::hash::Hash,
{
    match table.entry(key) {
        Entry::Occupied(_) => {
            log::warn!("{} already registered for {}, keeping the first one", what, name);
            false
        }
        Entry::Vacant(entry) => {
            entry.insert(value);
            true
        }
    }
}

fn warn_if_cached<T: 'static>(what: &str) {
    if schema::is_cached::<T>() {
        log::warn!(
            "{} for {} registered after its schema was built; the cached schema keeps its dispatch",
            what,
            type_name::<T>()
        );
    }
}

/// Registers a generated encode routine for `T`.
///
/// Returns `false` and keeps the existing routine if one was already registered.
pub fn register_encoder<T: Send + Sync + 'static>(routine: EncodeFn<T>) -> bool {
    warn_if_cached::<T>("Generated encoder");
    insert_first(
        &GENERATED_ENCODERS,
        TypeId::of::<T>(),
        Arc::new(routine) as Erased,
        "Generated encoder",
        type_name::<T>(),
    )
}

/// Registers a generated decode routine for `T`.
///
/// Returns `false` and keeps the existing routine if one was already registered.
pub fn register_decoder<T: Send + Sync + 'static>(routine: DecodeFn<T>) -> bool {
    warn_if_cached::<T>("Generated decoder");
    insert_first(
        &GENERATED_DECODERS,
        TypeId::of::<T>(),
        Arc::new(routine) as Erased,
        "Generated decoder",
        type_name::<T>(),
    )
}

pub(crate) fn generated_encoder<T: 'static>() -> Option<EncodeFn<T>> {
    let entry = GENERATED_ENCODERS.get(&TypeId::of::<T>())?;
    entry.value().downcast_ref::<EncodeFn<T>>().copied()
}

pub(crate) fn generated_decoder<T: 'static>() -> Option<DecodeFn<T>> {
    let entry = GENERATED_DECODERS.get(&TypeId::of::<T>())?;
    entry.value().downcast_ref::<DecodeFn<T>>().copied()
}

/// Registers a custom converter for values of exactly type `T`.
///
/// The converter takes precedence over nested schema recursion for `T`.
/// Returns `false` and keeps the existing converter if one was already registered.
pub fn register_converter<T: Any + Send + Sync>(encode: EncodeFn<T>, decode: DecodeFn<T>) -> bool {
    let converter = Converter {
        encode: Arc::new(move |object: &ObjectValue, writer: &mut Writer| {
            let value = object.downcast_ref::<T>().ok_or_else(|| EncoderError::Coercion {
                from: object.key().name().to_string(),
                to: type_name::<T>().to_string(),
            })?;
            encode(value, writer)
        }),
        decode: Arc::new(move |reader: &mut Reader| decode(reader).map(ObjectValue::new)),
    };
    insert_first(
        &CONVERTERS,
        TypeId::of::<T>(),
        converter,
        "Custom converter",
        type_name::<T>(),
    )
}

/// Looks up the converter for `key`, cloned out of the table so the caller
/// may recurse into the registry while running it.
pub(crate) fn converter(key: &TypeKey) -> Option<Converter> {
    CONVERTERS.get(&key.id()).map(|entry| entry.value().clone())
}

/// Records every enum and object named inside `desc`.
pub(crate) fn register_named(desc: &TypeDesc) {
    desc.visit_named(&mut |named| {
        let name = match named {
            TypeDesc::Enum(e) => e.key().name(),
            TypeDesc::Object(o) => o.key().name(),
            _ => return,
        };
        NAMED_TYPES.entry(name).or_insert_with(|| named.clone());
    });
}

fn register_linked() {
    LINKED_TYPES.call_once(|| {
        let mut count = 0usize;
        for linked in inventory::iter::<LinkedType> {
            register_named(&(linked.0)());
            count += 1;
        }
        log::debug!("Registered {} derived types for type name lookup", count);
    });
}

/// Resolves a type path recorded by [`register_named`] or submitted by
/// `#[derive(Reflect)]`.
pub(crate) fn named_type(path: &str) -> Option<TypeDesc> {
    register_linked();
    NAMED_TYPES.get(path).map(|entry| entry.value().clone())
}
