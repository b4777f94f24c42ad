//! Schema derivation and the process-wide schema cache.
//!
//! A [`Model`] type hands out a [`Declaration`]: its serialization annotation
//! and the accessor table for each declared field and property. The first
//! encode or decode of the type turns that declaration into a [`Schema`],
//! which is cached for the lifetime of the process.

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::desc::{Describe, TypeDesc, TypeKey};
use crate::registry::{self, DecodeFn, EncodeFn};
use crate::value::{FromValue, ToValue, Value};
use crate::{EncoderError, Result, SchemaError};

/// Reads a member out of an instance.
pub type Getter<T> = fn(&T) -> Value;

/// Assigns a decoded value to a member of an instance.
pub type Setter<T> = fn(&mut T, Value) -> Result<()>;

/// A schema-bearing type. Usually implemented through `#[derive(Reflect)]`.
pub trait Model: Describe + ToValue + FromValue + Default + Clone + Send + Sync + 'static {
    fn declaration() -> Declaration<Self>;
}

/// The type-level serialization annotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Annotation {
    /// Every non-ignored member participates, indexed in declaration order.
    pub include_all: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Property,
}

/// One declared field or property with its annotations and accessors.
pub struct DeclaredMember<T> {
    pub name: &'static str,
    pub kind: MemberKind,
    pub index: Option<u16>,
    pub ignore: bool,
    pub type_desc: TypeDesc,
    pub get: Option<Getter<T>>,
    pub set: Option<Setter<T>>,
}

impl<T> DeclaredMember<T> {
    pub fn field(name: &'static str, type_desc: TypeDesc, get: Getter<T>, set: Setter<T>) -> Self {
        Self {
            name,
            kind: MemberKind::Field,
            index: None,
            ignore: false,
            type_desc,
            get: Some(get),
            set: Some(set),
        }
    }

    /// A property may be declared without a getter or setter, but such a
    /// property makes schema building fail.
    pub fn property(
        name: &'static str,
        type_desc: TypeDesc,
        get: Option<Getter<T>>,
        set: Option<Setter<T>>,
    ) -> Self {
        Self {
            name,
            kind: MemberKind::Property,
            index: None,
            ignore: false,
            type_desc,
            get,
            set,
        }
    }

    pub fn index(mut self, index: u16) -> Self {
        self.index = Some(index);
        self
    }

    pub fn ignore(mut self) -> Self {
        self.ignore = true;
        self
    }
}

/// Everything the schema builder knows about a type.
pub struct Declaration<T> {
    /// `None` when the type carries no serialization annotation.
    pub annotation: Option<Annotation>,
    pub members: Vec<DeclaredMember<T>>,
}

impl<T> Declaration<T> {
    pub fn new(annotation: Option<Annotation>) -> Self {
        Self {
            annotation,
            members: Vec::new(),
        }
    }

    pub fn member(mut self, member: DeclaredMember<T>) -> Self {
        self.members.push(member);
        self
    }
}

/// A schema member: its index, name, declared type and accessors.
pub struct Member<T> {
    name: &'static str,
    index: u16,
    type_desc: TypeDesc,
    get: Getter<T>,
    set: Setter<T>,
}

impl<T> Member<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn type_desc(&self) -> &TypeDesc {
        &self.type_desc
    }

    pub fn get(&self, instance: &T) -> Value {
        (self.get)(instance)
    }

    pub fn set(&self, instance: &mut T, value: Value) -> Result<()> {
        (self.set)(instance, value)
    }
}

/// Generated routines registered for a type. At least one side is present.
pub struct Routines<T> {
    pub encode: Option<EncodeFn<T>>,
    pub decode: Option<DecodeFn<T>>,
}

/// How a type is encoded and decoded, chosen once when its schema is built.
pub enum Dispatch<T> {
    /// Registered routines take priority; a missing side uses the member list.
    Generated(Routines<T>),
    /// The generic per-member loop.
    Generic,
    /// No members: only the presence flag travels.
    Invalid,
}

/// The derived, cached description of a type's serializable members.
pub struct Schema<T> {
    key: TypeKey,
    include_all: bool,
    min_index: u16,
    max_index: u16,
    members: BTreeMap<u16, Member<T>>,
    dispatch: Dispatch<T>,
}

impl<T> Schema<T> {
    pub fn type_key(&self) -> &TypeKey {
        &self.key
    }

    /// False when the type has no members.
    pub fn is_valid(&self) -> bool {
        !self.members.is_empty()
    }

    pub fn include_all(&self) -> bool {
        self.include_all
    }

    pub fn min_index(&self) -> u16 {
        self.min_index
    }

    pub fn max_index(&self) -> u16 {
        self.max_index
    }

    pub fn index_range(&self) -> RangeInclusive<u16> {
        self.min_index..=self.max_index
    }

    pub fn dispatch(&self) -> &Dispatch<T> {
        &self.dispatch
    }

    pub fn member(&self, index: u16) -> Option<&Member<T>> {
        self.members.get(&index)
    }

    /// Members in ascending index order; gaps in the index range are skipped.
    pub fn members(&self) -> impl Iterator<Item = &Member<T>> {
        self.members
            .range(self.index_range())
            .map(|(_, member)| member)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member_types(&self) -> impl Iterator<Item = (u16, &TypeDesc)> {
        self.members().map(|member| (member.index, &member.type_desc))
    }

    pub(crate) fn generated_encoder(&self) -> Option<EncodeFn<T>> {
        match &self.dispatch {
            Dispatch::Generated(routines) => routines.encode,
            _ => None,
        }
    }

    pub(crate) fn generated_decoder(&self) -> Option<DecodeFn<T>> {
        match &self.dispatch {
            Dispatch::Generated(routines) => routines.decode,
            _ => None,
        }
    }
}

fn build<T: Model>() -> Result<Schema<T>> {
    let key = TypeKey::of::<T>();
    let declaration = T::declaration();
    let annotation = declaration.annotation.ok_or(SchemaError::NotSerializable {
        type_name: key.name(),
    })?;

    let mut min_index = u16::MAX;
    let mut max_index = u16::MIN;
    let mut members = BTreeMap::new();

    // Fields first, then properties, each in declaration order.
    for kind in [MemberKind::Field, MemberKind::Property] {
        for declared in declaration.members.iter().filter(|m| m.kind == kind) {
            let (get, set) = match (declared.get, declared.set) {
                (Some(get), Some(set)) => (get, set),
                _ => {
                    return Err(SchemaError::PropertyNotReadWrite {
                        property: declared.name,
                        type_name: key.name(),
                    }
                    .into())
                }
            };

            let index = if annotation.include_all {
                if declared.ignore {
                    continue;
                }
                u16::try_from(members.len()).map_err(|_| SchemaError::IndexOverflow {
                    type_name: key.name(),
                })?
            } else {
                match declared.index {
                    Some(index) => index,
                    None => continue,
                }
            };

            if members.contains_key(&index) {
                return Err(SchemaError::DuplicateIndex {
                    index,
                    type_name: key.name(),
                }
                .into());
            }
            registry::register_named(&declared.type_desc);
            members.insert(
                index,
                Member {
                    name: declared.name,
                    index,
                    type_desc: declared.type_desc.clone(),
                    get,
                    set,
                },
            );
            min_index = min_index.min(index);
            max_index = max_index.max(index);
        }
    }

    if members.is_empty() {
        min_index = 0;
        max_index = 0;
    }

    let routines = Routines {
        encode: registry::generated_encoder::<T>(),
        decode: registry::generated_decoder::<T>(),
    };
    let dispatch = if routines.encode.is_some() || routines.decode.is_some() {
        Dispatch::Generated(routines)
    } else if members.is_empty() {
        Dispatch::Invalid
    } else {
        Dispatch::Generic
    };

    registry::register_named(&T::type_desc());
    log::debug!(
        "Built schema for {}: {} members, index range {}..={}, {}",
        key.name(),
        members.len(),
        min_index,
        max_index,
        match dispatch {
            Dispatch::Generated(_) => "generated routines",
            Dispatch::Generic => "generic members",
            Dispatch::Invalid => "no members",
        }
    );

    Ok(Schema {
        key,
        include_all: annotation.include_all,
        min_index,
        max_index,
        members,
        dispatch,
    })
}

static SCHEMAS: Lazy<DashMap<TypeId, Arc<dyn Any + Send + Sync>>> = Lazy::new(DashMap::new);

fn downcast<T: Model>(erased: Arc<dyn Any + Send + Sync>) -> Result<Arc<Schema<T>>> {
    erased.downcast::<Schema<T>>().map_err(|_| {
        EncoderError::Encode(format!(
            "Cached schema has an unexpected type for {}",
            std::any::type_name::<T>()
        ))
    })
}

/// Returns the schema of `T`, building and caching it on first use.
///
/// A type without a serialization annotation is a usage error and is not
/// cached. A type with zero members yields a cached schema with
/// [`Dispatch::Invalid`].
///
/// # Errors
/// Returns `EncoderError::Schema` if the declaration is unusable.
pub fn resolve<T: Model>() -> Result<Arc<Schema<T>>> {
    let id = TypeId::of::<T>();
    if let Some(entry) = SCHEMAS.get(&id) {
        return downcast(entry.value().clone());
    }

    // Build outside the map lock; a racing builder's result is dropped.
    let built: Arc<dyn Any + Send + Sync> = Arc::new(build::<T>()?);
    let cached = match SCHEMAS.entry(id) {
        Entry::Occupied(entry) => {
            log::trace!(
                "Schema for {} was built concurrently, keeping the cached one",
                std::any::type_name::<T>()
            );
            entry.get().clone()
        }
        Entry::Vacant(entry) => entry.insert(built).clone(),
    };
    downcast(cached)
}

pub(crate) fn is_cached<T: 'static>() -> bool {
    SCHEMAS.contains_key(&TypeId::of::<T>())
}
