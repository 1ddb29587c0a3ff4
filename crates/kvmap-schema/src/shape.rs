//! Static shape description and runtime value views.
//!
//! [`Mapped`] is the single entry point: `shape()` says how a type is laid out
//! in the store, `value()` exposes an instance for the serializer. Records
//! (structs) additionally implement [`Record`] so fields can be read by name.

use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A type that can be mapped onto the key-value store.
///
/// Wrapper types (`Option`, `Box`, `Arc`, `OnceLock`) are transparent: they
/// report the wrapped type's [`storage_type`](Mapped::storage_type), so the
/// registry only ever sees the inner type.
pub trait Mapped: 'static {
    /// Static description of this type's stored layout.
    fn shape() -> Shape
    where
        Self: Sized;

    /// Handle of the type whose descriptor governs storage of `Self`.
    fn storage_type() -> TypeHandle
    where
        Self: Sized,
    {
        TypeHandle::of::<Self>()
    }

    /// Borrowed view of this value for serialization.
    fn value(&self) -> Value<'_>;
}

/// Field-by-name access to a record instance.
pub trait Record {
    /// Value of the property named `name`, or [`Value::Null`] if unset.
    fn field(&self, name: &str) -> Value<'_>;

    /// The custom key capability, for records used as entity keys.
    fn key_capability(&self) -> Option<&dyn CustomKey> {
        None
    }
}

/// Custom key extraction for non-scalar entity keys.
pub trait CustomKey {
    /// Textual key used to address the owning entity.
    fn custom_key(&self) -> String;
}

/// Type identity plus a pointer to its shape function.
#[derive(Clone, Copy)]
pub struct TypeHandle {
    id: TypeId,
    name: &'static str,
    shape: fn() -> Shape,
}

impl TypeHandle {
    pub fn of<T: Mapped>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            shape: T::shape,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn shape(&self) -> Shape {
        (self.shape)()
    }
}

impl PartialEq for TypeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeHandle {}

impl Hash for TypeHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHandle({})", self.name)
    }
}

/// How a type is laid out in the store.
#[derive(Clone, Debug)]
pub enum Shape {
    Primitive,
    String,
    /// Growable ordered collection.
    List { element: TypeHandle },
    /// Fixed-size array; only valid nested inside a property.
    Array { element: TypeHandle },
    Record(RecordShape),
}

/// Property list of a struct, in declaration order.
#[derive(Clone, Debug)]
pub struct RecordShape {
    name: &'static str,
    fields: Vec<FieldShape>,
}

#[derive(Clone, Copy, Debug)]
pub struct FieldShape {
    pub name: &'static str,
    pub ty: TypeHandle,
    /// Carries the entity key marker.
    pub key: bool,
}

impl RecordShape {
    /// Start a record named `name`; the name prefixes entity store keys.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
        }
    }

    /// Add a persistable property.
    pub fn field<T: Mapped>(mut self, name: &'static str) -> Self {
        self.fields.push(FieldShape {
            name,
            ty: T::storage_type(),
            key: false,
        });
        self
    }

    /// Add the property marked as the entity key.
    pub fn key<T: Mapped>(mut self, name: &'static str) -> Self {
        self.fields.push(FieldShape {
            name,
            ty: T::storage_type(),
            key: true,
        });
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[FieldShape] {
        &self.fields
    }
}

impl From<RecordShape> for Shape {
    fn from(record: RecordShape) -> Self {
        Shape::Record(record)
    }
}

/// Borrowed runtime view of a value being serialized.
pub enum Value<'a> {
    /// Absent; nothing is written.
    Null,
    /// Textual form of a scalar.
    Primitive(String),
    Text(&'a str),
    Record(&'a dyn Record),
    List(Vec<Value<'a>>),
}

impl<'a> Value<'a> {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text of a scalar or string value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Primitive(text) => Some(text),
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Short name of the variant, for diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Primitive(_) => "primitive",
            Value::Text(_) => "string",
            Value::Record(_) => "record",
            Value::List(_) => "list",
        }
    }
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Primitive(text) => f.debug_tuple("Primitive").field(text).finish(),
            Value::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Value::Record(_) => f.write_str("Record(..)"),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
        }
    }
}
