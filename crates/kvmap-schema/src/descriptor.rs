use std::any::TypeId;
use std::fmt;

use crate::shape::{Shape, TypeHandle};

/// Storage classification of a type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Primitive,
    String,
    Entity,
    Object,
    List,
}

impl Kind {
    /// Classify a shape. Records with a key marker are entities; how many
    /// markers they carry is checked at registration.
    pub fn of(shape: &Shape) -> Kind {
        match shape {
            Shape::Primitive => Kind::Primitive,
            Shape::String => Kind::String,
            Shape::List { .. } | Shape::Array { .. } => Kind::List,
            Shape::Record(record) => {
                if record.fields().iter().any(|f| f.key) {
                    Kind::Entity
                } else {
                    Kind::Object
                }
            }
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Primitive => "primitive",
            Kind::String => "string",
            Kind::Entity => "entity",
            Kind::Object => "object",
            Kind::List => "list",
        };
        f.write_str(name)
    }
}

/// How an entity's key value is turned into text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyMode {
    /// Textual form of a scalar or string key.
    Display,
    /// The key record's [`CustomKey`](crate::CustomKey) capability.
    Custom,
}

/// A persistable property of a record.
#[derive(Clone, Copy, Debug)]
pub struct Property {
    pub name: &'static str,
    pub ty: TypeHandle,
    /// Kind of `ty`, fixed when the owning type is registered.
    pub kind: Kind,
}

#[derive(Clone, Copy, Debug)]
pub struct EntityKey {
    pub property: Property,
    pub mode: KeyMode,
}

/// Memoized storage description of one type.
#[derive(Clone, Debug)]
pub struct TypeDescriptor {
    pub handle: TypeHandle,
    pub kind: Kind,
    /// Prefix of entity store keys. Records use their declared name.
    pub display_name: &'static str,
    /// Persistable properties in declaration order, key property excluded.
    pub properties: Vec<Property>,
    pub key: Option<EntityKey>,
    /// Element type of a list.
    pub element: Option<TypeHandle>,
    /// Declared as a fixed-size array rather than a growable list.
    pub raw_array: bool,
}

impl TypeDescriptor {
    pub fn type_id(&self) -> TypeId {
        self.handle.id()
    }

    pub fn type_name(&self) -> &'static str {
        self.handle.name()
    }

    pub fn is_entity(&self) -> bool {
        self.kind == Kind::Entity
    }

    /// Look up a property by name, including the key property.
    ///
    /// The flag is `true` when the match is the entity key.
    pub fn lookup(&self, name: &str) -> Option<(&Property, bool)> {
        if let Some(key) = &self.key {
            if key.property.name == name {
                return Some((&key.property, true));
            }
        }
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| (p, false))
    }

    /// Key property first, then the other properties in declaration order.
    pub fn all_properties(&self) -> impl Iterator<Item = &Property> {
        self.key
            .iter()
            .map(|k| &k.property)
            .chain(self.properties.iter())
    }

    /// Types that must be registered alongside this one.
    pub(crate) fn dependencies(&self) -> Vec<TypeHandle> {
        self.all_properties()
            .map(|p| p.ty)
            .chain(self.element)
            .collect()
    }
}
