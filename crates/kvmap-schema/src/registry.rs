//! The type registry: classifies and memoizes [`TypeDescriptor`]s.
//!
//! A registry is an ordinary value owned by whoever builds the mapping
//! context; there is no global instance. Descriptors are created on first
//! encounter and kept for the registry's lifetime.
//!
//! # Registration
//!
//! Resolving a type registers it together with every type reachable through
//! its properties and list elements. Registration of that closure is
//! all-or-nothing: descriptors are built into a pending set, every entity key
//! in the set is validated, and only then is the set published.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::descriptor::{EntityKey, KeyMode, Kind, Property, TypeDescriptor};
use crate::error::{SchemaError, SchemaResult};
use crate::shape::{FieldShape, Mapped, Shape, TypeHandle};

/// Process-scoped cache of type descriptors.
pub struct TypeRegistry {
    types: RwLock<HashMap<TypeId, Arc<TypeDescriptor>>>,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve `T` as a storable root.
    ///
    /// Raw fixed-size arrays are rejected here; nested inside a property they
    /// are accepted as lists.
    pub fn resolve<T: Mapped>(&self) -> SchemaResult<Arc<TypeDescriptor>> {
        let descriptor = self.resolve_handle(T::storage_type())?;
        if descriptor.raw_array {
            return Err(SchemaError::UnsupportedContainerAsRoot {
                type_name: descriptor.type_name(),
            });
        }
        Ok(descriptor)
    }

    /// Resolve a type reached through a property or list element.
    pub fn resolve_handle(&self, handle: TypeHandle) -> SchemaResult<Arc<TypeDescriptor>> {
        if let Some(found) = self.get(handle.id()) {
            return Ok(found);
        }
        self.register(handle)
    }

    /// Descriptor of an already registered type.
    pub fn get(&self, id: TypeId) -> Option<Arc<TypeDescriptor>> {
        self.types
            .read()
            .expect("registry lock poisoned")
            .get(&id)
            .cloned()
    }

    /// Descriptor of the element type of a list descriptor.
    pub fn element_of(&self, list: &TypeDescriptor) -> SchemaResult<Arc<TypeDescriptor>> {
        let element = list.element.ok_or(SchemaError::NotAList {
            type_name: list.type_name(),
        })?;
        self.resolve_handle(element)
    }

    /// Returns `true` if `T` has been registered.
    pub fn contains<T: Mapped>(&self) -> bool {
        self.get(T::storage_type().id()).is_some()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn register(&self, root: TypeHandle) -> SchemaResult<Arc<TypeDescriptor>> {
        let root_descriptor = build_descriptor(root)?;
        let mut pending: HashMap<TypeId, TypeDescriptor> = HashMap::new();
        {
            let known = self.types.read().expect("registry lock poisoned");
            let mut stack = root_descriptor.dependencies();
            while let Some(handle) = stack.pop() {
                let id = handle.id();
                if id == root.id() || known.contains_key(&id) || pending.contains_key(&id) {
                    continue;
                }
                let descriptor = build_descriptor(handle)?;
                stack.extend(descriptor.dependencies());
                pending.insert(id, descriptor);
            }

            let view = View {
                root: &root_descriptor,
                known: &*known,
                pending: &pending,
            };
            for descriptor in std::iter::once(&root_descriptor).chain(pending.values()) {
                if let Some(key) = &descriptor.key {
                    check_key_safety(descriptor, key, &view)?;
                }
            }
        }

        let registered = pending.len() + 1;
        let mut types = self.types.write().expect("registry lock poisoned");
        for (id, descriptor) in pending {
            // Another thread may have published the same type meanwhile.
            types.entry(id).or_insert_with(|| Arc::new(descriptor));
        }
        let published = types
            .entry(root.id())
            .or_insert_with(|| Arc::new(root_descriptor))
            .clone();
        debug!(root = root.name(), registered, "registered types");
        Ok(published)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("type_count", &self.len())
            .finish()
    }
}

/// Lookup across published and pending descriptors.
struct View<'a> {
    root: &'a TypeDescriptor,
    known: &'a HashMap<TypeId, Arc<TypeDescriptor>>,
    pending: &'a HashMap<TypeId, TypeDescriptor>,
}

impl<'a> View<'a> {
    fn get(&self, id: TypeId) -> Option<&'a TypeDescriptor> {
        if id == self.root.type_id() {
            return Some(self.root);
        }
        self.pending
            .get(&id)
            .or_else(|| self.known.get(&id).map(|arc| arc.as_ref()))
    }
}

fn build_descriptor(handle: TypeHandle) -> SchemaResult<TypeDescriptor> {
    let shape = handle.shape();
    let mut descriptor = TypeDescriptor {
        handle,
        kind: Kind::of(&shape),
        display_name: handle.name(),
        properties: Vec::new(),
        key: None,
        element: None,
        raw_array: false,
    };

    match shape {
        Shape::Primitive | Shape::String => {}
        Shape::List { element } => descriptor.element = Some(element),
        Shape::Array { element } => {
            descriptor.element = Some(element);
            descriptor.raw_array = true;
        }
        Shape::Record(record) => {
            let markers: Vec<&FieldShape> = record.fields().iter().filter(|f| f.key).collect();
            if markers.len() > 1 {
                return Err(SchemaError::DuplicateKeyMarker {
                    type_name: record.name(),
                    fields: markers.iter().map(|f| f.name).collect(),
                });
            }
            descriptor.display_name = record.name();
            for field in record.fields() {
                let property = Property {
                    name: field.name,
                    ty: field.ty,
                    kind: Kind::of(&field.ty.shape()),
                };
                if field.key {
                    let mode = match property.kind {
                        Kind::Object => KeyMode::Custom,
                        _ => KeyMode::Display,
                    };
                    descriptor.key = Some(EntityKey { property, mode });
                } else {
                    descriptor.properties.push(property);
                }
            }
        }
    }
    Ok(descriptor)
}

/// Walk the key property's type as key material.
///
/// Scalars and strings are always allowed, objects only if all their
/// properties are, entities never, lists not at all.
fn check_key_safety(entity: &TypeDescriptor, key: &EntityKey, view: &View<'_>) -> SchemaResult<()> {
    let mut stack = vec![key.property.ty];
    let mut seen = HashSet::new();
    while let Some(handle) = stack.pop() {
        if !seen.insert(handle.id()) {
            continue;
        }
        let Some(part) = view.get(handle.id()) else {
            continue;
        };
        match part.kind {
            Kind::Primitive | Kind::String => {}
            Kind::Object => stack.extend(part.properties.iter().map(|p| p.ty)),
            Kind::Entity => {
                return Err(SchemaError::InvalidEntityKeyType {
                    entity: entity.display_name,
                    key_type: part.type_name(),
                })
            }
            Kind::List => {
                return Err(SchemaError::UnsupportedKeyContainer {
                    entity: entity.display_name,
                    key_type: part.type_name(),
                })
            }
        }
    }
    Ok(())
}
