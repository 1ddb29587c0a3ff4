//! Lazy, store-backed proxies.
//!
//! A proxy holds a store prefix and a type descriptor, never field values.
//! Every accessor is a fresh round trip: primitives are parsed on read and
//! formatted on write, nested entities, objects and lists come back as further
//! proxies. Accessors are chosen per property kind and checked against the
//! descriptor at call time, so asking for the wrong kind or type is an error
//! rather than a silent default.

mod entity;
mod list;
mod object;

pub use entity::EntityProxy;
pub use list::ListProxy;
pub use object::ObjectProxy;

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use kvmap_schema::keys::{entity_key_value, property_store_key};
use kvmap_schema::{Kind, Mapped, Property, Scalar, TypeDescriptor, Value};
use tracing::debug;

use crate::context::MappingCore;
use crate::error::{MapError, MapResult};
use crate::lock::CancelToken;
use crate::serializer::GraphSerializer;

/// What a proxy is bound to: a prefix, the descriptor of the type stored
/// there, and whether writes are allowed.
#[derive(Clone)]
pub struct Binding {
    core: Arc<MappingCore>,
    prefix: String,
    descriptor: Arc<TypeDescriptor>,
    read_only: bool,
    /// Textual key of an entity whose key is a primitive or string, read
    /// once when the proxy was opened.
    pinned_key: Option<String>,
}

/// A property resolved against a binding.
struct Slot {
    property: Property,
    is_key: bool,
    key: String,
}

impl Binding {
    pub(crate) fn new(
        core: Arc<MappingCore>,
        prefix: String,
        descriptor: Arc<TypeDescriptor>,
        read_only: bool,
        pinned_key: Option<String>,
    ) -> Self {
        Self {
            core,
            prefix,
            descriptor,
            read_only,
            pinned_key,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn core(&self) -> &Arc<MappingCore> {
        &self.core
    }

    pub(crate) fn to_read_only(&self) -> Self {
        Self {
            read_only: true,
            ..self.clone()
        }
    }

    fn slot(&self, name: &str) -> MapResult<Slot> {
        let (property, is_key) =
            self.descriptor
                .lookup(name)
                .ok_or_else(|| MapError::UnknownProperty {
                    type_name: self.descriptor.type_name(),
                    property: name.to_string(),
                })?;
        Ok(Slot {
            property: *property,
            is_key,
            key: property_store_key(&self.prefix, property.name),
        })
    }

    /// Resolve `name` and check that it is declared with type `V`.
    fn typed_slot<V: Mapped>(&self, name: &str) -> MapResult<Slot> {
        let slot = self.slot(name)?;
        if slot.property.ty.id() != V::storage_type().id() {
            return Err(MapError::TypeMismatch {
                property: name.to_string(),
                expected: slot.property.ty.name(),
                requested: type_name::<V>(),
            });
        }
        Ok(slot)
    }

    fn check_writable(&self, slot: &Slot) -> MapResult<()> {
        if self.read_only || slot.is_key {
            return Err(MapError::ReadOnlyViolation {
                key: self.prefix.clone(),
                property: slot.property.name.to_string(),
            });
        }
        Ok(())
    }

    fn get<V: Scalar>(&self, name: &str) -> MapResult<V> {
        let slot = self.typed_slot::<V>(name)?;
        expect_kind(&slot.property, Kind::Primitive)?;
        if slot.is_key {
            if let Some(pinned) = &self.pinned_key {
                return parse_scalar(&slot.key, pinned.clone());
            }
        }
        read_scalar(&self.core, &slot.key)
    }

    fn get_string(&self, name: &str) -> MapResult<Option<String>> {
        let slot = self.slot(name)?;
        expect_kind(&slot.property, Kind::String)?;
        if slot.is_key && self.pinned_key.is_some() {
            return Ok(self.pinned_key.clone());
        }
        Ok(self.core.store.get(&slot.key)?)
    }

    fn get_entity<E: Mapped>(&self, name: &str) -> MapResult<Option<EntityProxy<E>>> {
        let slot = self.typed_slot::<E>(name)?;
        expect_kind(&slot.property, Kind::Entity)?;
        let descriptor = self.core.registry.resolve_handle(slot.property.ty)?;
        read_reference(&self.core, descriptor, &slot.key, self.read_only)
    }

    fn get_object<O: Mapped>(&self, name: &str) -> MapResult<Option<ObjectProxy<O>>> {
        let slot = self.typed_slot::<O>(name)?;
        expect_kind(&slot.property, Kind::Object)?;
        let descriptor = self.core.registry.resolve_handle(slot.property.ty)?;
        ObjectProxy::open(&self.core, descriptor, slot.key, self.read_only || slot.is_key)
    }

    fn get_list<E: Mapped>(&self, name: &str) -> MapResult<Option<ListProxy<E>>> {
        let slot = self.slot(name)?;
        expect_kind(&slot.property, Kind::List)?;
        let list = self.core.registry.resolve_handle(slot.property.ty)?;
        let element = self.core.registry.element_of(&list)?;
        if element.type_id() != E::storage_type().id() {
            return Err(MapError::TypeMismatch {
                property: name.to_string(),
                expected: element.type_name(),
                requested: type_name::<E>(),
            });
        }
        ListProxy::open(&self.core, element, slot.key, self.read_only)
    }

    fn set<V: Mapped>(&self, name: &str, value: &V) -> MapResult<()> {
        let slot = self.typed_slot::<V>(name)?;
        self.check_writable(&slot)?;
        let descriptor = self.core.registry.resolve_handle(slot.property.ty)?;
        if slot.property.kind == Kind::List {
            // Whole-list replacement rewrites the count; hold the list lock.
            let _guard = self.core.locks.acquire(&slot.key, &CancelToken::new())?;
            return write_value(&self.core, &slot.key, descriptor, value.value());
        }
        write_value(&self.core, &slot.key, descriptor, value.value())
    }

    fn set_string(&self, name: &str, value: Option<&str>) -> MapResult<()> {
        let slot = self.slot(name)?;
        expect_kind(&slot.property, Kind::String)?;
        self.check_writable(&slot)?;
        match value {
            Some(text) => self.core.store.set(&slot.key, text)?,
            None => {
                self.core.store.delete(&slot.key)?;
            }
        }
        Ok(())
    }

    fn set_entity<E: Mapped>(&self, name: &str, target: &EntityProxy<E>) -> MapResult<()> {
        let slot = self.typed_slot::<E>(name)?;
        expect_kind(&slot.property, Kind::Entity)?;
        self.check_writable(&slot)?;
        // Already store-backed: only the reference is written.
        self.core.store.set(&slot.key, target.key_value())?;
        Ok(())
    }

    fn clear(&self, name: &str) -> MapResult<()> {
        let slot = self.slot(name)?;
        self.check_writable(&slot)?;
        self.core.store.delete(&slot.key)?;
        Ok(())
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("prefix", &self.prefix)
            .field("type", &self.descriptor.display_name)
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// Named-property access shared by entity and object proxies.
pub trait Proxy {
    fn binding(&self) -> &Binding;

    /// Store prefix every property key is built from.
    fn prefix(&self) -> &str {
        self.binding().prefix()
    }

    fn is_read_only(&self) -> bool {
        self.binding().is_read_only()
    }

    /// Read a primitive property; an absent record reads as `V::default()`.
    fn get<V: Scalar>(&self, name: &str) -> MapResult<V> {
        self.binding().get(name)
    }

    /// Read a string property; `None` if absent.
    fn get_string(&self, name: &str) -> MapResult<Option<String>> {
        self.binding().get_string(name)
    }

    /// Follow an entity reference.
    ///
    /// `None` if the reference is unset or its target no longer exists.
    fn get_entity<E: Mapped>(&self, name: &str) -> MapResult<Option<EntityProxy<E>>> {
        self.binding().get_entity(name)
    }

    fn get_object<O: Mapped>(&self, name: &str) -> MapResult<Option<ObjectProxy<O>>> {
        self.binding().get_object(name)
    }

    /// Open a list property whose elements are `E`.
    fn get_list<E: Mapped>(&self, name: &str) -> MapResult<Option<ListProxy<E>>> {
        self.binding().get_list(name)
    }

    /// Write a concrete value into a property.
    ///
    /// Entities are cascade-saved and then referenced, objects and lists are
    /// serialized under the property's key. A null value deletes the
    /// property record.
    fn set<V: Mapped>(&self, name: &str, value: &V) -> MapResult<()> {
        self.binding().set(name, value)
    }

    fn set_string(&self, name: &str, value: Option<&str>) -> MapResult<()> {
        self.binding().set_string(name, value)
    }

    /// Point an entity property at an existing, store-backed entity.
    fn set_entity<E: Mapped>(&self, name: &str, target: &EntityProxy<E>) -> MapResult<()> {
        self.binding().set_entity(name, target)
    }

    /// Make a property logically null by deleting its record.
    fn clear(&self, name: &str) -> MapResult<()> {
        self.binding().clear(name)
    }
}

fn expect_kind(property: &Property, expected: Kind) -> MapResult<()> {
    if property.kind != expected {
        return Err(MapError::KindMismatch {
            type_name: property.ty.name(),
            expected,
            actual: property.kind,
        });
    }
    Ok(())
}

fn expect_descriptor_kind(descriptor: &TypeDescriptor, expected: Kind) -> MapResult<()> {
    if descriptor.kind != expected {
        return Err(MapError::KindMismatch {
            type_name: descriptor.type_name(),
            expected,
            actual: descriptor.kind,
        });
    }
    Ok(())
}

fn parse_scalar<V: Scalar>(key: &str, text: String) -> MapResult<V> {
    V::parse_text(&text).ok_or_else(|| MapError::Parse {
        key: key.to_string(),
        value: text,
        target: type_name::<V>(),
    })
}

fn read_scalar<V: Scalar>(core: &MappingCore, key: &str) -> MapResult<V> {
    match core.store.get(key)? {
        Some(text) => parse_scalar(key, text),
        None => Ok(V::default()),
    }
}

fn read_reference<E>(
    core: &Arc<MappingCore>,
    descriptor: Arc<TypeDescriptor>,
    key: &str,
    read_only: bool,
) -> MapResult<Option<EntityProxy<E>>> {
    match core.store.get(key)? {
        Some(reference) => EntityProxy::open(core, descriptor, &reference, read_only),
        None => Ok(None),
    }
}

/// Serialize `value` at `key` and commit it; a null value deletes `key`.
///
/// A concrete entity is committed at its own key first; the reference at
/// `key` is only written once that batch has gone through.
fn write_value(
    core: &MappingCore,
    key: &str,
    descriptor: Arc<TypeDescriptor>,
    value: Value<'_>,
) -> MapResult<()> {
    if value.is_null() {
        core.store.delete(key)?;
        return Ok(());
    }
    if descriptor.kind == Kind::Entity {
        let reference = save_referenced(core, descriptor, value)?;
        core.store.set(key, &reference)?;
        return Ok(());
    }
    let mut serializer = GraphSerializer::new(&core.registry);
    serializer.at(key, descriptor, value)?;
    let records = serializer.finish();
    debug!(key = %key, records = records.len(), "writing property");
    core.commit(&records)
}

/// Cascade-save a concrete entity under its own store key and return the
/// key value a reference to it holds.
fn save_referenced(
    core: &MappingCore,
    descriptor: Arc<TypeDescriptor>,
    value: Value<'_>,
) -> MapResult<String> {
    let record = match value {
        Value::Record(record) => record,
        other => {
            return Err(MapError::ShapeMismatch {
                key: descriptor.display_name.to_string(),
                kind: descriptor.kind,
                found: other.describe(),
            })
        }
    };
    let reference = entity_key_value(&descriptor, record)?;
    let mut serializer = GraphSerializer::new(&core.registry);
    let store_key = serializer.entity(descriptor, Value::Record(record))?;
    let records = serializer.finish();
    debug!(key = %store_key, records = records.len(), "cascading entity");
    core.commit(&records)?;
    Ok(reference)
}
