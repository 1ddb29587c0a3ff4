//! The graph serializer: flattens an object graph into an ordered batch of
//! [`StoreRecord`]s.
//!
//! Traversal is depth-first over an explicit stack, so graph depth is bounded
//! by memory rather than by call depth. Entities are expanded once per pass,
//! deduplicated by store key, which makes cycles through entities safe.
//! Identity-less objects cannot be deduplicated; an object that reappears
//! among its own ancestors fails the whole pass before anything is written.

use std::any::TypeId;
use std::collections::HashSet;
use std::sync::Arc;

use kvmap_schema::keys::{element_store_key, entity_key_value, entity_store_key, property_store_key};
use kvmap_schema::{Kind, Record, TypeDescriptor, TypeRegistry, Value};
use kvmap_store::StoreRecord;

use crate::error::{MapError, MapResult};

/// Address of a record plus its type, so a struct and its first field
/// (which share an address) are never confused.
type Identity = (usize, TypeId);

struct Frame<'v> {
    descriptor: Arc<TypeDescriptor>,
    key: String,
    /// The frame is reached through a property or list slot, so an entity
    /// here is written as a reference at `key`.
    edge: bool,
    value: Value<'v>,
    depth: usize,
}

/// Builds one batch of records. A single serializer shares its visited set
/// across every call, so entities reached from several roots are still
/// written once.
pub struct GraphSerializer<'r> {
    registry: &'r TypeRegistry,
    visited: HashSet<String>,
    records: Vec<StoreRecord>,
}

impl<'r> GraphSerializer<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            visited: HashSet::new(),
            records: Vec::new(),
        }
    }

    /// Serialize an entity as a root and return its store key.
    pub fn entity(&mut self, descriptor: Arc<TypeDescriptor>, value: Value<'_>) -> MapResult<String> {
        if !descriptor.is_entity() {
            return Err(MapError::NotAnEntityType {
                type_name: descriptor.type_name(),
                kind: descriptor.kind,
            });
        }
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
        let key_value = entity_key_value(&descriptor, record)?;
        let store_key = entity_store_key(&descriptor, &key_value);
        self.walk(Frame {
            descriptor,
            key: store_key.clone(),
            edge: false,
            value: Value::Record(record),
            depth: 0,
        })?;
        Ok(store_key)
    }

    /// Serialize `value` as the content of the property record at `key`.
    ///
    /// An entity value becomes a reference at `key` followed by its own
    /// expansion; every other kind is written under `key` directly. A null
    /// value produces nothing.
    pub fn at(&mut self, key: &str, descriptor: Arc<TypeDescriptor>, value: Value<'_>) -> MapResult<()> {
        self.walk(Frame {
            descriptor,
            key: key.to_string(),
            edge: true,
            value,
            depth: 0,
        })
    }

    /// Records produced so far, in traversal order.
    pub fn records(&self) -> &[StoreRecord] {
        &self.records
    }

    pub fn finish(self) -> Vec<StoreRecord> {
        self.records
    }

    fn walk<'v>(&mut self, root: Frame<'v>) -> MapResult<()> {
        let mut stack = vec![root];
        let mut path: Vec<Option<Identity>> = Vec::new();

        while let Some(frame) = stack.pop() {
            path.truncate(frame.depth);
            let Frame {
                descriptor,
                key,
                edge,
                value,
                depth,
            } = frame;
            if value.is_null() {
                continue;
            }

            match descriptor.kind {
                Kind::Primitive | Kind::String => {
                    let text = value.as_text().ok_or_else(|| MapError::ShapeMismatch {
                        key: key.clone(),
                        kind: descriptor.kind,
                        found: value.describe(),
                    })?;
                    self.records.push(StoreRecord::write(key, text));
                }
                Kind::Entity => {
                    let record = expect_record(&descriptor, &key, &value)?;
                    let store_key = if edge {
                        let key_value = entity_key_value(&descriptor, record)?;
                        let store_key = entity_store_key(&descriptor, &key_value);
                        self.records.push(StoreRecord::write(key, key_value));
                        store_key
                    } else {
                        key
                    };
                    if !self.visited.insert(store_key.clone()) {
                        continue;
                    }
                    self.records.push(StoreRecord::marker(store_key.clone()));
                    path.push(Some(identity(record, &descriptor)));
                    self.push_properties(&mut stack, &descriptor, &store_key, record, depth + 1)?;
                }
                Kind::Object => {
                    let record = expect_record(&descriptor, &key, &value)?;
                    let me = identity(record, &descriptor);
                    if path.iter().flatten().any(|ancestor| *ancestor == me) {
                        return Err(MapError::CircularObjectReference {
                            key,
                            type_name: descriptor.type_name(),
                        });
                    }
                    self.records.push(StoreRecord::marker(key.clone()));
                    path.push(Some(me));
                    self.push_properties(&mut stack, &descriptor, &key, record, depth + 1)?;
                }
                Kind::List => {
                    let items = match value {
                        Value::List(items) => items,
                        other => {
                            return Err(MapError::ShapeMismatch {
                                key,
                                kind: descriptor.kind,
                                found: other.describe(),
                            })
                        }
                    };
                    let element = self.registry.element_of(&descriptor)?;
                    self.records
                        .push(StoreRecord::write(key.clone(), items.len().to_string()));
                    path.push(None);
                    let frames: Vec<Frame<'v>> = items
                        .into_iter()
                        .enumerate()
                        .map(|(index, item)| Frame {
                            descriptor: Arc::clone(&element),
                            key: element_store_key(&key, index),
                            edge: true,
                            value: item,
                            depth: depth + 1,
                        })
                        .collect();
                    stack.extend(frames.into_iter().rev());
                }
            }
        }
        Ok(())
    }

    /// Push one frame per property, key property first, so they pop in
    /// declaration order.
    fn push_properties<'v>(
        &self,
        stack: &mut Vec<Frame<'v>>,
        descriptor: &TypeDescriptor,
        prefix: &str,
        record: &'v dyn Record,
        depth: usize,
    ) -> MapResult<()> {
        let mut frames = Vec::with_capacity(descriptor.properties.len() + 1);
        for property in descriptor.all_properties() {
            frames.push(Frame {
                descriptor: self.registry.resolve_handle(property.ty)?,
                key: property_store_key(prefix, property.name),
                edge: true,
                value: record.field(property.name),
                depth,
            });
        }
        stack.extend(frames.into_iter().rev());
        Ok(())
    }
}

fn expect_record<'v>(
    descriptor: &TypeDescriptor,
    key: &str,
    value: &Value<'v>,
) -> MapResult<&'v dyn Record> {
    match value {
        Value::Record(record) => Ok(*record),
        other => Err(MapError::ShapeMismatch {
            key: key.to_string(),
            kind: descriptor.kind,
            found: other.describe(),
        }),
    }
}

fn identity(record: &dyn Record, descriptor: &TypeDescriptor) -> Identity {
    (
        record as *const dyn Record as *const () as usize,
        descriptor.type_id(),
    )
}
