//! Removal planning over stored data.
//!
//! Removing an entity by key has no in-memory value to traverse, so the sweep
//! walks what is actually in the store instead: existence markers say whether
//! an entity or object is present, list counts give the element range, and
//! reference records lead to further entities. The result is the set of keys
//! a save of the same graph would have written, as delete records.

use std::collections::HashSet;
use std::sync::Arc;

use kvmap_schema::keys::{element_store_key, entity_store_key, property_store_key};
use kvmap_schema::{Kind, TypeDescriptor, TypeRegistry};
use kvmap_store::{KeyValueStore, StoreRecord};
use tracing::trace;

use crate::error::{MapError, MapResult};

struct Visit {
    descriptor: Arc<TypeDescriptor>,
    key: String,
    edge: bool,
}

/// Plan the deletion of the entity stored at `store_key`.
///
/// Returns an empty plan if the entity's existence marker is absent.
pub fn plan_entity_removal(
    store: &dyn KeyValueStore,
    registry: &TypeRegistry,
    descriptor: Arc<TypeDescriptor>,
    store_key: &str,
) -> MapResult<Vec<StoreRecord>> {
    if !store.exists(store_key)? {
        return Ok(Vec::new());
    }
    let mut plan = Vec::new();
    let mut expanded: HashSet<String> = HashSet::new();
    let mut stack = vec![Visit {
        descriptor,
        key: store_key.to_string(),
        edge: false,
    }];

    while let Some(Visit {
        descriptor,
        key,
        edge,
    }) = stack.pop()
    {
        match descriptor.kind {
            Kind::Primitive | Kind::String => {
                if store.exists(&key)? {
                    plan.push(StoreRecord::delete(key));
                }
            }
            Kind::Entity => {
                let entity_key = if edge {
                    let Some(reference) = store.get(&key)? else {
                        continue;
                    };
                    plan.push(StoreRecord::delete(key));
                    entity_store_key(&descriptor, &reference)
                } else {
                    key
                };
                if expanded.contains(&entity_key) || !store.exists(&entity_key)? {
                    continue;
                }
                expanded.insert(entity_key.clone());
                trace!(key = %entity_key, "sweeping entity");
                plan.push(StoreRecord::delete(entity_key.clone()));
                push_properties(&mut stack, registry, &descriptor, &entity_key)?;
            }
            Kind::Object => {
                if !store.exists(&key)? {
                    continue;
                }
                plan.push(StoreRecord::delete(key.clone()));
                push_properties(&mut stack, registry, &descriptor, &key)?;
            }
            Kind::List => {
                let Some(count) = stored_count(store, &key)? else {
                    continue;
                };
                let element = registry.element_of(&descriptor)?;
                plan.push(StoreRecord::delete(key.clone()));
                for index in (0..count).rev() {
                    stack.push(Visit {
                        descriptor: Arc::clone(&element),
                        key: element_store_key(&key, index),
                        edge: true,
                    });
                }
            }
        }
    }
    Ok(plan)
}

/// Read the count record of a list, if present.
pub(crate) fn stored_count(store: &dyn KeyValueStore, key: &str) -> MapResult<Option<usize>> {
    match store.get(key)? {
        Some(text) => text.parse().map(Some).map_err(|_| MapError::Parse {
            key: key.to_string(),
            value: text,
            target: "usize",
        }),
        None => Ok(None),
    }
}

fn push_properties(
    stack: &mut Vec<Visit>,
    registry: &TypeRegistry,
    descriptor: &TypeDescriptor,
    prefix: &str,
) -> MapResult<()> {
    let mut visits = Vec::new();
    for property in descriptor.all_properties() {
        visits.push(Visit {
            descriptor: registry.resolve_handle(property.ty)?,
            key: property_store_key(prefix, property.name),
            edge: true,
        });
    }
    stack.extend(visits.into_iter().rev());
    Ok(())
}
