//! The mapping context: Find, Save and Remove over a key-value store.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use kvmap_schema::keys::entity_store_key;
use kvmap_schema::{Kind, Mapped, TypeDescriptor, TypeRegistry};
use kvmap_store::{KeyValueStore, StoreRecord};
use tracing::debug;

use crate::config::MapperConfig;
use crate::error::{MapError, MapResult};
use crate::lock::{CancelToken, LockGuard, LockManager};
use crate::proxy::{EntityProxy, ListProxy, ObjectProxy};
use crate::serializer::GraphSerializer;
use crate::sweep::plan_entity_removal;

/// State shared by a context and every proxy it hands out.
pub(crate) struct MappingCore {
    pub(crate) store: Arc<dyn KeyValueStore>,
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) locks: LockManager,
}

impl MappingCore {
    /// Apply a batch. Not atomic: on failure a prefix of `records` may
    /// already be applied.
    pub(crate) fn commit(&self, records: &[StoreRecord]) -> MapResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        debug!(records = records.len(), "committing batch");
        self.store.execute_batch(records)?;
        Ok(())
    }
}

/// Entry point for mapping object graphs onto a [`KeyValueStore`].
///
/// Cloning is cheap; clones share the store, the registry and the lock
/// configuration.
///
/// ```rust,ignore
/// let ctx = MappingContext::new(Arc::new(InMemoryStore::new()));
/// ctx.save(&person)?;
/// let found = ctx.find::<Person>("1")?.expect("saved above");
/// assert_eq!(found.get::<i32>("Age")?, 27);
/// ```
#[derive(Clone)]
pub struct MappingContext {
    core: Arc<MappingCore>,
}

impl MappingContext {
    /// A context with a fresh registry and default configuration.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_config(store, Arc::new(TypeRegistry::new()), MapperConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn KeyValueStore>,
        registry: Arc<TypeRegistry>,
        config: MapperConfig,
    ) -> Self {
        let locks = LockManager::new(Arc::clone(&store), config.lock);
        Self {
            core: Arc::new(MappingCore {
                store,
                registry,
                locks,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.core.registry
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.core.store
    }

    /// Open the entity `T` whose key value is `key`.
    ///
    /// Returns `Ok(None)` if no such entity is stored.
    pub fn find<T: Mapped>(&self, key: &str) -> MapResult<Option<EntityProxy<T>>> {
        self.open_entity(key, false)
    }

    /// Like [`find`](Self::find), but every setter of the returned proxy and
    /// its nested proxies fails with [`MapError::ReadOnlyViolation`].
    pub fn find_read_only<T: Mapped>(&self, key: &str) -> MapResult<Option<EntityProxy<T>>> {
        self.open_entity(key, true)
    }

    /// Save the whole graph rooted at `value` and return the root's store key.
    ///
    /// The batch is not atomic across keys: if the store fails part-way, a
    /// prefix of the records has been applied.
    pub fn save<T: Mapped>(&self, value: &T) -> MapResult<String> {
        let descriptor = self.entity_descriptor::<T>()?;
        let mut serializer = GraphSerializer::new(&self.core.registry);
        let store_key = serializer.entity(descriptor, value.value())?;
        let records = serializer.finish();
        self.core.commit(&records)?;
        debug!(key = %store_key, records = records.len(), "saved entity");
        Ok(store_key)
    }

    /// Delete everything a save of the entity stored under `key` would have
    /// written, including the entities it references.
    ///
    /// Returns the number of deleted keys; a missing entity is a no-op.
    pub fn remove<T: Mapped>(&self, key: &str) -> MapResult<usize> {
        let descriptor = self.entity_descriptor::<T>()?;
        let store_key = entity_store_key(&descriptor, key);
        let plan = plan_entity_removal(
            self.core.store.as_ref(),
            &self.core.registry,
            descriptor,
            &store_key,
        )?;
        self.core.commit(&plan)?;
        debug!(key = %store_key, records = plan.len(), "removed entity");
        Ok(plan.len())
    }

    /// Delete every key a save of `value` would write.
    ///
    /// Returns the number of deleted keys; keys that are not currently
    /// stored are skipped.
    pub fn remove_value<T: Mapped>(&self, value: &T) -> MapResult<usize> {
        let descriptor = self.entity_descriptor::<T>()?;
        let mut serializer = GraphSerializer::new(&self.core.registry);
        let store_key = serializer.entity(descriptor, value.value())?;
        let mut seen = HashSet::new();
        let mut plan = Vec::new();
        for record in serializer.finish() {
            if seen.insert(record.key.clone()) && self.core.store.exists(&record.key)? {
                plan.push(record.into_delete());
            }
        }
        self.core.commit(&plan)?;
        debug!(key = %store_key, records = plan.len(), "removed entity by value");
        Ok(plan.len())
    }

    /// Open the object `T` embedded at `prefix`.
    pub fn object_at<T: Mapped>(&self, prefix: &str, read_only: bool) -> MapResult<Option<ObjectProxy<T>>> {
        let descriptor = self.core.registry.resolve::<T>()?;
        if descriptor.kind != Kind::Object {
            return Err(MapError::KindMismatch {
                type_name: descriptor.type_name(),
                expected: Kind::Object,
                actual: descriptor.kind,
            });
        }
        ObjectProxy::open(&self.core, descriptor, prefix.to_string(), read_only)
    }

    /// Open the list of `E` stored at `key`.
    pub fn list_at<E: Mapped>(&self, key: &str, read_only: bool) -> MapResult<Option<ListProxy<E>>> {
        let element = self.core.registry.resolve_handle(E::storage_type())?;
        ListProxy::open(&self.core, element, key.to_string(), read_only)
    }

    /// Detach a proxy into a plain value.
    ///
    /// Always fails with [`MapError::NotImplemented`]; materialization has no
    /// defined contract yet.
    pub fn unpack<T: Mapped>(&self, _proxy: &EntityProxy<T>) -> MapResult<T> {
        Err(MapError::NotImplemented("unpack"))
    }

    /// Take the lease lock guarding the list at `list_key`.
    pub fn lock(&self, list_key: &str, cancel: &CancelToken) -> MapResult<LockGuard> {
        self.core.locks.acquire(list_key, cancel)
    }

    fn entity_descriptor<T: Mapped>(&self) -> MapResult<Arc<TypeDescriptor>> {
        let descriptor = self.core.registry.resolve::<T>()?;
        if !descriptor.is_entity() {
            return Err(MapError::NotAnEntityType {
                type_name: descriptor.type_name(),
                kind: descriptor.kind,
            });
        }
        Ok(descriptor)
    }

    fn open_entity<T: Mapped>(&self, key: &str, read_only: bool) -> MapResult<Option<EntityProxy<T>>> {
        let descriptor = self.entity_descriptor::<T>()?;
        EntityProxy::open(&self.core, descriptor, key, read_only)
    }
}

impl fmt::Debug for MappingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingContext")
            .field("registry", &self.core.registry)
            .field("locks", &self.core.locks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use crate::proxy::Proxy;
    use kvmap_schema::SchemaError;
    use kvmap_store::{InMemoryStore, JsonFileStore, StoreError};
    use proptest::prelude::*;

    fn context() -> (Arc<InMemoryStore>, MappingContext) {
        let store = Arc::new(InMemoryStore::new());
        (store.clone(), MappingContext::new(store))
    }

    // ---- Test 1: Save / Find ----

    #[test]
    fn person_scenario() {
        let (store, ctx) = context();
        let key = ctx.save(&blueve()).unwrap();
        assert_eq!(key, "Person1");

        let snapshot = store.snapshot();
        assert_eq!(snapshot["Person1"], "true");
        assert_eq!(snapshot["Person1Id"], "1");
        assert_eq!(snapshot["Person1Name"], "Blueve");
        assert_eq!(snapshot["Person1Age"], "27");
        assert_eq!(snapshot.len(), 4);

        let person = ctx.find::<Person>("1").unwrap().unwrap();
        assert_eq!(person.store_key(), "Person1");
        assert_eq!(person.get::<i32>("Age").unwrap(), 27);
    }

    #[test]
    fn find_missing_key_is_none() {
        let (_store, ctx) = context();
        assert!(ctx.find::<Person>("404").unwrap().is_none());
    }

    #[test]
    fn entity_api_rejects_non_entities() {
        let (_store, ctx) = context();
        assert!(matches!(
            ctx.find::<Address>("x").unwrap_err(),
            MapError::NotAnEntityType { kind: Kind::Object, .. }
        ));
        assert!(matches!(
            ctx.find::<i32>("1").unwrap_err(),
            MapError::NotAnEntityType { kind: Kind::Primitive, .. }
        ));
        let address = Address {
            street: "x".into(),
            city: None,
        };
        assert!(matches!(
            ctx.save(&address).unwrap_err(),
            MapError::NotAnEntityType { .. }
        ));
    }

    #[test]
    fn proxies_reflect_later_writes() {
        let (store, ctx) = context();
        ctx.save(&blueve()).unwrap();
        let person = ctx.find::<Person>("1").unwrap().unwrap();
        store.set("Person1Age", "30").unwrap();
        assert_eq!(person.get::<i32>("Age").unwrap(), 30);
    }

    #[test]
    fn custom_keyed_entity_is_found_by_custom_key() {
        let (store, ctx) = context();
        let shelf = Shelf {
            key: ShelfKey {
                aisle: "A".into(),
                slot: 1,
            },
            label: "nails".into(),
        };
        assert_eq!(ctx.save(&shelf).unwrap(), "ShelfA.1");
        let found = ctx.find::<Shelf>("A.1").unwrap().unwrap();
        assert_eq!(found.get_string("Label").unwrap().as_deref(), Some("nails"));
        assert!(store.exists("ShelfA.1KeyAisle").unwrap());
    }

    // ---- Test 2: Cycles ----

    #[test]
    fn entity_cycle_round_trips() {
        let (store, ctx) = context();
        let (a, _b) = node_cycle();
        ctx.save(&a).unwrap();
        assert_eq!(store.len(), 6);

        let a = ctx.find::<Node>("a").unwrap().unwrap();
        let b = a.get_entity::<Node>("Peer").unwrap().unwrap();
        let back = b.get_entity::<Node>("Peer").unwrap().unwrap();
        assert_eq!(b.key_value(), "b");
        assert_eq!(back.store_key(), "Nodea");
    }

    #[test]
    fn object_cycle_fails_without_writing() {
        let (store, ctx) = context();
        let err = ctx.save(&looped_chain()).unwrap_err();
        assert!(matches!(err, MapError::CircularObjectReference { .. }));
        assert!(store.is_empty());
    }

    // ---- Test 3: Known limitations ----

    #[test]
    fn known_ambiguous_keys_break_round_trip() {
        let (store, ctx) = context();
        let badge = Badge {
            id: "1".into(),
            tag: Some(Tag {
                line: "from tag".into(),
            }),
            tag_line: Some("own".into()),
        };
        ctx.save(&badge).unwrap();

        // Both properties landed on the same key; the later write won.
        assert_eq!(store.get("Badge1TagLine").unwrap().as_deref(), Some("own"));
        let found = ctx.find::<Badge>("1").unwrap().unwrap();
        let tag = found.get_object::<Tag>("Tag").unwrap().unwrap();
        assert_ne!(tag.get_string("Line").unwrap().as_deref(), Some("from tag"));
    }

    #[test]
    fn failed_batch_leaves_applied_prefix() {
        let store = Arc::new(FailingStore::new(2));
        let ctx = MappingContext::new(store.clone());
        let err = ctx.save(&blueve()).unwrap_err();
        assert!(matches!(err, MapError::Store(StoreError::Backend(_))));
        assert_eq!(store.inner.len(), 2);
        assert!(store.inner.exists("Person1").unwrap());
        assert!(store.inner.exists("Person1Id").unwrap());
        assert!(!store.inner.exists("Person1Age").unwrap());
    }

    #[test]
    fn unpack_is_not_implemented() {
        let (_store, ctx) = context();
        ctx.save(&blueve()).unwrap();
        let person = ctx.find::<Person>("1").unwrap().unwrap();
        assert!(matches!(
            ctx.unpack(&person),
            Err(MapError::NotImplemented("unpack"))
        ));
    }

    #[test]
    fn invalid_schema_surfaces_as_schema_error() {
        struct Owner {
            id: String,
        }
        kvmap_schema::mapped_record! {
            Owner as "Owner" {
                #[key] id: String => "Id",
            }
        }
        struct Deed {
            owner: Owner,
        }
        kvmap_schema::mapped_record! {
            Deed as "Deed" {
                #[key] owner: Owner => "Owner",
            }
        }
        let (_store, ctx) = context();
        let err = ctx.find::<Deed>("x").unwrap_err();
        assert!(matches!(
            err,
            MapError::Schema(SchemaError::InvalidEntityKeyType { .. })
        ));
    }

    // ---- Test 4: Remove ----

    #[test]
    fn remove_by_key_cascades_through_references() {
        let (store, ctx) = context();
        ctx.save(&team()).unwrap();
        let written = store.len();
        assert_eq!(ctx.remove::<Team>("7").unwrap(), written);
        assert!(store.is_empty());
        assert!(ctx.find::<Team>("7").unwrap().is_none());
    }

    #[test]
    fn remove_by_key_clears_nested_collections() {
        let (store, ctx) = context();
        ctx.save(&route()).unwrap();
        let route = ctx.find::<Route>("r1").unwrap().unwrap();
        let stops = route.get_list::<Address>("Stops").unwrap().unwrap();
        stops
            .push(&Address {
                street: "Pier".into(),
                city: None,
            })
            .unwrap();
        store.set("Other", "kept").unwrap();

        let written = store.len() - 1;
        assert_eq!(ctx.remove::<Route>("r1").unwrap(), written);
        assert_eq!(store.len(), 1);
        assert!(store.exists("Other").unwrap());
    }

    #[test]
    fn remove_missing_is_noop() {
        let (store, ctx) = context();
        ctx.save(&blueve()).unwrap();
        assert_eq!(ctx.remove::<Person>("2").unwrap(), 0);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn remove_by_value_deletes_saved_keys() {
        let (store, ctx) = context();
        ctx.save(&blueve()).unwrap();
        store.set("Other", "kept").unwrap();
        assert_eq!(ctx.remove_value(&blueve()).unwrap(), 4);
        assert_eq!(store.len(), 1);
        assert_eq!(ctx.remove_value(&blueve()).unwrap(), 0);
    }

    #[test]
    fn remove_by_value_counts_only_stored_keys() {
        let (store, ctx) = context();
        ctx.save(&blueve()).unwrap();
        store.delete("Person1Name").unwrap();
        assert_eq!(ctx.remove_value(&blueve()).unwrap(), 3);
        assert!(store.is_empty());
    }

    // ---- Test 5: Root proxies ----

    #[test]
    fn object_and_list_roots() {
        let (_store, ctx) = context();
        ctx.save(&team()).unwrap();

        let office = ctx.object_at::<Address>("Team7Office", false).unwrap().unwrap();
        assert_eq!(office.get_string("Street").unwrap().as_deref(), Some("Main St"));
        assert!(ctx.object_at::<Address>("Team8Office", false).unwrap().is_none());
        assert!(matches!(
            ctx.object_at::<Team>("Team7", false).unwrap_err(),
            MapError::KindMismatch { .. }
        ));

        let tags = ctx.list_at::<String>("Team7Tags", true).unwrap().unwrap();
        assert_eq!(tags.len().unwrap(), 1);
        assert!(tags.is_read_only());
    }

    // ---- Test 6: Persistence ----

    #[test]
    fn saved_graph_survives_reopening_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.json");
        {
            let ctx = MappingContext::new(Arc::new(JsonFileStore::open(&path).unwrap()));
            ctx.save(&team()).unwrap();
        }
        let ctx = MappingContext::new(Arc::new(JsonFileStore::open(&path).unwrap()));
        let team = ctx.find::<Team>("7").unwrap().unwrap();
        let members = team.get_list::<Member>("Members").unwrap().unwrap();
        assert_eq!(members.get_entity(0).unwrap().unwrap().key_value(), "ann");
    }

    // ---- Test 7: Round-trip law ----

    proptest! {
        #[test]
        fn save_then_find_reads_back_every_property(
            id in "[a-z0-9]{1,8}",
            name in proptest::option::of("[ -~]{0,16}"),
            age in any::<i32>(),
        ) {
            let (_store, ctx) = context();
            let person = Person { id: id.clone(), name: name.clone(), age };
            ctx.save(&person).unwrap();
            let found = ctx.find::<Person>(&id).unwrap().unwrap();
            prop_assert_eq!(found.get_string("Id").unwrap(), Some(id));
            prop_assert_eq!(found.get_string("Name").unwrap(), name);
            prop_assert_eq!(found.get::<i32>("Age").unwrap(), age);
        }
    }
}
