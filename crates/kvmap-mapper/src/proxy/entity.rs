use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use kvmap_schema::keys::entity_store_key;
use kvmap_schema::{Kind, TypeDescriptor};

use super::{Binding, Proxy};
use crate::context::MappingCore;
use crate::error::{MapError, MapResult};

/// Store-backed view of an entity of type `T`.
pub struct EntityProxy<T> {
    binding: Binding,
    key_value: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> EntityProxy<T> {
    /// Open the entity whose key value is `key_value`.
    ///
    /// Returns `None` when its existence marker is absent.
    pub(crate) fn open(
        core: &Arc<MappingCore>,
        descriptor: Arc<TypeDescriptor>,
        key_value: &str,
        read_only: bool,
    ) -> MapResult<Option<Self>> {
        let Some(key) = descriptor.key else {
            return Err(MapError::NotAnEntityType {
                type_name: descriptor.type_name(),
                kind: descriptor.kind,
            });
        };
        let store_key = entity_store_key(&descriptor, key_value);
        if !core.store.exists(&store_key)? {
            return Ok(None);
        }
        let pinned = matches!(key.property.kind, Kind::Primitive | Kind::String)
            .then(|| key_value.to_string());
        Ok(Some(Self {
            binding: Binding::new(Arc::clone(core), store_key, descriptor, read_only, pinned),
            key_value: key_value.to_string(),
            _marker: PhantomData,
        }))
    }

    /// The entity's key value, as written into references.
    pub fn key_value(&self) -> &str {
        &self.key_value
    }

    /// Root key of the entity, e.g. `Person1`.
    pub fn store_key(&self) -> &str {
        self.binding.prefix()
    }

    /// A read-only view of the same entity.
    pub fn read_only(&self) -> Self {
        Self {
            binding: self.binding.to_read_only(),
            key_value: self.key_value.clone(),
            _marker: PhantomData,
        }
    }

    /// Whether the entity still exists in the store.
    pub fn exists(&self) -> MapResult<bool> {
        Ok(self.binding.core().store.exists(self.store_key())?)
    }
}

impl<T> Proxy for EntityProxy<T> {
    fn binding(&self) -> &Binding {
        &self.binding
    }
}

impl<T> Clone for EntityProxy<T> {
    fn clone(&self) -> Self {
        Self {
            binding: self.binding.clone(),
            key_value: self.key_value.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for EntityProxy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityProxy")
            .field("store_key", &self.store_key())
            .field("read_only", &self.binding.is_read_only())
            .finish()
    }
}
