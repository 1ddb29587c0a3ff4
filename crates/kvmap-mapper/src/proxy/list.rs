use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use kvmap_schema::keys::element_store_key;
use kvmap_schema::{Kind, Mapped, Scalar, TypeDescriptor};
use kvmap_store::StoreRecord;
use tracing::debug;

use super::{
    expect_descriptor_kind, read_reference, read_scalar, save_referenced, write_value, EntityProxy,
    ObjectProxy,
};
use crate::context::MappingCore;
use crate::error::{MapError, MapResult};
use crate::lock::{CancelToken, LockGuard};
use crate::serializer::GraphSerializer;
use crate::sweep::stored_count;

/// Store-backed view of a list whose elements are `E`.
///
/// The count lives at the list's own key and element `i` at `key ++ i`.
/// Anything that reads the count and then writes based on it runs under the
/// list's lease lock.
pub struct ListProxy<E> {
    core: Arc<MappingCore>,
    key: String,
    element: Arc<TypeDescriptor>,
    read_only: bool,
    _marker: PhantomData<fn() -> E>,
}

impl<E> ListProxy<E> {
    /// Returns `None` when the list's count record is absent.
    pub(crate) fn open(
        core: &Arc<MappingCore>,
        element: Arc<TypeDescriptor>,
        key: String,
        read_only: bool,
    ) -> MapResult<Option<Self>> {
        if !core.store.exists(&key)? {
            return Ok(None);
        }
        Ok(Some(Self {
            core: Arc::clone(core),
            key,
            element,
            read_only,
            _marker: PhantomData,
        }))
    }

    /// Key of the count record, and the prefix of every element key.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn element(&self) -> &Arc<TypeDescriptor> {
        &self.element
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn read_only(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            key: self.key.clone(),
            element: Arc::clone(&self.element),
            read_only: true,
            _marker: PhantomData,
        }
    }

    /// Current element count; a missing count reads as zero.
    pub fn len(&self) -> MapResult<usize> {
        Ok(stored_count(self.core.store.as_ref(), &self.key)?.unwrap_or(0))
    }

    pub fn is_empty(&self) -> MapResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get_string(&self, index: usize) -> MapResult<Option<String>> {
        expect_descriptor_kind(&self.element, Kind::String)?;
        let key = self.slot(index)?;
        Ok(self.core.store.get(&key)?)
    }

    pub fn get_entity(&self, index: usize) -> MapResult<Option<EntityProxy<E>>> {
        expect_descriptor_kind(&self.element, Kind::Entity)?;
        let key = self.slot(index)?;
        read_reference(&self.core, Arc::clone(&self.element), &key, self.read_only)
    }

    pub fn get_object(&self, index: usize) -> MapResult<Option<ObjectProxy<E>>> {
        let key = self.slot(index)?;
        ObjectProxy::open(&self.core, Arc::clone(&self.element), key, self.read_only)
    }

    /// Open element `index` when the elements are themselves lists of `X`.
    pub fn get_list<X: Mapped>(&self, index: usize) -> MapResult<Option<ListProxy<X>>> {
        expect_descriptor_kind(&self.element, Kind::List)?;
        let inner = self.core.registry.element_of(&self.element)?;
        if inner.type_id() != X::storage_type().id() {
            return Err(MapError::TypeMismatch {
                property: element_store_key(&self.key, index),
                expected: inner.type_name(),
                requested: type_name::<X>(),
            });
        }
        let key = self.slot(index)?;
        ListProxy::open(&self.core, inner, key, self.read_only)
    }

    /// Point element `index` at an existing entity.
    pub fn set_entity(&self, index: usize, target: &EntityProxy<E>) -> MapResult<()> {
        expect_descriptor_kind(&self.element, Kind::Entity)?;
        let _guard = self.lock(&format!("[{index}]"), &CancelToken::new())?;
        let key = self.slot(index)?;
        self.core.store.set(&key, target.key_value())?;
        Ok(())
    }

    /// Append a reference to an existing entity and return its index.
    pub fn push_entity(&self, target: &EntityProxy<E>) -> MapResult<usize> {
        expect_descriptor_kind(&self.element, Kind::Entity)?;
        let _guard = self.lock("push", &CancelToken::new())?;
        let index = self.len()?;
        let batch = [
            StoreRecord::write(element_store_key(&self.key, index), target.key_value()),
            StoreRecord::write(self.key.clone(), (index + 1).to_string()),
        ];
        self.core.commit(&batch)?;
        Ok(index)
    }

    pub fn insert(&self, _index: usize, _value: &E) -> MapResult<()> {
        Err(MapError::NotSupported("insert"))
    }

    pub fn remove_at(&self, _index: usize) -> MapResult<()> {
        Err(MapError::NotSupported("remove_at"))
    }

    pub fn contains(&self, _value: &E) -> MapResult<bool> {
        Err(MapError::NotSupported("contains"))
    }

    pub fn index_of(&self, _value: &E) -> MapResult<Option<usize>> {
        Err(MapError::NotSupported("index_of"))
    }

    /// Bounds-check `index` against the stored count and return its key.
    fn slot(&self, index: usize) -> MapResult<String> {
        let len = self.len()?;
        if index >= len {
            return Err(MapError::IndexOutOfRange {
                key: self.key.clone(),
                index,
                len,
            });
        }
        Ok(element_store_key(&self.key, index))
    }

    fn lock(&self, operation: &str, cancel: &CancelToken) -> MapResult<LockGuard> {
        if self.read_only {
            return Err(MapError::ReadOnlyViolation {
                key: self.key.clone(),
                property: operation.to_string(),
            });
        }
        self.core.locks.acquire(&self.key, cancel)
    }
}

impl<E: Mapped> ListProxy<E> {
    /// Replace element `index` with a concrete value.
    pub fn set(&self, index: usize, value: &E) -> MapResult<()> {
        let _guard = self.lock(&format!("[{index}]"), &CancelToken::new())?;
        let key = self.slot(index)?;
        write_value(&self.core, &key, Arc::clone(&self.element), value.value())
    }

    /// Append a concrete value and return its index.
    pub fn push(&self, value: &E) -> MapResult<usize> {
        self.push_with_cancel(value, &CancelToken::new())
    }

    /// Append, giving up with [`MapError::OperationCancelled`] if `cancel`
    /// fires while waiting for the list lock.
    pub fn push_with_cancel(&self, value: &E, cancel: &CancelToken) -> MapResult<usize> {
        let _guard = self.lock("push", cancel)?;
        let index = self.len()?;
        let slot = element_store_key(&self.key, index);
        let mut batch = if self.element.kind == Kind::Entity && !value.value().is_null() {
            // The entity lands before the element that points at it.
            let reference = save_referenced(&self.core, Arc::clone(&self.element), value.value())?;
            vec![StoreRecord::write(slot, reference)]
        } else {
            let mut serializer = GraphSerializer::new(&self.core.registry);
            serializer.at(&slot, Arc::clone(&self.element), value.value())?;
            serializer.finish()
        };
        batch.push(StoreRecord::write(self.key.clone(), (index + 1).to_string()));
        debug!(key = %self.key, index, records = batch.len(), "appending element");
        self.core.commit(&batch)?;
        Ok(index)
    }
}

impl<E: Scalar> ListProxy<E> {
    /// Read a primitive element; an absent record reads as `E::default()`.
    pub fn get(&self, index: usize) -> MapResult<E> {
        let key = self.slot(index)?;
        read_scalar(&self.core, &key)
    }
}

impl<E> Clone for ListProxy<E> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            key: self.key.clone(),
            element: Arc::clone(&self.element),
            read_only: self.read_only,
            _marker: PhantomData,
        }
    }
}

impl<E> fmt::Debug for ListProxy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListProxy")
            .field("key", &self.key)
            .field("element", &self.element.display_name)
            .field("read_only", &self.read_only)
            .finish()
    }
}
