use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use kvmap_schema::{Kind, TypeDescriptor};

use super::{expect_descriptor_kind, Binding, Proxy};
use crate::context::MappingCore;
use crate::error::MapResult;

/// Store-backed view of an identity-less object embedded at a prefix.
pub struct ObjectProxy<T> {
    binding: Binding,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ObjectProxy<T> {
    /// Returns `None` when the object's existence marker at `prefix` is absent.
    pub(crate) fn open(
        core: &Arc<MappingCore>,
        descriptor: Arc<TypeDescriptor>,
        prefix: String,
        read_only: bool,
    ) -> MapResult<Option<Self>> {
        expect_descriptor_kind(&descriptor, Kind::Object)?;
        if !core.store.exists(&prefix)? {
            return Ok(None);
        }
        Ok(Some(Self {
            binding: Binding::new(Arc::clone(core), prefix, descriptor, read_only, None),
            _marker: PhantomData,
        }))
    }

    pub fn read_only(&self) -> Self {
        Self {
            binding: self.binding.to_read_only(),
            _marker: PhantomData,
        }
    }
}

impl<T> Proxy for ObjectProxy<T> {
    fn binding(&self) -> &Binding {
        &self.binding
    }
}

impl<T> Clone for ObjectProxy<T> {
    fn clone(&self) -> Self {
        Self {
            binding: self.binding.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ObjectProxy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectProxy")
            .field("prefix", &self.binding.prefix())
            .field("read_only", &self.binding.is_read_only())
            .finish()
    }
}
