//! Object-graph mapping over a flat key-value store.
//!
//! This crate is the engine of kvmap. It provides:
//! - `MappingContext`: Find, Save and Remove for entity graphs
//! - `GraphSerializer`: explicit-stack traversal that flattens a graph into
//!   one batch of records, deduplicating entities and rejecting object cycles
//! - Lazy proxies (`EntityProxy`, `ObjectProxy`, `ListProxy`) whose every
//!   accessor is a store round trip
//! - `LockManager`: token-checked lease locks serializing list mutations
//! - `MapperConfig`: TOML-loadable lock timing
//!
//! # Key layout
//!
//! | Record | Key | Value |
//! |--------|-----|-------|
//! | entity marker | `DisplayName ++ keyValue` | `true` |
//! | property | `parentKey ++ PropertyName` | text, or the referenced entity's key value |
//! | object marker | the property key | `true` |
//! | list count | the property key | element count |
//! | list element | `listKey ++ index` | as a property |
//!
//! Keys are concatenated without a delimiter, so distinct paths can name the
//! same key (`"User" ++ "Id"` and `"UserI" ++ "d"`). The format is kept for
//! compatibility with stored data.

pub mod config;
pub mod context;
pub mod error;
pub mod lock;
pub mod proxy;
pub mod serializer;
pub mod sweep;

#[cfg(test)]
mod fixtures;

pub use config::{LockConfig, MapperConfig};
pub use context::MappingContext;
pub use error::{MapError, MapResult};
pub use lock::{lock_key, CancelToken, Lock, LockGuard, LockManager};
pub use proxy::{Binding, EntityProxy, ListProxy, ObjectProxy, Proxy};
pub use serializer::GraphSerializer;
