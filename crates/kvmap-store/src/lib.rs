//! Flat key-value storage boundary for kvmap.
//!
//! The mapping engine never talks to a concrete database. It talks to the
//! [`KeyValueStore`] trait, which models the small command surface of a
//! Redis-like server: string `GET`/`SET`/`EXISTS`/`DEL`, batched writes, and a
//! token-checked lease lock (`SET NX PX` / compare-and-delete).
//!
//! # Backends
//!
//! - [`InMemoryStore`] -- `HashMap`-based store for tests and embedding
//! - [`JsonFileStore`] -- write-through JSON file, used by the demo CLI
//!
//! # Design Rules
//!
//! 1. Keys and values are plain UTF-8 strings; the store never interprets them.
//! 2. A batch is applied in order but carries no cross-key atomicity promise.
//! 3. A lease lock is owned by the token that took it and expires on its own.
//! 4. All backend failures are propagated, never silently ignored.

pub mod error;
pub mod file;
pub mod memory;
pub mod record;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::JsonFileStore;
pub use memory::InMemoryStore;
pub use record::{RecordOp, StoreRecord, EXISTS_MARKER};
pub use traits::KeyValueStore;
