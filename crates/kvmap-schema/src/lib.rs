//! Schema layer for kvmap.
//!
//! Every storable type describes its on-store shape once, statically, through
//! the [`Mapped`] trait. The [`TypeRegistry`] turns those shapes into memoized
//! [`TypeDescriptor`]s, classifying each type as one of five [`Kind`]s and
//! validating entity keys at registration time. The [`keys`] module derives
//! store keys from descriptors and values.
//!
//! # Kinds
//!
//! - `Primitive` -- numbers, booleans and chars, stored in base-10 text
//! - `String` -- stored verbatim
//! - `Entity` -- a record with exactly one key property; addressable on its own
//! - `Object` -- a record without a key; lives under its parent's prefix
//! - `List` -- an ordered sequence; a count record plus one record per element
//!
//! # Describing a type
//!
//! ```rust,ignore
//! use kvmap_schema::mapped_record;
//!
//! struct Person { id: String, name: Option<String>, age: i32 }
//!
//! mapped_record! {
//!     Person as "Person" {
//!         #[key] id: String => "Id",
//!         name: Option<String> => "Name",
//!         age: i32 => "Age",
//!     }
//! }
//! ```

pub mod descriptor;
pub mod error;
pub mod keys;
mod macros;
pub mod registry;
pub mod scalar;
pub mod shape;

pub use descriptor::{EntityKey, KeyMode, Kind, Property, TypeDescriptor};
pub use error::{SchemaError, SchemaResult};
pub use registry::TypeRegistry;
pub use scalar::Scalar;
pub use shape::{CustomKey, FieldShape, Mapped, Record, RecordShape, Shape, TypeHandle, Value};
