use kvmap_schema::{Kind, SchemaError};
use kvmap_store::StoreError;
use thiserror::Error;

/// Errors from mapping operations.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An entity-only operation was invoked on a type that is not an entity.
    #[error("{type_name} is not an entity type (resolved as {kind})")]
    NotAnEntityType { type_name: &'static str, kind: Kind },

    #[error("{type_name} resolved as {actual}, expected {expected}")]
    KindMismatch {
        type_name: &'static str,
        expected: Kind,
        actual: Kind,
    },

    #[error("property {property} at {key} is read-only")]
    ReadOnlyViolation { key: String, property: String },

    #[error("index {index} out of range for list {key} of length {len}")]
    IndexOutOfRange { key: String, index: usize, len: usize },

    #[error("list operation not supported: {0}")]
    NotSupported(&'static str),

    /// A plain object appears again among its own ancestors.
    #[error("circular reference to object {type_name} at {key}")]
    CircularObjectReference { key: String, type_name: &'static str },

    #[error("lock acquisition cancelled for {key}")]
    OperationCancelled { key: String },

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("{type_name} has no property named {property}")]
    UnknownProperty {
        type_name: &'static str,
        property: String,
    },

    #[error("property {property} holds {expected}, requested {requested}")]
    TypeMismatch {
        property: String,
        expected: &'static str,
        requested: &'static str,
    },

    #[error("cannot parse {value:?} at {key} as {target}")]
    Parse {
        key: String,
        value: String,
        target: &'static str,
    },

    /// A value's runtime view disagrees with its declared kind.
    #[error("value at {key} is a {found}, declared {kind}")]
    ShapeMismatch {
        key: String,
        kind: Kind,
        found: &'static str,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result alias for mapping operations.
pub type MapResult<T> = Result<T, MapError>;
