use thiserror::Error;

/// Errors raised while classifying types or deriving keys.
///
/// Registration errors are fatal to the type involved: nothing from a failed
/// registration is cached, so every later resolution fails the same way.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("type {type_name} marks more than one key property: {fields:?}")]
    DuplicateKeyMarker {
        type_name: &'static str,
        fields: Vec<&'static str>,
    },

    #[error("entity {entity} cannot use {key_type} in its key: entities are never key material")]
    InvalidEntityKeyType {
        entity: &'static str,
        key_type: &'static str,
    },

    #[error("entity {entity} cannot use container {key_type} in its key")]
    UnsupportedKeyContainer {
        entity: &'static str,
        key_type: &'static str,
    },

    #[error("raw array {type_name} cannot be stored as a root; wrap it in a list")]
    UnsupportedContainerAsRoot { type_name: &'static str },

    #[error("key of entity {entity} ({key_type}) does not expose a custom key")]
    MissingKeyCapability {
        entity: &'static str,
        key_type: &'static str,
    },

    #[error("entity {entity} has no value for key property {property}")]
    MissingKeyValue {
        entity: &'static str,
        property: &'static str,
    },

    #[error("key property of entity {entity} holds {found}, which has no key form")]
    KeyShape {
        entity: &'static str,
        found: &'static str,
    },

    #[error("type {type_name} has no key property")]
    NoKeyProperty { type_name: &'static str },

    #[error("type {type_name} is not a list")]
    NotAList { type_name: &'static str },
}

/// Result alias for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;
