//! Store key derivation.
//!
//! Keys are plain concatenations with no delimiter:
//!
//! - entity root: `DisplayName ++ KeyValue`
//! - property: `ParentKey ++ PropertyName`
//! - list element: `ListKey ++ decimal index` (0-based); the list key itself
//!   holds the element count
//!
//! Distinct `(prefix, name)` pairs can therefore produce the same key
//! (`"User" + "Id"` and `"UserI" + "d"`). The format is kept as is so data
//! already stored stays readable.

use crate::descriptor::{KeyMode, TypeDescriptor};
use crate::error::{SchemaError, SchemaResult};
use crate::shape::{Record, Value};

/// Textual key value of an entity instance.
pub fn entity_key_value(entity: &TypeDescriptor, instance: &dyn Record) -> SchemaResult<String> {
    let key = entity.key.ok_or(SchemaError::NoKeyProperty {
        type_name: entity.type_name(),
    })?;
    match (key.mode, instance.field(key.property.name)) {
        (_, Value::Null) => Err(SchemaError::MissingKeyValue {
            entity: entity.display_name,
            property: key.property.name,
        }),
        (KeyMode::Custom, Value::Record(record)) => record
            .key_capability()
            .map(|capability| capability.custom_key())
            .ok_or(SchemaError::MissingKeyCapability {
                entity: entity.display_name,
                key_type: key.property.ty.name(),
            }),
        (KeyMode::Display, Value::Primitive(text)) => Ok(text),
        (KeyMode::Display, Value::Text(text)) => Ok(text.to_string()),
        (_, other) => Err(SchemaError::KeyShape {
            entity: entity.display_name,
            found: other.describe(),
        }),
    }
}

/// Root key of an entity.
pub fn entity_store_key(entity: &TypeDescriptor, key_value: &str) -> String {
    format!("{}{}", entity.display_name, key_value)
}

/// Key of a property under `prefix`.
pub fn property_store_key(prefix: &str, property: &str) -> String {
    format!("{prefix}{property}")
}

/// Key of element `index` of the list stored at `list_key`.
pub fn element_store_key(list_key: &str, index: usize) -> String {
    format!("{list_key}{index}")
}
