use std::fmt;

use serde::{Deserialize, Serialize};

/// Literal value written at an entity's or object's own key to mark it present.
pub const EXISTS_MARKER: &str = "true";

/// What a [`StoreRecord`] does to its key when a batch is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordOp {
    /// `SET key value`
    Write,
    /// `DEL key`
    Delete,
}

/// A single key-value operation produced by the graph serializer.
///
/// Records are transient: they exist only between serialization and the
/// batch that applies them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRecord {
    pub key: String,
    pub value: String,
    pub op: RecordOp,
}

impl StoreRecord {
    /// A write of `value` at `key`.
    pub fn write(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            op: RecordOp::Write,
        }
    }

    /// A deletion of `key`.
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: String::new(),
            op: RecordOp::Delete,
        }
    }

    /// An existence marker at `key`.
    pub fn marker(key: impl Into<String>) -> Self {
        Self::write(key, EXISTS_MARKER)
    }

    /// Turn this record into the deletion of the same key.
    pub fn into_delete(self) -> Self {
        Self::delete(self.key)
    }

    pub fn is_write(&self) -> bool {
        self.op == RecordOp::Write
    }
}

impl fmt::Display for StoreRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            RecordOp::Write => write!(f, "SET {} {:?}", self.key, self.value),
            RecordOp::Delete => write!(f, "DEL {}", self.key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_uses_literal_true() {
        let record = StoreRecord::marker("Person1");
        assert_eq!(record.value, "true");
        assert!(record.is_write());
    }

    #[test]
    fn into_delete_keeps_key_and_drops_value() {
        let record = StoreRecord::write("Person1Age", "27").into_delete();
        assert_eq!(record.key, "Person1Age");
        assert_eq!(record.op, RecordOp::Delete);
        assert!(record.value.is_empty());
    }

    #[test]
    fn display_reads_like_a_command() {
        assert_eq!(
            StoreRecord::write("k", "v").to_string(),
            "SET k \"v\""
        );
        assert_eq!(StoreRecord::delete("k").to_string(), "DEL k");
    }
}
