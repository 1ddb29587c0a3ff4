//! Write-through JSON file store.
//!
//! [`JsonFileStore`] keeps the whole keyspace in memory and rewrites a single
//! JSON object file after every mutating command. Lease locks are process
//! local. It exists so the demo CLI can keep data between invocations; it is
//! not meant for concurrent writers across processes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::memory::LeaseTable;
use crate::record::{RecordOp, StoreRecord};
use crate::traits::KeyValueStore;

/// A key-value store persisted as one JSON object on disk.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
    leases: LeaseTable,
}

impl JsonFileStore {
    /// Open the store at `path`, creating an empty keyspace if the file does
    /// not exist yet.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?
            }
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), keys = values.len(), "opened json store");
        Ok(Self {
            path,
            values: RwLock::new(values),
            leases: LeaseTable::default(),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sorted copy of every key/value pair whose key starts with `prefix`.
    pub fn scan_prefix(&self, prefix: &str) -> BTreeMap<String, String> {
        self.values
            .read()
            .expect("lock poisoned")
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(values)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Persist `next` and only then make it the live keyspace, so a failed
    /// write leaves memory matching the file.
    fn replace(
        &self,
        current: &mut BTreeMap<String, String>,
        next: BTreeMap<String, String>,
    ) -> StoreResult<()> {
        self.persist(&next)?;
        *current = next;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.values.read().expect("lock poisoned").contains_key(key))
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.values.read().expect("lock poisoned").get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut map = self.values.write().expect("lock poisoned");
        let mut next = map.clone();
        next.insert(key.to_string(), value.to_string());
        self.replace(&mut map, next)
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut map = self.values.write().expect("lock poisoned");
        if !map.contains_key(key) {
            return Ok(false);
        }
        let mut next = map.clone();
        next.remove(key);
        self.replace(&mut map, next)?;
        Ok(true)
    }

    fn execute_batch(&self, batch: &[StoreRecord]) -> StoreResult<()> {
        let mut map = self.values.write().expect("lock poisoned");
        let mut next = map.clone();
        for record in batch {
            match record.op {
                RecordOp::Write => {
                    next.insert(record.key.clone(), record.value.clone());
                }
                RecordOp::Delete => {
                    next.remove(&record.key);
                }
            }
        }
        self.replace(&mut map, next)
    }

    fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool> {
        Ok(self.leases.try_acquire(key, token, ttl))
    }

    fn release(&self, key: &str, token: &str) -> StoreResult<bool> {
        Ok(self.leases.release(key, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        {
            let store = JsonFileStore::open(&path).unwrap();
            store
                .execute_batch(&[
                    StoreRecord::marker("Person1"),
                    StoreRecord::write("Person1Age", "27"),
                ])
                .unwrap();
        }
        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("Person1Age").unwrap().as_deref(), Some("27"));
        assert!(reopened.exists("Person1").unwrap());
    }

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("absent.json")).unwrap();
        assert!(store.scan_prefix("").is_empty());
    }

    #[test]
    fn delete_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = JsonFileStore::open(&path).unwrap();
        store.set("k", "v").unwrap();
        assert!(store.delete("k").unwrap());
        let reopened = JsonFileStore::open(&path).unwrap();
        assert!(!reopened.exists("k").unwrap());
    }

    #[test]
    fn failed_persist_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("data");
        fs::create_dir(&sub).unwrap();
        let store = JsonFileStore::open(sub.join("store.json")).unwrap();
        store.set("kept", "1").unwrap();

        fs::remove_dir_all(&sub).unwrap();
        assert!(matches!(store.set("lost", "2"), Err(StoreError::Io(_))));
        assert!(store
            .execute_batch(&[StoreRecord::write("lost", "2"), StoreRecord::delete("kept")])
            .is_err());
        assert!(store.delete("kept").is_err());

        assert!(!store.exists("lost").unwrap());
        assert_eq!(store.get("kept").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn scan_prefix_stops_at_prefix_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("s.json")).unwrap();
        store.set("A1", "x").unwrap();
        store.set("B1", "y").unwrap();
        store.set("B1Name", "z").unwrap();
        store.set("C", "w").unwrap();
        let keys: Vec<String> = store.scan_prefix("B").into_keys().collect();
        assert_eq!(keys, vec!["B1".to_string(), "B1Name".to_string()]);
    }

    #[test]
    fn corrupt_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            JsonFileStore::open(&path),
            Err(StoreError::Serialization(_))
        ));
    }
}
