use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::StoreResult;
use crate::record::{RecordOp, StoreRecord};
use crate::traits::KeyValueStore;

/// A live lease on a lock key.
#[derive(Clone, Debug)]
struct Lease {
    token: String,
    expires_at: Instant,
}

/// Token-checked lease locks with expiry, shared by the reference backends.
#[derive(Debug, Default)]
pub(crate) struct LeaseTable {
    leases: Mutex<HashMap<String, Lease>>,
}

impl LeaseTable {
    pub(crate) fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut leases = self.leases.lock().expect("lease table lock poisoned");
        if let Some(lease) = leases.get(key) {
            if lease.expires_at > now {
                return false;
            }
            trace!(key, "lease expired, reclaiming");
        }
        leases.insert(
            key.to_string(),
            Lease {
                token: token.to_string(),
                expires_at: now + ttl,
            },
        );
        true
    }

    pub(crate) fn release(&self, key: &str, token: &str) -> bool {
        let mut leases = self.leases.lock().expect("lease table lock poisoned");
        match leases.get(key) {
            Some(lease) if lease.token == token && lease.expires_at > Instant::now() => {
                leases.remove(key);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn is_held(&self, key: &str) -> bool {
        let leases = self.leases.lock().expect("lease table lock poisoned");
        leases
            .get(key)
            .is_some_and(|lease| lease.expires_at > Instant::now())
    }
}

/// In-memory, HashMap-based key-value store.
///
/// Intended for tests and embedding. Values live behind a `RwLock`; lease
/// locks live in a separate table so they never collide with data keys.
pub struct InMemoryStore {
    values: RwLock<HashMap<String, String>>,
    leases: LeaseTable,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            leases: LeaseTable::default(),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.values.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.values.read().expect("lock poisoned").is_empty()
    }

    /// Remove every key.
    pub fn clear(&self) {
        self.values.write().expect("lock poisoned").clear();
    }

    /// Sorted copy of every key/value pair whose key starts with `prefix`.
    pub fn scan_prefix(&self, prefix: &str) -> BTreeMap<String, String> {
        self.values
            .read()
            .expect("lock poisoned")
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Sorted copy of the whole keyspace.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.scan_prefix("")
    }

    /// Returns `true` if a live lease exists at `key`.
    pub fn is_locked(&self, key: &str) -> bool {
        self.leases.is_held(key)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for InMemoryStore {
    fn exists(&self, key: &str) -> StoreResult<bool> {
        let map = self.values.read().expect("lock poisoned");
        Ok(map.contains_key(key))
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let map = self.values.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut map = self.values.write().expect("lock poisoned");
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut map = self.values.write().expect("lock poisoned");
        Ok(map.remove(key).is_some())
    }

    fn execute_batch(&self, batch: &[StoreRecord]) -> StoreResult<()> {
        let mut map = self.values.write().expect("lock poisoned");
        for record in batch {
            match record.op {
                RecordOp::Write => {
                    map.insert(record.key.clone(), record.value.clone());
                }
                RecordOp::Delete => {
                    map.remove(&record.key);
                }
            }
        }
        Ok(())
    }

    fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool> {
        Ok(self.leases.try_acquire(key, token, ttl))
    }

    fn release(&self, key: &str, token: &str) -> StoreResult<bool> {
        Ok(self.leases.release(key, token))
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("key_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    // ---- Basic commands ----

    #[test]
    fn set_then_get() {
        let store = InMemoryStore::new();
        store.set("Person1Name", "Blueve").unwrap();
        assert_eq!(store.get("Person1Name").unwrap().as_deref(), Some("Blueve"));
        assert!(store.exists("Person1Name").unwrap());
    }

    #[test]
    fn get_missing_is_none() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("nope").unwrap(), None);
        assert!(!store.exists("nope").unwrap());
    }

    #[test]
    fn set_overwrites() {
        let store = InMemoryStore::new();
        store.set("k", "1").unwrap();
        store.set("k", "2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_reports_presence() {
        let store = InMemoryStore::new();
        store.set("k", "v").unwrap();
        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
        assert!(store.is_empty());
    }

    // ---- Batches ----

    #[test]
    fn batch_applies_in_order() {
        let store = InMemoryStore::new();
        let batch = vec![
            StoreRecord::write("a", "1"),
            StoreRecord::write("a", "2"),
            StoreRecord::write("b", "x"),
            StoreRecord::delete("b"),
        ];
        store.execute_batch(&batch).unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));
        assert!(!store.exists("b").unwrap());
    }

    #[test]
    fn scan_prefix_is_sorted_and_filtered() {
        let store = InMemoryStore::new();
        store.set("Person1Name", "a").unwrap();
        store.set("Person1", "true").unwrap();
        store.set("Team7", "true").unwrap();
        let keys: Vec<String> = store.scan_prefix("Person").into_keys().collect();
        assert_eq!(keys, vec!["Person1".to_string(), "Person1Name".to_string()]);
    }

    // ---- Leases ----

    #[test]
    fn lease_is_exclusive_until_released() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(60);
        assert!(store.try_acquire("L", "t1", ttl).unwrap());
        assert!(!store.try_acquire("L", "t2", ttl).unwrap());
        assert!(store.is_locked("L"));
        assert!(store.release("L", "t1").unwrap());
        assert!(store.try_acquire("L", "t2", ttl).unwrap());
    }

    #[test]
    fn release_with_wrong_token_is_refused() {
        let store = InMemoryStore::new();
        assert!(store.try_acquire("L", "owner", Duration::from_secs(60)).unwrap());
        assert!(!store.release("L", "intruder").unwrap());
        assert!(store.is_locked("L"));
    }

    #[test]
    fn expired_lease_can_be_reclaimed() {
        let store = InMemoryStore::new();
        assert!(store.try_acquire("L", "crashed", Duration::from_millis(10)).unwrap());
        thread::sleep(Duration::from_millis(30));
        assert!(!store.is_locked("L"));
        assert!(store.try_acquire("L", "next", Duration::from_secs(60)).unwrap());
        // The stale holder can no longer release the new lease.
        assert!(!store.release("L", "crashed").unwrap());
    }

    #[test]
    fn leases_do_not_touch_data_keys() {
        let store = InMemoryStore::new();
        store.set("List", "3").unwrap();
        assert!(store.try_acquire("List", "t", Duration::from_secs(1)).unwrap());
        assert_eq!(store.get("List").unwrap().as_deref(), Some("3"));
    }
}
