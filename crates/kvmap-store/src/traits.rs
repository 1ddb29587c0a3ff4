use std::time::Duration;

use crate::error::StoreResult;
use crate::record::{RecordOp, StoreRecord};

/// Client capability for a flat, string-keyed key-value store.
///
/// All implementations must satisfy these invariants:
/// - `get` returns exactly the last value `set` at that key, or `None`.
/// - `execute_batch` applies records in order. It makes no cross-key
///   atomicity promise: a failure part-way leaves a prefix applied.
/// - A lease lock taken with `try_acquire` is owned by its token, is released
///   only by that token, and disappears on its own after `ttl`.
/// - Lock keys live beside data keys; callers must not reuse a data key as a
///   lock key.
pub trait KeyValueStore: Send + Sync {
    /// Check whether a value exists at `key`.
    fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Read the value at `key`.
    ///
    /// Returns `Ok(None)` if the key is absent.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write `value` at `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Delete `key`. Returns `true` if it existed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Apply an ordered batch of writes and deletes.
    ///
    /// Default implementation issues one command per record. Backends may
    /// override to pipeline the batch.
    fn execute_batch(&self, batch: &[StoreRecord]) -> StoreResult<()> {
        for record in batch {
            match record.op {
                RecordOp::Write => self.set(&record.key, &record.value)?,
                RecordOp::Delete => {
                    self.delete(&record.key)?;
                }
            }
        }
        Ok(())
    }

    /// Take the lease lock at `key` for `token` if nobody holds it.
    ///
    /// Returns `Ok(false)` when another live token holds the lock.
    fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool>;

    /// Release the lease lock at `key` if `token` still holds it.
    ///
    /// Returns `Ok(false)` if the lock expired or belongs to someone else.
    fn release(&self, key: &str, token: &str) -> StoreResult<bool>;
}
