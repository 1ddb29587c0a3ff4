//! Lease locks over the store's `try_acquire`/`release` primitives.
//!
//! A holder polls until the lease is free, works, and releases. Leases expire
//! on their own after [`LockConfig::lease`], so a crashed holder cannot block
//! a list forever. Release happens when the [`LockGuard`] is dropped, on every
//! exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use kvmap_store::KeyValueStore;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::config::LockConfig;
use crate::error::{MapError, MapResult};

/// Lock key guarding the list stored at `list_key`.
pub fn lock_key(list_key: &str) -> String {
    format!("{list_key}:lock")
}

/// Caller-side cancellation signal for lock acquisition.
///
/// Clones share the same flag. A token may also carry a deadline, after which
/// it reads as cancelled.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that is only cancelled by calling [`cancel`](Self::cancel).
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also cancels itself at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// A held lease.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lock {
    pub key: String,
    pub token: String,
    pub expires_at: Instant,
}

/// Acquires lease locks on behalf of list proxies.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn KeyValueStore>,
    config: LockConfig,
}

impl LockManager {
    pub fn new(store: Arc<dyn KeyValueStore>, config: LockConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Block until the lock guarding `list_key` is held, or `cancel` fires.
    ///
    /// Only the acquire step is retried; the caller's protected work runs
    /// once, after this returns.
    pub fn acquire(&self, list_key: &str, cancel: &CancelToken) -> MapResult<LockGuard> {
        let key = lock_key(list_key);
        let token = Uuid::now_v7().to_string();
        let lease = self.config.lease();
        let mut attempts = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(MapError::OperationCancelled { key });
            }
            let taken_at = Instant::now();
            if self.store.try_acquire(&key, &token, lease)? {
                trace!(key = %key, attempts, "lock acquired");
                return Ok(LockGuard {
                    store: Arc::clone(&self.store),
                    lock: Lock {
                        key,
                        token,
                        expires_at: taken_at + lease,
                    },
                    released: false,
                });
            }
            attempts += 1;
            trace!(key = %key, attempts, "lock busy, polling");
            thread::sleep(self.config.poll_interval());
        }
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("config", &self.config)
            .finish()
    }
}

/// Scope guard for a held lease; releases on drop.
pub struct LockGuard {
    store: Arc<dyn KeyValueStore>,
    lock: Lock,
    released: bool,
}

impl LockGuard {
    pub fn lock(&self) -> &Lock {
        &self.lock
    }

    /// Release now and report whether the lease was still ours.
    pub fn release(mut self) -> MapResult<bool> {
        self.released = true;
        Ok(self.store.release(&self.lock.key, &self.lock.token)?)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.store.release(&self.lock.key, &self.lock.token) {
            Ok(true) => {}
            Ok(false) => warn!(key = %self.lock.key, "lease expired before release"),
            Err(e) => warn!(key = %self.lock.key, error = %e, "failed to release lease"),
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("lock", &self.lock).finish()
    }
}
