//! # Named Lock Registry
//!
//! Process-local mutual exclusion keyed by a logical resource name. Sub-resource
//! reconcilers that rewrite a shared list on the same parent object acquire the
//! parent's key, so their read → merge → write cycles never interleave.
//!
//! Locks are created lazily on first use. The registry only keeps weak handles,
//! so a lock disappears once the last holder or waiter lets go of it.
//!
//! Locks are not reentrant: acquiring a key you already hold deadlocks the task.
//! Acquire once per read-modify-write cycle and let the guard's `Drop` release it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// Builds a `"{kind}.{name}"` lock key for locks not derived from an identity.
pub fn lock_key(kind: &str, name: &str) -> String {
    format!("{kind}.{name}")
}

/// A held named lock. Dropping it releases the lock.
pub struct NamedLock {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl NamedLock {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Releases the lock explicitly. Equivalent to dropping it.
    pub fn release(self) {
        trace!(key = %self.key, "Released");
    }
}

impl fmt::Debug for NamedLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedLock").field("key", &self.key).finish()
    }
}

/// Registry of named locks. Cheap to clone; clones share the same locks.
#[derive(Clone, Default)]
pub struct NamedLockRegistry {
    locks: Arc<Mutex<HashMap<String, Weak<AsyncMutex<()>>>>>,
}

impl NamedLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until `key` is free and returns its guard.
    pub async fn acquire(&self, key: &str) -> NamedLock {
        let mutex = self.handle(key);
        trace!(key, "Acquiring");
        let guard = mutex.lock_owned().await;
        trace!(key, "Acquired");
        NamedLock {
            key: key.to_string(),
            _guard: guard,
        }
    }

    /// Acquires several keys at once.
    ///
    /// Keys are deduplicated and taken in sorted order, so two callers asking
    /// for overlapping sets cannot deadlock each other.
    pub async fn acquire_many<I, S>(&self, keys: I) -> Vec<NamedLock>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort();
        keys.dedup();

        let mut held = Vec::with_capacity(keys.len());
        for key in keys {
            held.push(self.acquire(&key).await);
        }
        held
    }

    /// Number of keys currently alive (held or awaited).
    pub fn active(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.values().filter(|w| w.strong_count() > 0).count()
    }

    fn handle(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = locks.get(key).and_then(Weak::upgrade) {
            return existing;
        }

        locks.retain(|_, w| w.strong_count() > 0);
        let mutex = Arc::new(AsyncMutex::new(()));
        locks.insert(key.to_string(), Arc::downgrade(&mutex));
        mutex
    }
}

impl fmt::Debug for NamedLockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedLockRegistry")
            .field("active", &self.active())
            .finish()
    }
}
