//! Keyed in-process mutual exclusion.
//!
//! [`PathLock`] serializes async operations that share a key (normally a
//! storage path). Callers for a busy key queue behind the current holder
//! in FIFO order instead of failing. The lock lives in process memory only
//! and offers no protection against a second OS process touching the same
//! file.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;

/// Registry of per-key async mutexes. Clones share the registry.
#[derive(Debug, Clone, Default)]
pub struct PathLock {
    slots: Arc<Mutex<HashMap<PathBuf, Slot>>>,
}

impl PathLock {
    /// Create an independent registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry shared by every store and ledger that does not
    /// inject its own.
    #[must_use]
    pub fn shared() -> Self {
        static SHARED: OnceLock<PathLock> = OnceLock::new();
        SHARED.get_or_init(PathLock::new).clone()
    }

    /// Run `operation` while holding the lock for `key`.
    ///
    /// The lock is released when `operation` finishes, returns an error,
    /// panics, or the returned future is dropped.
    pub async fn with_lock<K, F, Fut, T>(&self, key: K, operation: F) -> T
    where
        K: AsRef<Path>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire(key).await;
        operation().await
    }

    /// Wait for and take the lock for `key`.
    pub async fn acquire(&self, key: impl AsRef<Path>) -> PathLockGuard {
        let key = key.as_ref().to_path_buf();
        let slot = self.slot_for(&key);
        let guard = Arc::clone(&slot).lock_owned().await;
        PathLockGuard {
            registry: self.clone(),
            key,
            slot,
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or waited on.
    #[must_use]
    pub fn active_keys(&self) -> usize {
        self.with_slots(|slots| slots.len())
    }

    fn slot_for(&self, key: &Path) -> Slot {
        self.with_slots(|slots| Arc::clone(slots.entry(key.to_path_buf()).or_default()))
    }

    fn release(&self, key: &Path, slot: &Slot) {
        self.with_slots(|slots| {
            // Registry entry plus our own handle: nobody else is queued.
            if Arc::strong_count(slot) <= 2 {
                slots.remove(key);
            }
        });
    }

    fn with_slots<T>(&self, f: impl FnOnce(&mut HashMap<PathBuf, Slot>) -> T) -> T {
        match self.slots.lock() {
            Ok(mut slots) => f(&mut slots),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

/// Held lock for one key. Dropping it lets the next queued caller in.
#[derive(Debug)]
pub struct PathLockGuard {
    registry: PathLock,
    key: PathBuf,
    slot: Slot,
    guard: Option<OwnedMutexGuard<()>>,
}

impl PathLockGuard {
    /// Key this guard protects.
    #[must_use]
    pub fn key(&self) -> &Path {
        &self.key
    }
}

impl Drop for PathLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.registry.release(&self.key, &self.slot);
    }
}
