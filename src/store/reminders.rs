//! Locked persistence for the reminder collection.
//!
//! Every read-modify-write runs end to end under the [`PathLock`] entry for
//! the storage path, so concurrent callers in this process queue up instead
//! of overwriting each other's changes.

use crate::error::Result;
use crate::lock::PathLock;
use crate::scheduler::types::Reminder;
use crate::store::atomic::{LoadStatus, load_json_or_default, write_json_atomic};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reminder collection persisted as a JSON array.
#[derive(Debug, Clone)]
pub struct ReminderStore {
    path: PathBuf,
    lock: PathLock,
}

impl ReminderStore {
    /// Store at `path`, serialized through the process-wide lock registry.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: PathLock::shared(),
        }
    }

    /// Use a specific lock registry instead of the process-wide one.
    #[must_use]
    pub fn with_lock(mut self, lock: PathLock) -> Self {
        self.lock = lock;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load, mutate and save the collection as one locked transaction.
    ///
    /// The mutator sees the current persisted collection and returns the
    /// caller's result. Duplicate ids left by the mutator are dropped
    /// (first occurrence wins) before saving. A cleanly loaded collection
    /// that the mutator left as it was is not rewritten.
    pub async fn update<R>(&self, mutator: impl FnOnce(&mut Vec<Reminder>) -> R) -> Result<R> {
        let _guard = self.lock.acquire(&self.path).await;

        let (mut reminders, status) = self.read_unlocked();
        let original = (status == LoadStatus::Loaded).then(|| reminders.clone());
        let result = mutator(&mut reminders);
        dedupe_by_id(&mut reminders);
        if original.as_ref() == Some(&reminders) {
            debug!("no changes for {}, skipping write", self.path.display());
            return Ok(result);
        }
        write_json_atomic(&self.path, &reminders)?;

        debug!(
            "saved {} reminders to {}",
            reminders.len(),
            self.path.display()
        );
        Ok(result)
    }

    /// Consistent copy of the collection, read under the lock.
    ///
    /// The read-only counterpart of [`update`](Self::update): it waits for
    /// any in-flight transaction, so it never observes a half-applied one.
    pub async fn snapshot(&self) -> Vec<Reminder> {
        let _guard = self.lock.acquire(&self.path).await;
        self.read_unlocked().0
    }

    fn read_unlocked(&self) -> (Vec<Reminder>, LoadStatus) {
        let (reminders, status) = load_json_or_default::<Vec<Reminder>>(&self.path);
        if let LoadStatus::Quarantined(moved) = &status {
            warn!(
                "reminder store {} was corrupt; previous content kept at {}",
                self.path.display(),
                moved.display()
            );
        }
        (reminders, status)
    }
}

fn dedupe_by_id(reminders: &mut Vec<Reminder>) {
    let mut seen = HashSet::with_capacity(reminders.len());
    let before = reminders.len();
    reminders.retain(|r| seen.insert(r.id.clone()));
    if reminders.len() != before {
        warn!(
            "dropped {} reminders with duplicate ids",
            before - reminders.len()
        );
    }
}
