//! Shared helpers for integration tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use nudge::clock::ManualClock;
use nudge::lock::PathLock;
use nudge::notify::{Notification, Notifier};
use nudge::scheduler::{RecurrenceEngine, ReminderScheduler};
use nudge::service::ReminderService;
use nudge::store::ReminderStore;
use std::sync::{Arc, Mutex};

/// Wednesday 2025-08-27 09:00 in Asia/Jakarta.
pub(crate) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 27, 2, 0, 0).unwrap()
}

/// Notifier that records every delivery.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub(crate) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

/// Service, scheduler and clock sharing one temp store.
pub(crate) struct Harness {
    pub(crate) dir: tempfile::TempDir,
    pub(crate) clock: ManualClock,
    pub(crate) notifier: Arc<RecordingNotifier>,
    pub(crate) service: ReminderService,
    pub(crate) scheduler: ReminderScheduler,
}

pub(crate) fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("create temp dir");
    let clock = ManualClock::new(base_time());
    let notifier = Arc::new(RecordingNotifier::default());
    let lock = PathLock::new();
    let store = ReminderStore::new(dir.path().join("reminders.json")).with_lock(lock);
    let engine = RecurrenceEngine::new(chrono_tz::Asia::Jakarta);

    let service = ReminderService::new(store.clone(), engine, Arc::new(clock.clone()));
    let scheduler =
        ReminderScheduler::new(store, engine, notifier.clone(), Arc::new(clock.clone()));

    Harness {
        dir,
        clock,
        notifier,
        service,
        scheduler,
    }
}
