//! Reminder scheduler background loop.
//!
//! Spawns a tokio task that wakes on a fixed period, reads a snapshot of
//! the reminder collection, delivers whatever is due through the
//! [`Notifier`], and writes the scheduler-owned fields back in a single
//! locked store transaction per tick.

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::error::{NudgeError, Result};
use crate::notify::{Notification, Notifier};
use crate::scheduler::recurrence::{RecurrenceEngine, is_exhausted};
use crate::scheduler::types::{Reminder, ReminderStatus};
use crate::store::ReminderStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Interval between scheduler ticks (seconds).
const DEFAULT_TICK_INTERVAL_SECS: u64 = 30;

/// A reminder delivered this recently is not delivered again.
const DEFAULT_REFIRE_SUPPRESSION_SECS: i64 = 20;

/// Failed deliveries in a row before a reminder is paused.
const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Active reminders that received their first `nextFireAt`.
    pub bootstrapped: usize,
    /// Successful deliveries.
    pub fired: usize,
    /// Failed deliveries.
    pub failed: usize,
    /// Due reminders skipped by re-fire suppression.
    pub suppressed: usize,
    /// Reminders paused for an unusable destination.
    pub paused_invalid: usize,
    /// Reminders paused after too many failed deliveries.
    pub paused_failing: usize,
    /// Reminders that moved to `done`.
    pub completed: usize,
    /// `true` when the tick wrote to the store.
    pub persisted: bool,
}

impl TickReport {
    fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// A reminder as read at the start of a tick and as the tick left it.
struct Change {
    before: Reminder,
    after: Reminder,
}

/// Background scheduler for stored reminders.
pub struct ReminderScheduler {
    store: ReminderStore,
    engine: RecurrenceEngine,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    refire_suppression: chrono::Duration,
    delivery_timeout: Option<Duration>,
    max_consecutive_failures: u32,
    broadcast_mention_default: bool,
    /// Reminder id → wall-clock time of its last delivery attempt.
    recently_fired: HashMap<String, DateTime<Utc>>,
    /// Reminder id → failed deliveries in a row.
    failure_streaks: HashMap<String, u32>,
    /// Changes from ticks whose write-back failed, replayed before the next delivery.
    unsaved: Vec<Change>,
}

impl ReminderScheduler {
    /// Create a scheduler with default timing.
    pub fn new(
        store: ReminderStore,
        engine: RecurrenceEngine,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            engine,
            notifier,
            clock,
            poll_interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS),
            refire_suppression: chrono::Duration::seconds(DEFAULT_REFIRE_SUPPRESSION_SECS),
            delivery_timeout: None,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            broadcast_mention_default: false,
            recently_fired: HashMap::new(),
            failure_streaks: HashMap::new(),
            unsaved: Vec::new(),
        }
    }

    /// Build a scheduler from the `[scheduler]` config section.
    ///
    /// # Errors
    ///
    /// Returns a config error when the timezone is unknown.
    pub fn from_config(
        config: &SchedulerConfig,
        store: ReminderStore,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let engine =
            RecurrenceEngine::new(config.tz()?).with_min_interval_secs(config.min_interval_secs);
        let mut scheduler = Self::new(store, engine, notifier, clock)
            .with_poll_interval(config.poll_interval())
            .with_refire_suppression_secs(config.refire_suppression_secs)
            .with_max_consecutive_failures(config.max_consecutive_failures)
            .with_broadcast_mention_default(config.broadcast_mention_default);
        if let Some(timeout) = config.delivery_timeout() {
            scheduler = scheduler.with_delivery_timeout(timeout);
        }
        Ok(scheduler)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(10));
        self
    }

    pub fn with_refire_suppression_secs(mut self, secs: u64) -> Self {
        self.refire_suppression = i64::try_from(secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX);
        self
    }

    /// Bound each delivery call. A timeout counts as a failed delivery.
    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = Some(timeout);
        self
    }

    /// Pause a reminder after `max` failures in a row. `0` disables the pause.
    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max;
        self
    }

    pub fn with_broadcast_mention_default(mut self, mention: bool) -> Self {
        self.broadcast_mention_default = mention;
        self
    }

    #[must_use]
    pub fn store(&self) -> &ReminderStore {
        &self.store
    }

    /// Start the scheduler background loop.
    ///
    /// The first tick runs immediately; later ticks follow the poll interval.
    pub fn spawn(mut self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let join = tokio::spawn(async move {
            info!(
                "reminder scheduler started, polling {} every {:?}",
                self.store.path().display(),
                self.poll_interval
            );
            let mut interval = tokio::time::interval(self.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                match self.tick().await {
                    Ok(report) if report.is_idle() => {}
                    Ok(report) => debug!("scheduler tick: {report:?}"),
                    Err(e) => error!("scheduler tick could not persist: {e}"),
                }
            }
            info!("reminder scheduler stopped");
        });

        SchedulerHandle { cancel, join }
    }

    /// Execute one scheduler tick: bootstrap, deliver due reminders, persist.
    ///
    /// # Errors
    ///
    /// Returns an error only when the write-back fails. Delivery failures are
    /// logged per reminder and counted in the report. Changes that could not
    /// be written are kept and written before anything else is delivered.
    pub async fn tick(&mut self) -> Result<TickReport> {
        let now = self.clock.now();
        let mut report = TickReport::default();
        self.forget_stale_suppressions(now);

        if !self.unsaved.is_empty() {
            let unsaved = &self.unsaved;
            self.store
                .update(|stored| merge_changes(stored, unsaved))
                .await?;
            info!("wrote back {} changes from an earlier tick", self.unsaved.len());
            self.unsaved.clear();
            report.persisted = true;
        }

        let snapshot = self.store.snapshot().await;
        let mut changes: Vec<Change> = Vec::new();

        for before in snapshot {
            if !before.is_active() {
                continue;
            }
            let mut after = before.clone();

            if after.next_fire_at.is_none() {
                if self.engine.bootstrap(&mut after, now) {
                    report.bootstrapped += 1;
                } else {
                    report.completed += 1;
                }
            } else if is_exhausted(&after.schedule, after.fire_count) {
                warn!(
                    reminder_id = %after.id,
                    "reminder rescheduled after its last occurrence, finishing it"
                );
                after.finish();
                report.completed += 1;
            }

            if after.is_active() && after.next_fire_at.is_some_and(|next| next <= now) {
                self.process_due(&mut after, now, &mut report).await;
            }

            if after != before {
                changes.push(Change { before, after });
            }
        }

        if !changes.is_empty() {
            if let Err(e) = self
                .store
                .update(|stored| merge_changes(stored, &changes))
                .await
            {
                self.unsaved = changes;
                return Err(e);
            }
            report.persisted = true;
        }

        Ok(report)
    }

    async fn process_due(
        &mut self,
        reminder: &mut Reminder,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        if let Some(last) = self.recently_fired.get(&reminder.id) {
            if now.signed_duration_since(*last) < self.refire_suppression {
                debug!(reminder_id = %reminder.id, "suppressing re-fire");
                report.suppressed += 1;
                return;
            }
        }

        if !reminder.has_valid_destination() {
            warn!(
                reminder_id = %reminder.id,
                "pausing reminder with unusable destination '{}'",
                reminder.destination
            );
            reminder.pause();
            report.paused_invalid += 1;
            return;
        }

        self.recently_fired.insert(reminder.id.clone(), now);
        let notification = Notification {
            reminder_id: reminder.id.clone(),
            destination: reminder.destination.clone(),
            text: reminder.text.clone(),
            broadcast_mention: reminder
                .use_broadcast_mention
                .unwrap_or(self.broadcast_mention_default),
        };

        match self.deliver(notification).await {
            Ok(()) => {
                self.failure_streaks.remove(&reminder.id);
                self.engine.record_fire(reminder, now);
                report.fired += 1;
                if reminder.status == ReminderStatus::Done {
                    info!(
                        reminder_id = %reminder.id,
                        "reminder completed after {} deliveries",
                        reminder.fire_count
                    );
                    report.completed += 1;
                }
            }
            Err(e) => {
                report.failed += 1;
                let streak = self.failure_streaks.entry(reminder.id.clone()).or_insert(0);
                *streak += 1;
                error!(
                    reminder_id = %reminder.id,
                    "delivery failed ({} in a row): {e:#}",
                    *streak
                );

                if self.max_consecutive_failures > 0 && *streak >= self.max_consecutive_failures {
                    warn!(
                        reminder_id = %reminder.id,
                        "pausing reminder after {} consecutive delivery failures",
                        *streak
                    );
                    self.failure_streaks.remove(&reminder.id);
                    reminder.pause();
                    report.paused_failing += 1;
                }
            }
        }
    }

    async fn deliver(&self, notification: Notification) -> anyhow::Result<()> {
        let send = self.notifier.notify(notification);
        match self.delivery_timeout {
            Some(limit) => tokio::time::timeout(limit, send)
                .await
                .map_err(|_| NudgeError::Notify(format!("delivery timed out after {limit:?}")))?,
            None => send.await,
        }
    }

    fn forget_stale_suppressions(&mut self, now: DateTime<Utc>) {
        let window = self.refire_suppression;
        self.recently_fired
            .retain(|_, last| now.signed_duration_since(*last) < window);
    }
}

/// Fold one tick's changes into the collection as currently stored.
///
/// Reminders deleted since the snapshot stay deleted. Delivery counters are
/// always recorded; status and next fire time are only taken when nobody
/// else touched them in the meantime, so a concurrent pause or reschedule
/// wins over the scheduler. A reminder whose schedule is used up by the
/// recorded counters is finished either way.
fn merge_changes(stored: &mut [Reminder], changes: &[Change]) {
    for change in changes {
        let Some(current) = stored.iter_mut().find(|r| r.id == change.after.id) else {
            debug!(reminder_id = %change.after.id, "reminder deleted during tick, dropping update");
            continue;
        };

        current.last_fired_at = current.last_fired_at.max(change.after.last_fired_at);
        current.fire_count = current.fire_count.max(change.after.fire_count);

        let untouched = current.status == change.before.status
            && current.next_fire_at == change.before.next_fire_at
            && current.schedule == change.before.schedule;
        if untouched {
            current.status = change.after.status;
            current.next_fire_at = change.after.next_fire_at;
        } else if current.status != ReminderStatus::Done
            && is_exhausted(&current.schedule, current.fire_count)
        {
            debug!(reminder_id = %current.id, "reminder changed during tick but has no occurrences left");
            current.finish();
        } else {
            debug!(reminder_id = %current.id, "reminder changed during tick, keeping caller's state");
        }
    }
}

/// Running background loop. Dropping the handle leaves the loop running.
#[derive(Debug)]
pub struct SchedulerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub(crate) fn new(cancel: CancellationToken, join: JoinHandle<()>) -> Self {
        Self { cancel, join }
    }

    /// Token that stops the loop when cancelled.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop the loop and wait for the current tick to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            warn!("scheduler task ended abnormally: {e}");
        }
    }
}
