//! Tool-facing reminder operations.
//!
//! Every operation is a single [`ReminderStore::update`] transaction (or a
//! locked snapshot for reads). "Not found" is an outcome, never an error;
//! errors are reserved for requests that cannot be interpreted.

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::error::{NudgeError, Result};
use crate::scheduler::recurrence::RecurrenceEngine;
use crate::scheduler::types::{RecurrenceRule, Reminder, ReminderStatus, Schedule, Weekday};
use crate::store::ReminderStore;
use chrono::{DateTime, Duration, Utc};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Delay used when a reminder is created without any timing.
const DEFAULT_DELAY_MINUTES: i64 = 5;

/// Shortest snooze, whatever the caller asks for.
const MIN_SNOOZE_MILLIS: i64 = 60_000;

/// Unit for `every N <unit>` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Minute,
    Hour,
    Day,
}

impl IntervalUnit {
    #[must_use]
    pub fn secs(self) -> u64 {
        match self {
            Self::Minute => 60,
            Self::Hour => 3600,
            Self::Day => 86_400,
        }
    }
}

impl FromStr for IntervalUnit {
    type Err = NudgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().trim_end_matches('s') {
            "minute" | "min" | "m" => Ok(Self::Minute),
            "hour" | "h" => Ok(Self::Hour),
            "day" | "d" => Ok(Self::Day),
            other => Err(NudgeError::InvalidInput(format!(
                "unknown interval unit '{other}'"
            ))),
        }
    }
}

/// How the caller described the timing of a new reminder.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScheduleSpec {
    /// No timing given: fire once, a few minutes from now.
    #[default]
    Unspecified,
    /// Fire once at an explicit instant.
    At(DateTime<Utc>),
    /// Fire every `value` units.
    Every {
        value: u64,
        unit: IntervalUnit,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
    /// Fire on a calendar rule, given either as rule text or as
    /// weekdays plus a time of day (07:00 when the time is omitted).
    Calendar {
        rule: Option<String>,
        weekdays: Vec<Weekday>,
        hour: Option<u8>,
        minute: Option<u8>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        count: Option<u32>,
        /// Use only the first matching occurrence.
        only_next_occurrence: bool,
    },
}

/// Request for [`ReminderService::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateReminder {
    pub text: String,
    pub schedule: ScheduleSpec,
    pub destination: String,
    pub created_by: String,
    pub use_broadcast_mention: Option<bool>,
    pub tags: Vec<String>,
    pub due_hint: Option<String>,
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedReminder {
    pub id: String,
    /// Persisted schedule kind.
    pub kind: &'static str,
    pub preview_next_fire: Option<DateTime<Utc>>,
}

/// Fields to overwrite on an existing reminder. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct ReminderPatch {
    pub text: Option<String>,
    pub destination: Option<String>,
    pub schedule: Option<Schedule>,
    pub status: Option<ReminderStatus>,
    pub use_broadcast_mention: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub due_hint: Option<String>,
}

impl ReminderPatch {
    #[must_use]
    pub fn status(status: ReminderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome {
    Ok,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnoozeOutcome {
    Snoozed { next_fire_at: DateTime<Utc> },
    NotFound,
    /// Paused or finished reminders cannot be snoozed.
    NotActive,
}

/// Which reminders `list` returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListFilter {
    ByDestination(String),
    ByCreator(String),
    All,
}

impl ListFilter {
    fn matches(&self, reminder: &Reminder) -> bool {
        match self {
            Self::ByDestination(dest) => reminder.destination == *dest,
            Self::ByCreator(creator) => reminder.created_by == *creator,
            Self::All => true,
        }
    }
}

/// Reminder operations exposed to the intent-routing layer.
#[derive(Clone)]
pub struct ReminderService {
    store: ReminderStore,
    engine: RecurrenceEngine,
    clock: Arc<dyn Clock>,
    list_limit: usize,
}

impl ReminderService {
    pub fn new(store: ReminderStore, engine: RecurrenceEngine, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            engine,
            clock,
            list_limit: 50,
        }
    }

    /// # Errors
    ///
    /// Returns a config error when the timezone is unknown.
    pub fn from_config(
        config: &SchedulerConfig,
        store: ReminderStore,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let engine =
            RecurrenceEngine::new(config.tz()?).with_min_interval_secs(config.min_interval_secs);
        Ok(Self::new(store, engine, clock).with_list_limit(config.list_limit))
    }

    pub fn with_list_limit(mut self, limit: usize) -> Self {
        self.list_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn store(&self) -> &ReminderStore {
        &self.store
    }

    /// Create and schedule a reminder.
    ///
    /// # Errors
    ///
    /// [`NudgeError::InvalidInput`] for empty text, a malformed schedule, or
    /// a schedule with no future occurrence.
    pub async fn create(&self, request: CreateReminder) -> Result<CreatedReminder> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(NudgeError::InvalidInput("text is required".to_owned()));
        }

        let now = self.clock.now();
        let schedule = self.build_schedule(request.schedule, now)?;
        let mut reminder = Reminder::new(
            request.destination,
            request.created_by,
            now,
            text,
            schedule,
        );
        reminder.use_broadcast_mention = request.use_broadcast_mention;
        reminder.tags = request.tags;
        reminder.due_hint = request.due_hint;

        if !self.engine.bootstrap(&mut reminder, now) {
            return Err(NudgeError::InvalidInput(format!(
                "schedule '{}' has no future occurrence",
                reminder.schedule
            )));
        }

        let created = CreatedReminder {
            id: reminder.id.clone(),
            kind: reminder.schedule.kind(),
            preview_next_fire: reminder.next_fire_at,
        };
        info!(
            reminder_id = %created.id,
            "created {} reminder, next at {:?}",
            created.kind,
            created.preview_next_fire
        );
        self.store.update(|list| list.push(reminder)).await?;
        Ok(created)
    }

    /// Overwrite fields of an existing reminder.
    ///
    /// Moving to `active` from another state, or replacing the schedule of
    /// an active reminder, recomputes the next fire time from now.
    ///
    /// # Errors
    ///
    /// [`NudgeError::InvalidInput`] for empty text or an invalid schedule.
    pub async fn patch(&self, id: &str, patch: ReminderPatch) -> Result<OpOutcome> {
        if patch.text.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(NudgeError::InvalidInput("text cannot be empty".to_owned()));
        }
        if let Some(schedule) = &patch.schedule {
            validate_schedule(schedule)?;
        }

        let now = self.clock.now();
        let engine = self.engine;
        let outcome = self
            .store
            .update(|list| {
                let Some(reminder) = list.iter_mut().find(|r| r.id == id) else {
                    return OpOutcome::NotFound;
                };
                apply_patch(&engine, reminder, patch, now);
                OpOutcome::Ok
            })
            .await?;

        debug!(reminder_id = %id, "patch: {outcome:?}");
        Ok(outcome)
    }

    /// # Errors
    ///
    /// Only store write failures.
    pub async fn pause(&self, id: &str) -> Result<OpOutcome> {
        self.patch(id, ReminderPatch::status(ReminderStatus::Paused))
            .await
    }

    /// Reactivate a reminder, scheduling it from now.
    ///
    /// # Errors
    ///
    /// Only store write failures.
    pub async fn resume(&self, id: &str) -> Result<OpOutcome> {
        self.patch(id, ReminderPatch::status(ReminderStatus::Active))
            .await
    }

    /// Remove a reminder. Deleting an unknown id is not an error.
    ///
    /// # Errors
    ///
    /// Only store write failures.
    pub async fn delete(&self, id: &str) -> Result<OpOutcome> {
        let removed = self
            .store
            .update(|list| {
                let before = list.len();
                list.retain(|r| r.id != id);
                before - list.len()
            })
            .await?;
        debug!(reminder_id = %id, "deleted {removed} reminder(s)");
        Ok(OpOutcome::Ok)
    }

    /// Reminders matching `filter`, in stored order, capped at the list limit.
    pub async fn list(&self, filter: &ListFilter) -> Vec<Reminder> {
        self.store
            .snapshot()
            .await
            .into_iter()
            .filter(|r| filter.matches(r))
            .take(self.list_limit)
            .collect()
    }

    pub async fn get(&self, id: &str) -> Option<Reminder> {
        self.store.snapshot().await.into_iter().find(|r| r.id == id)
    }

    /// Push the next fire time back by `minutes` (at least one minute),
    /// counting from the current next fire time, or from now when unset.
    ///
    /// # Errors
    ///
    /// [`NudgeError::InvalidInput`] when `minutes` is not a finite number or
    /// the result is out of range.
    pub async fn snooze(&self, id: &str, minutes: f64) -> Result<SnoozeOutcome> {
        let delay = snooze_delay(minutes)?;
        let now = self.clock.now();

        self.store
            .update(|list| {
                let Some(reminder) = list.iter_mut().find(|r| r.id == id) else {
                    return Ok(SnoozeOutcome::NotFound);
                };
                if !reminder.is_active() {
                    return Ok(SnoozeOutcome::NotActive);
                }
                let base = reminder.next_fire_at.unwrap_or(now);
                let next = base.checked_add_signed(delay).ok_or_else(|| {
                    NudgeError::InvalidInput(format!("snooze of {minutes} minutes is out of range"))
                })?;
                reminder.next_fire_at = Some(next);
                reminder.updated_at = Some(now);
                info!(reminder_id = %reminder.id, "snoozed until {next}");
                Ok(SnoozeOutcome::Snoozed { next_fire_at: next })
            })
            .await?
    }

    fn build_schedule(&self, spec: ScheduleSpec, now: DateTime<Utc>) -> Result<Schedule> {
        let schedule = match spec {
            ScheduleSpec::Unspecified => Schedule::Once {
                at: now + Duration::minutes(DEFAULT_DELAY_MINUTES),
            },
            ScheduleSpec::At(at) => Schedule::Once { at },
            ScheduleSpec::Every {
                value,
                unit,
                start,
                end,
            } => {
                if value == 0 {
                    return Err(NudgeError::InvalidInput(
                        "interval must be positive".to_owned(),
                    ));
                }
                let secs = value.checked_mul(unit.secs()).ok_or_else(|| {
                    NudgeError::InvalidInput(format!("interval of {value} {unit:?}s is too long"))
                })?;
                Schedule::Interval {
                    every_duration: self.engine.effective_interval_secs(secs),
                    start,
                    end,
                }
            }
            ScheduleSpec::Calendar {
                rule,
                weekdays,
                hour,
                minute,
                start,
                end,
                count,
                only_next_occurrence,
            } => {
                let rule = match rule.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
                    Some(text) => text.parse::<RecurrenceRule>()?,
                    None => {
                        let hour = hour.unwrap_or(crate::scheduler::types::DEFAULT_RULE_HOUR);
                        let minute = minute.unwrap_or(0);
                        if weekdays.is_empty() {
                            RecurrenceRule::daily(hour, minute)
                        } else {
                            RecurrenceRule::weekly(weekdays, hour, minute)
                        }
                    }
                };
                if only_next_occurrence {
                    Schedule::WindowedRecurring {
                        rule,
                        start,
                        end,
                        count,
                    }
                } else {
                    Schedule::Recurring {
                        rule,
                        start,
                        end,
                        count,
                    }
                }
            }
        };
        validate_schedule(&schedule)?;
        Ok(schedule)
    }
}

fn validate_schedule(schedule: &Schedule) -> Result<()> {
    match schedule {
        Schedule::Once { .. } => Ok(()),
        Schedule::Interval {
            every_duration,
            start,
            end,
        } => {
            if *every_duration == 0 {
                return Err(NudgeError::InvalidInput(
                    "interval must be positive".to_owned(),
                ));
            }
            validate_window(*start, *end)
        }
        Schedule::Recurring {
            rule,
            start,
            end,
            count,
        }
        | Schedule::WindowedRecurring {
            rule,
            start,
            end,
            count,
        } => {
            rule.validate()?;
            if *count == Some(0) {
                return Err(NudgeError::InvalidInput(
                    "count must be at least 1".to_owned(),
                ));
            }
            validate_window(*start, *end)
        }
    }
}

fn validate_window(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<()> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => Err(NudgeError::InvalidInput(format!(
            "end {end} is before start {start}"
        ))),
        _ => Ok(()),
    }
}

fn apply_patch(
    engine: &RecurrenceEngine,
    reminder: &mut Reminder,
    patch: ReminderPatch,
    now: DateTime<Utc>,
) {
    let was_active = reminder.is_active();
    let finished = reminder.status == ReminderStatus::Done;
    let mut reschedule = false;

    if let Some(text) = patch.text {
        reminder.text = text.trim().to_owned();
    }
    if let Some(destination) = patch.destination {
        reminder.destination = destination;
    }
    if let Some(schedule) = patch.schedule {
        if finished {
            debug!(reminder_id = %reminder.id, "ignoring schedule change on finished reminder");
        } else {
            reminder.schedule = schedule;
            reschedule = true;
        }
    }
    if let Some(mention) = patch.use_broadcast_mention {
        reminder.use_broadcast_mention = Some(mention);
    }
    if let Some(tags) = patch.tags {
        reminder.tags = tags;
    }
    if let Some(hint) = patch.due_hint {
        reminder.due_hint = Some(hint);
    }

    // `done` is terminal.
    match patch.status.filter(|_| !finished) {
        Some(ReminderStatus::Paused) => reminder.pause(),
        Some(ReminderStatus::Done) => reminder.finish(),
        Some(ReminderStatus::Active) => {
            reminder.status = ReminderStatus::Active;
            reschedule |= !was_active;
        }
        None => {}
    }

    if reschedule && reminder.is_active() {
        reminder.next_fire_at = None;
        engine.bootstrap(reminder, now);
    }
    reminder.updated_at = Some(now);
}

fn snooze_delay(minutes: f64) -> Result<Duration> {
    if !minutes.is_finite() {
        return Err(NudgeError::InvalidInput(format!(
            "snooze minutes must be a number, got {minutes}"
        )));
    }
    let requested = (minutes * 60_000.0).floor();
    if requested > i64::MAX as f64 {
        return Err(NudgeError::InvalidInput(format!(
            "snooze of {minutes} minutes is out of range"
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    let millis = (requested as i64).max(MIN_SNOOZE_MILLIS);
    Duration::try_milliseconds(millis).ok_or_else(|| {
        NudgeError::InvalidInput(format!("snooze of {minutes} minutes is out of range"))
    })
}
