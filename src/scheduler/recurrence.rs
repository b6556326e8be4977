//! Next-occurrence computation.
//!
//! [`RecurrenceEngine`] is pure: it never reads the clock, and identical
//! inputs always produce identical outputs. Wall-clock rules are evaluated
//! in the engine's timezone; instants are exchanged as UTC.

use crate::scheduler::types::{Frequency, RecurrenceRule, Reminder, Schedule};
use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// Smallest interval an `Interval` schedule may use.
pub const MIN_INTERVAL_SECS: u64 = 60;

/// Weekly rules search this many days ahead before giving up.
const WEEKLY_SEARCH_DAYS: u64 = 14;

/// Computes when schedules fire next.
#[derive(Debug, Clone, Copy)]
pub struct RecurrenceEngine {
    tz: Tz,
    min_interval_secs: u64,
}

impl RecurrenceEngine {
    /// Engine evaluating wall-clock rules in `tz`.
    #[must_use]
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            min_interval_secs: MIN_INTERVAL_SECS,
        }
    }

    /// Override the interval floor (never below one second).
    #[must_use]
    pub fn with_min_interval_secs(mut self, secs: u64) -> Self {
        self.min_interval_secs = secs.max(1);
        self
    }

    #[must_use]
    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Interval length after applying the floor.
    #[must_use]
    pub fn effective_interval_secs(&self, every_duration: u64) -> u64 {
        every_duration.max(self.min_interval_secs)
    }

    /// Next occurrence strictly after the occurrence just processed at
    /// `anchor`, or `None` when the schedule is exhausted.
    ///
    /// `Once` always yields `None`: its single occurrence is set at creation.
    #[must_use]
    pub fn compute_next(
        &self,
        schedule: &Schedule,
        anchor: DateTime<Utc>,
        last_fired_at: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        if schedule.end().is_some_and(|end| anchor > end) {
            return None;
        }

        match schedule {
            Schedule::Once { .. } => None,
            Schedule::Interval {
                every_duration,
                start,
                end,
            } => {
                let secs = i64::try_from(self.effective_interval_secs(*every_duration)).ok()?;
                let base = last_fired_at.unwrap_or(anchor);
                let mut next = base.checked_add_signed(Duration::seconds(secs))?;
                if let Some(start) = start {
                    if next < *start {
                        next = *start;
                    }
                }
                within_end(next, *end)
            }
            Schedule::Recurring {
                rule, start, end, ..
            } => self
                .next_rule_occurrence(rule, anchor, *start)
                .and_then(|next| within_end(next, *end)),
            Schedule::WindowedRecurring {
                rule, start, end, ..
            } => {
                if last_fired_at.is_some() {
                    return None;
                }
                self.next_rule_occurrence(rule, anchor, *start)
                    .and_then(|next| within_end(next, *end))
            }
        }
    }

    /// First fire time for a reminder that is active but unscheduled
    /// (new, resumed, or rescheduled), anchored at `now`.
    #[must_use]
    pub fn bootstrap_next(&self, reminder: &Reminder, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if is_exhausted(&reminder.schedule, reminder.fire_count) {
            return None;
        }

        match &reminder.schedule {
            Schedule::Once { at } => (reminder.fire_count == 0).then_some(*at),
            Schedule::Interval { start, end, .. } => match start {
                Some(start) if *start > now && reminder.fire_count == 0 => {
                    within_end(*start, *end)
                }
                _ => self.compute_next(&reminder.schedule, now, None),
            },
            Schedule::Recurring { .. } => self.compute_next(&reminder.schedule, now, None),
            Schedule::WindowedRecurring { .. } => {
                if reminder.fire_count > 0 {
                    None
                } else {
                    self.compute_next(&reminder.schedule, now, None)
                }
            }
        }
    }

    /// Give an active reminder its next fire time, or finish it when the
    /// schedule has nothing left. Returns `true` when still active.
    pub fn bootstrap(&self, reminder: &mut Reminder, now: DateTime<Utc>) -> bool {
        match self.bootstrap_next(reminder, now) {
            Some(next) => {
                reminder.next_fire_at = Some(next);
                true
            }
            None => {
                reminder.finish();
                false
            }
        }
    }

    /// Record one delivered occurrence and advance the reminder.
    pub fn record_fire(&self, reminder: &mut Reminder, fired_at: DateTime<Utc>) {
        reminder.last_fired_at = Some(fired_at);
        reminder.fire_count = reminder.fire_count.saturating_add(1);

        let next = if is_exhausted(&reminder.schedule, reminder.fire_count) {
            None
        } else {
            self.compute_next(&reminder.schedule, fired_at, Some(fired_at))
        };

        match next {
            Some(next) => reminder.next_fire_at = Some(next),
            None => reminder.finish(),
        }
    }

    fn next_rule_occurrence(
        &self,
        rule: &RecurrenceRule,
        anchor: DateTime<Utc>,
        start: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        // Never re-fire the minute that was just processed.
        let mut reference = truncate_to_minute(anchor.checked_add_signed(Duration::minutes(1))?)?;
        if let Some(start) = start {
            if reference < start {
                reference = start;
            }
        }
        let today = reference.with_timezone(&self.tz).date_naive();

        match rule.freq {
            Frequency::Daily => {
                let candidate = self.at_local(today, rule)?;
                if candidate < reference {
                    self.at_local(today.succ_opt()?, rule)
                } else {
                    Some(candidate)
                }
            }
            Frequency::Weekly => (0..WEEKLY_SEARCH_DAYS).find_map(|offset| {
                let day = today.checked_add_days(chrono::Days::new(offset))?;
                let accepted = rule.weekdays.is_empty()
                    || rule.weekdays.iter().any(|d| d.to_chrono() == day.weekday());
                if !accepted {
                    return None;
                }
                self.at_local(day, rule)
                    .filter(|candidate| *candidate >= reference)
            }),
        }
    }

    /// `date` at the rule's wall-clock time in the engine timezone.
    fn at_local(&self, date: NaiveDate, rule: &RecurrenceRule) -> Option<DateTime<Utc>> {
        let naive = date.and_hms_opt(u32::from(rule.hour), u32::from(rule.minute), 0)?;
        let local = match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(t) => t,
            LocalResult::Ambiguous(earliest, _) => earliest,
            // Skipped by a DST jump: use the first valid instant after it.
            LocalResult::None => self
                .tz
                .from_local_datetime(&naive.checked_add_signed(Duration::hours(1))?)
                .earliest()?,
        };
        Some(local.with_timezone(&Utc))
    }
}

/// `true` when a rule-based schedule has used up its `count`.
#[must_use]
pub fn is_exhausted(schedule: &Schedule, fire_count: u32) -> bool {
    match schedule {
        Schedule::Once { .. } => fire_count >= 1,
        _ => schedule.count().is_some_and(|count| fire_count >= count),
    }
}

fn within_end(next: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match end {
        Some(end) if next > end => None,
        _ => Some(next),
    }
}

fn truncate_to_minute(instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let secs = instant.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(60), 0)
}
