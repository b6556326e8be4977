//! Reminder scheduling.
//!
//! [`runner::ReminderScheduler`] drives stored reminders through the
//! [`recurrence::RecurrenceEngine`]. The calendar-anchored path
//! ([`anchored::AnchoredWatcher`]) runs beside it and deduplicates through
//! [`fire_guard::FireGuard`].

pub mod anchored;
pub mod fire_guard;
pub mod recurrence;
pub mod runner;
pub mod types;

pub use anchored::{AnchoredEvent, AnchoredWatcher, EventSource};
pub use fire_guard::FireGuard;
pub use recurrence::RecurrenceEngine;
pub use runner::{ReminderScheduler, SchedulerHandle, TickReport};
pub use types::{Frequency, RecurrenceRule, Reminder, ReminderStatus, Schedule, Weekday};
