//! Nudge: background reminder scheduler.
//!
//! Stores user-defined reminders with one-shot, interval and calendar
//! recurrence, delivers each due occurrence once, and persists progress
//! with crash-safe, lock-guarded writes.
//!
//! # Architecture
//!
//! - **Store**: JSON collection written atomically under an in-process path lock
//! - **Recurrence**: pure next-occurrence computation in a configured timezone
//! - **Scheduler**: periodic loop that bootstraps, delivers and writes back
//! - **Anchored watcher**: per-minute "T-minus" notifications deduplicated by the fire guard
//! - **Service**: create/patch/pause/resume/delete/list/snooze for the tool layer
//!
//! Delivery is delegated to a [`notify::Notifier`]; time comes from a [`clock::Clock`].

pub mod clock;
pub mod config;
pub mod dirs;
pub mod error;
pub mod lock;
pub mod notify;
pub mod scheduler;
pub mod service;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::NudgeConfig;
pub use error::{NudgeError, Result};
pub use lock::PathLock;
pub use notify::{Notification, Notifier};
pub use scheduler::{RecurrenceEngine, Reminder, ReminderScheduler, Schedule};
pub use service::{ReminderService, ScheduleSpec};
pub use store::ReminderStore;
