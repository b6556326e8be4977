//! Durable state: atomic JSON files and the reminder collection.

pub mod atomic;
pub mod reminders;

pub use reminders::ReminderStore;
