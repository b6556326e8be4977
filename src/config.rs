//! Configuration types for the reminder scheduler.
//!
//! The library never reads configuration from the environment; callers
//! (the `nudge` binary, or an embedding host) parse a [`NudgeConfig`] and
//! hand the relevant sections to the components they build.

use crate::error::{NudgeError, Result};
use crate::scheduler::anchored::AnchoredEvent;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NudgeConfig {
    /// Polling loop and reminder policy.
    pub scheduler: SchedulerConfig,
    /// Where state files live.
    pub storage: StorageConfig,
    /// Calendar-anchored "T-minus" notifications.
    pub anchored: AnchoredConfig,
}

/// Scheduler loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks.
    pub poll_interval_secs: u64,
    /// Floor applied to interval schedules.
    pub min_interval_secs: u64,
    /// A reminder delivered within this many seconds is not delivered again.
    pub refire_suppression_secs: u64,
    /// IANA timezone used for calendar rules and the fire-guard date.
    pub timezone: String,
    /// Maximum number of reminders returned by `list`.
    pub list_limit: usize,
    /// Mention value used when a reminder does not set one.
    pub broadcast_mention_default: bool,
    /// Pause a reminder after this many failed deliveries in a row (0 = never).
    pub max_consecutive_failures: u32,
    /// Upper bound on a single delivery call (None = unbounded).
    pub delivery_timeout_secs: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            min_interval_secs: 60,
            refire_suppression_secs: 20,
            timezone: "Asia/Jakarta".to_owned(),
            list_limit: 50,
            broadcast_mention_default: false,
            max_consecutive_failures: 5,
            delivery_timeout_secs: None,
        }
    }
}

impl SchedulerConfig {
    /// Parsed [`timezone`](Self::timezone).
    ///
    /// # Errors
    ///
    /// Returns [`NudgeError::Config`] for an unknown timezone name.
    pub fn tz(&self) -> Result<Tz> {
        parse_timezone(&self.timezone)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    #[must_use]
    pub fn delivery_timeout(&self) -> Option<Duration> {
        self.delivery_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// State file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for state files (None = caller's default, see [`crate::dirs`]).
    pub data_dir: Option<PathBuf>,
    /// Reminder collection file name, relative to the data directory.
    pub reminders_file: String,
    /// Fire-guard ledger file name, relative to the data directory.
    pub fire_guard_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            reminders_file: "reminders.json".to_owned(),
            fire_guard_file: "cron.state.json".to_owned(),
        }
    }
}

impl StorageConfig {
    /// Configured data directory, or `fallback` when unset.
    #[must_use]
    pub fn resolve_data_dir(&self, fallback: &Path) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| fallback.to_path_buf())
    }

    #[must_use]
    pub fn reminders_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.reminders_file)
    }

    #[must_use]
    pub fn fire_guard_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.fire_guard_file)
    }
}

/// Anchored watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchoredConfig {
    pub enabled: bool,
    /// Seconds between anchored checks.
    pub poll_interval_secs: u64,
    /// How many minutes before an event's start the notification goes out.
    pub lead_minutes: u32,
    /// Fixed daily or weekly events to announce.
    pub events: Vec<AnchoredEvent>,
}

impl Default for AnchoredConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_secs: 60,
            lead_minutes: 15,
            events: Vec::new(),
        }
    }
}

impl AnchoredConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl NudgeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| NudgeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| NudgeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`NudgeError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.scheduler.tz()?;
        if self.scheduler.list_limit == 0 {
            return Err(NudgeError::Config(
                "scheduler.list_limit must be at least 1".to_owned(),
            ));
        }
        if self.storage.reminders_file == self.storage.fire_guard_file {
            return Err(NudgeError::Config(
                "storage.reminders_file and storage.fire_guard_file must differ".to_owned(),
            ));
        }
        for event in &self.anchored.events {
            event.validate()?;
        }
        Ok(())
    }
}

/// Parse an IANA timezone name.
///
/// # Errors
///
/// Returns [`NudgeError::Config`] for unknown names.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| NudgeError::Config(format!("unknown timezone '{name}': {e}")))
}
