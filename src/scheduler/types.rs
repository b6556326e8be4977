//! Reminder records and schedule definitions.
//!
//! These are the persisted shapes: field names serialize in camelCase and
//! the schedule is tagged by `kind`.

use crate::error::{NudgeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Day of week accepted by weekly rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Weekday {
    #[serde(rename = "MO")]
    Mon,
    #[serde(rename = "TU")]
    Tue,
    #[serde(rename = "WE")]
    Wed,
    #[serde(rename = "TH")]
    Thu,
    #[serde(rename = "FR")]
    Fri,
    #[serde(rename = "SA")]
    Sat,
    #[serde(rename = "SU")]
    Sun,
}

impl Weekday {
    /// All days, Monday first.
    pub const ALL: [Weekday; 7] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];

    /// Two-letter RRULE code (`MO`, `TU`, ...).
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Mon => "MO",
            Self::Tue => "TU",
            Self::Wed => "WE",
            Self::Thu => "TH",
            Self::Fri => "FR",
            Self::Sat => "SA",
            Self::Sun => "SU",
        }
    }

    /// Parse a two-letter code, case-insensitively.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|day| day.code().eq_ignore_ascii_case(code.trim()))
    }

    /// Matching [`chrono::Weekday`].
    #[must_use]
    pub fn to_chrono(self) -> chrono::Weekday {
        match self {
            Self::Mon => chrono::Weekday::Mon,
            Self::Tue => chrono::Weekday::Tue,
            Self::Wed => chrono::Weekday::Wed,
            Self::Thu => chrono::Weekday::Thu,
            Self::Fri => chrono::Weekday::Fri,
            Self::Sat => chrono::Weekday::Sat,
            Self::Sun => chrono::Weekday::Sun,
        }
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Mon => Self::Mon,
            chrono::Weekday::Tue => Self::Tue,
            chrono::Weekday::Wed => Self::Wed,
            chrono::Weekday::Thu => Self::Thu,
            chrono::Weekday::Fri => Self::Fri,
            chrono::Weekday::Sat => Self::Sat,
            chrono::Weekday::Sun => Self::Sun,
        }
    }
}

/// Recurrence frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Daily,
    Weekly,
}

/// Hour used when a rule omits `BYHOUR`.
pub const DEFAULT_RULE_HOUR: u8 = 7;

/// Simplified calendar recurrence: a daily or weekly wall-clock time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub freq: Frequency,
    /// Hour of day (0-23) in the scheduling timezone.
    pub hour: u8,
    /// Minute of hour (0-59).
    pub minute: u8,
    /// Accepted days for weekly rules. Empty means every day.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weekdays: Vec<Weekday>,
}

impl RecurrenceRule {
    /// Every day at `hour:minute`.
    #[must_use]
    pub fn daily(hour: u8, minute: u8) -> Self {
        Self {
            freq: Frequency::Daily,
            hour,
            minute,
            weekdays: Vec::new(),
        }
    }

    /// On the given weekdays at `hour:minute`.
    #[must_use]
    pub fn weekly(weekdays: Vec<Weekday>, hour: u8, minute: u8) -> Self {
        Self {
            freq: Frequency::Weekly,
            hour,
            minute,
            weekdays,
        }
    }

    /// Reject out-of-range clock fields.
    pub fn validate(&self) -> Result<()> {
        if self.hour > 23 || self.minute > 59 {
            return Err(NudgeError::InvalidInput(format!(
                "rule time {:02}:{:02} is out of range",
                self.hour, self.minute
            )));
        }
        Ok(())
    }
}

impl fmt::Display for RecurrenceRule {
    /// Formats as the simplified RRULE text, e.g.
    /// `FREQ=WEEKLY;BYDAY=MO,WE;BYHOUR=16;BYMINUTE=0`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.freq {
            Frequency::Daily => write!(f, "FREQ=DAILY")?,
            Frequency::Weekly => {
                write!(f, "FREQ=WEEKLY")?;
                if !self.weekdays.is_empty() {
                    let days: Vec<&str> = self.weekdays.iter().map(|d| d.code()).collect();
                    write!(f, ";BYDAY={}", days.join(","))?;
                }
            }
        }
        write!(f, ";BYHOUR={};BYMINUTE={}", self.hour, self.minute)
    }
}

impl FromStr for RecurrenceRule {
    type Err = NudgeError;

    fn from_str(text: &str) -> Result<Self> {
        let mut freq = None;
        let mut hour = None;
        let mut minute = None;
        let mut weekdays = Vec::new();

        for part in text.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((key, value)) = part.split_once('=') else {
                return Err(NudgeError::InvalidInput(format!(
                    "malformed rule segment '{part}'"
                )));
            };
            match key.trim().to_ascii_uppercase().as_str() {
                "FREQ" => {
                    freq = Some(match value.trim().to_ascii_uppercase().as_str() {
                        "DAILY" => Frequency::Daily,
                        "WEEKLY" => Frequency::Weekly,
                        other => {
                            return Err(NudgeError::InvalidInput(format!(
                                "unsupported frequency '{other}'"
                            )));
                        }
                    });
                }
                "BYDAY" => {
                    for code in value.split(',').filter(|c| !c.trim().is_empty()) {
                        let day = Weekday::from_code(code).ok_or_else(|| {
                            NudgeError::InvalidInput(format!("unknown weekday '{code}'"))
                        })?;
                        if !weekdays.contains(&day) {
                            weekdays.push(day);
                        }
                    }
                }
                "BYHOUR" => hour = Some(parse_clock_field(value, "BYHOUR")?),
                "BYMINUTE" => minute = Some(parse_clock_field(value, "BYMINUTE")?),
                // Unsupported RRULE parts are ignored rather than rejected.
                _ => {}
            }
        }

        let freq = freq.ok_or_else(|| NudgeError::InvalidInput("rule has no FREQ".to_owned()))?;
        let rule = Self {
            freq,
            hour: hour.unwrap_or(DEFAULT_RULE_HOUR),
            minute: minute.unwrap_or(0),
            weekdays: if freq == Frequency::Weekly {
                weekdays
            } else {
                Vec::new()
            },
        };
        rule.validate()?;
        Ok(rule)
    }
}

fn parse_clock_field(value: &str, name: &str) -> Result<u8> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|e| NudgeError::InvalidInput(format!("{name} '{value}' is not a number: {e}")))
}

/// When a reminder fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Schedule {
    /// Fire once at `at`.
    Once { at: DateTime<Utc> },
    /// Fire every `every_duration` seconds.
    Interval {
        /// Interval length in seconds.
        every_duration: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end: Option<DateTime<Utc>>,
    },
    /// Fire on a daily/weekly wall-clock rule.
    Recurring {
        rule: RecurrenceRule,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<u32>,
    },
    /// Like `Recurring`, but only the first matching occurrence is used.
    WindowedRecurring {
        rule: RecurrenceRule,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<u32>,
    },
}

impl Schedule {
    /// Persisted `kind` tag.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Once { .. } => "once",
            Self::Interval { .. } => "interval",
            Self::Recurring { .. } => "recurring",
            Self::WindowedRecurring { .. } => "windowedRecurring",
        }
    }

    /// Upper bound after which no occurrence is produced.
    #[must_use]
    pub fn end(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Once { .. } => None,
            Self::Interval { end, .. }
            | Self::Recurring { end, .. }
            | Self::WindowedRecurring { end, .. } => *end,
        }
    }

    /// Occurrence cap for rule-based schedules.
    #[must_use]
    pub fn count(&self) -> Option<u32> {
        match self {
            Self::Recurring { count, .. } | Self::WindowedRecurring { count, .. } => *count,
            _ => None,
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Once { at } => write!(f, "once at {}", at.to_rfc3339()),
            Self::Interval { every_duration, .. } => {
                let secs = *every_duration;
                if secs >= 86_400 && secs % 86_400 == 0 {
                    write!(f, "every {} days", secs / 86_400)
                } else if secs >= 3600 && secs % 3600 == 0 {
                    write!(f, "every {} hours", secs / 3600)
                } else {
                    write!(f, "every {} minutes", secs / 60)
                }
            }
            Self::Recurring { rule, .. } => write_rule(f, rule),
            Self::WindowedRecurring { rule, .. } => {
                write!(f, "next ")?;
                write_rule(f, rule)
            }
        }
    }
}

fn write_rule(f: &mut fmt::Formatter<'_>, rule: &RecurrenceRule) -> fmt::Result {
    match rule.freq {
        Frequency::Daily => write!(f, "daily at {:02}:{:02}", rule.hour, rule.minute),
        Frequency::Weekly if rule.weekdays.is_empty() => {
            write!(f, "every day at {:02}:{:02}", rule.hour, rule.minute)
        }
        Frequency::Weekly => {
            let days: Vec<&str> = rule.weekdays.iter().map(|d| d.code()).collect();
            write!(
                f,
                "weekly on {} at {:02}:{:02}",
                days.join(","),
                rule.hour,
                rule.minute
            )
        }
    }
}

/// Reminder lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    Active,
    Paused,
    Done,
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// A user-defined reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    /// Unique, immutable identifier.
    pub id: String,
    /// Opaque channel handle owned by the messaging layer.
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Delivered verbatim.
    pub text: String,
    pub schedule: Schedule,
    pub status: ReminderStatus,
    #[serde(default)]
    pub last_fired_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_fire_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fire_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_broadcast_mention: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_hint: Option<String>,
}

impl Reminder {
    /// Create an active reminder that has not been scheduled yet.
    pub fn new(
        destination: impl Into<String>,
        created_by: impl Into<String>,
        created_at: DateTime<Utc>,
        text: impl Into<String>,
        schedule: Schedule,
    ) -> Self {
        Self {
            id: new_reminder_id(),
            destination: destination.into(),
            created_by: created_by.into(),
            created_at,
            updated_at: None,
            text: text.into(),
            schedule,
            status: ReminderStatus::Active,
            last_fired_at: None,
            next_fire_at: None,
            fire_count: 0,
            use_broadcast_mention: None,
            tags: Vec::new(),
            due_hint: None,
        }
    }

    /// `true` when the destination looks deliverable.
    #[must_use]
    pub fn has_valid_destination(&self) -> bool {
        let dest = self.destination.trim();
        !dest.is_empty() && !dest.chars().any(char::is_whitespace)
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ReminderStatus::Active
    }

    /// Move to `paused`, clearing the next fire time.
    pub fn pause(&mut self) {
        self.status = ReminderStatus::Paused;
        self.next_fire_at = None;
    }

    /// Move to `done`, clearing the next fire time.
    pub fn finish(&mut self) {
        self.status = ReminderStatus::Done;
        self.next_fire_at = None;
    }
}

/// Fresh reminder identifier.
#[must_use]
pub fn new_reminder_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
