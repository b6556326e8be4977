//! Calendar-anchored "T-minus" notifications.
//!
//! Some notifications hang off fixed events rather than stored reminders:
//! "Algorithms starts in 15 minutes" for a class at 08:00 every Monday.
//! [`AnchoredWatcher`] checks once a minute whether the current minute is
//! exactly `start - lead` for any event and delivers it. Because the check
//! is a minute-equality test driven by a poll that may run more than once
//! inside the same minute, every delivery is recorded in the [`FireGuard`].

use crate::clock::Clock;
use crate::config::AnchoredConfig;
use crate::error::{NudgeError, Result};
use crate::notify::{Notification, Notifier};
use crate::scheduler::fire_guard::FireGuard;
use crate::scheduler::runner::SchedulerHandle;
use crate::scheduler::types::Weekday;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A fixed event that gets a heads-up notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchoredEvent {
    pub destination: String,
    /// Event name, also part of the fire-guard signature.
    pub subject: String,
    /// Local start time, written `"HH:MM"`.
    #[serde(with = "clock_time")]
    pub start: NaiveTime,
    /// Days the event happens on. Empty means every day.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weekdays: Vec<Weekday>,
    /// Message override; a generic heads-up is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl AnchoredEvent {
    #[must_use]
    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        self.weekdays.is_empty() || self.weekdays.contains(&Weekday::from(date.weekday()))
    }

    /// # Errors
    ///
    /// Returns [`NudgeError::Config`] when the event cannot be delivered.
    pub fn validate(&self) -> Result<()> {
        if self.destination.trim().is_empty() {
            return Err(NudgeError::Config(format!(
                "anchored event '{}' has no destination",
                self.subject
            )));
        }
        if self.subject.trim().is_empty() {
            return Err(NudgeError::Config(
                "anchored event has an empty subject".to_owned(),
            ));
        }
        Ok(())
    }

    fn render(&self, lead_minutes: i64) -> String {
        match &self.text {
            Some(text) => text.clone(),
            None => format!(
                "{} starts in {lead_minutes} minutes ({})",
                self.subject,
                self.start.format("%H:%M")
            ),
        }
    }
}

/// Supplies the events happening on a given local date.
pub trait EventSource: Send + Sync {
    fn events_on(&self, date: NaiveDate) -> Vec<AnchoredEvent>;
}

impl EventSource for Vec<AnchoredEvent> {
    fn events_on(&self, date: NaiveDate) -> Vec<AnchoredEvent> {
        self.iter().filter(|e| e.occurs_on(date)).cloned().collect()
    }
}

/// Minute-resolution watcher for anchored events.
pub struct AnchoredWatcher {
    source: Arc<dyn EventSource>,
    guard: FireGuard,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    lead_minutes: i64,
    poll_interval: std::time::Duration,
    broadcast_mention: bool,
}

impl AnchoredWatcher {
    pub fn new(
        source: Arc<dyn EventSource>,
        guard: FireGuard,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        tz: Tz,
    ) -> Self {
        Self {
            source,
            guard,
            notifier,
            clock,
            tz,
            lead_minutes: 15,
            poll_interval: std::time::Duration::from_secs(60),
            broadcast_mention: false,
        }
    }

    /// Watcher over the events listed in the `[anchored]` config section.
    pub fn from_config(
        config: &AnchoredConfig,
        guard: FireGuard,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        tz: Tz,
    ) -> Self {
        Self::new(Arc::new(config.events.clone()), guard, notifier, clock, tz)
            .with_lead_minutes(config.lead_minutes)
            .with_poll_interval(config.poll_interval())
    }

    pub fn with_lead_minutes(mut self, minutes: u32) -> Self {
        self.lead_minutes = i64::from(minutes);
        self
    }

    pub fn with_poll_interval(mut self, interval: std::time::Duration) -> Self {
        self.poll_interval = interval.max(std::time::Duration::from_millis(10));
        self
    }

    pub fn with_broadcast_mention(mut self, mention: bool) -> Self {
        self.broadcast_mention = mention;
        self
    }

    /// Deliver every event whose heads-up minute is the current minute.
    /// Returns how many notifications went out.
    ///
    /// # Errors
    ///
    /// Returns an error when the fire-guard ledger cannot be written.
    /// Delivery failures are logged and do not abort the check.
    pub async fn check(&self) -> Result<usize> {
        let now = self.clock.now().with_timezone(&self.tz);
        // The event that starts `lead` from now may fall on tomorrow.
        let target = now + Duration::minutes(self.lead_minutes);
        let event_date = target.date_naive();
        let target_minute = (target.hour(), target.minute());

        let mut delivered = 0;
        for event in self.source.events_on(event_date) {
            if (event.start.hour(), event.start.minute()) != target_minute {
                continue;
            }

            let signature =
                FireGuard::signature(event_date, &event.destination, &event.subject, event.start);
            if self.guard.has_fired(&signature).await? {
                debug!("anchored event already announced: {signature}");
                continue;
            }

            let notification = Notification {
                reminder_id: signature.clone(),
                destination: event.destination.clone(),
                text: event.render(self.lead_minutes),
                broadcast_mention: self.broadcast_mention,
            };
            match self.notifier.notify(notification).await {
                Ok(()) => {
                    self.guard.mark_fired(&signature).await?;
                    info!("announced anchored event {signature}");
                    delivered += 1;
                }
                Err(e) => error!("anchored delivery failed for {signature}: {e:#}"),
            }
        }
        Ok(delivered)
    }

    /// Start the watcher loop.
    pub fn spawn(self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let join = tokio::spawn(async move {
            info!(
                "anchored watcher started with {}-minute lead, ledger at {}",
                self.lead_minutes,
                self.guard.path().display()
            );
            let mut interval = tokio::time::interval(self.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                if let Err(e) = self.check().await {
                    error!("anchored check failed: {e}");
                }
            }
            info!("anchored watcher stopped");
        });

        SchedulerHandle::new(cancel, join)
    }
}

/// `"HH:MM"` (seconds optional on input) for [`NaiveTime`] fields.
mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .map_err(|e| serde::de::Error::custom(format!("invalid time '{raw}': {e}")))
    }
}
