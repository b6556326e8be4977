//! Day-scoped idempotency ledger for calendar-anchored notifications.
//!
//! The anchored path polls every minute and fires when the current minute
//! matches an event's lead time, so the same logical occurrence can be
//! evaluated more than once. Each delivered occurrence is recorded as a
//! signature in a small JSON ledger that is only valid for one local date.
//! Every access reads the ledger from disk under the path lock, and a stale
//! date is replaced by an empty ledger inside that same critical section.

use crate::clock::Clock;
use crate::error::Result;
use crate::lock::PathLock;
use crate::store::atomic::{load_json_or_default, write_json_atomic};
use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Persisted ledger: `{ "date": "YYYY-MM-DD", "firedSignatures": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FireLedger {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub fired_signatures: Vec<String>,
}

impl FireLedger {
    fn fresh(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            fired_signatures: Vec::new(),
        }
    }

    fn contains(&self, signature: &str) -> bool {
        self.fired_signatures.iter().any(|s| s == signature)
    }
}

/// File-backed fired-signature set that resets when the local date changes.
#[derive(Clone)]
pub struct FireGuard {
    path: PathBuf,
    tz: Tz,
    clock: Arc<dyn Clock>,
    lock: PathLock,
}

impl std::fmt::Debug for FireGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FireGuard")
            .field("path", &self.path)
            .field("tz", &self.tz)
            .finish_non_exhaustive()
    }
}

impl FireGuard {
    pub fn new(path: impl Into<PathBuf>, tz: Tz, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            tz,
            clock,
            lock: PathLock::shared(),
        }
    }

    #[must_use]
    pub fn with_lock(mut self, lock: PathLock) -> Self {
        self.lock = lock;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deterministic identity of one anchored occurrence.
    pub fn signature(
        date: NaiveDate,
        destination: &str,
        subject: &str,
        clock_time: NaiveTime,
    ) -> String {
        format!(
            "{}|{destination}|{subject}|{}",
            date.format("%Y-%m-%d"),
            clock_time.format("%H:%M")
        )
    }

    /// Local calendar date according to the guard's clock and timezone.
    pub fn today(&self) -> NaiveDate {
        self.clock.now().with_timezone(&self.tz).date_naive()
    }

    pub async fn has_fired(&self, signature: &str) -> Result<bool> {
        let _guard = self.lock.acquire(&self.path).await;
        let ledger = self.current_ledger()?;
        Ok(ledger.contains(signature))
    }

    /// Record `signature` for today. Returns `false` when it was already present.
    pub async fn mark_fired(&self, signature: &str) -> Result<bool> {
        let _guard = self.lock.acquire(&self.path).await;
        let mut ledger = self.current_ledger()?;
        if ledger.contains(signature) {
            return Ok(false);
        }
        ledger.fired_signatures.push(signature.to_owned());
        write_json_atomic(&self.path, &ledger)?;
        debug!("fire guard recorded {signature}");
        Ok(true)
    }

    /// Replace the ledger with an empty one for today.
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.lock.acquire(&self.path).await;
        write_json_atomic(&self.path, &FireLedger::fresh(self.today()))
    }

    /// Overwrite the ledger date, keeping its signatures.
    ///
    /// Setting a date other than today makes the next access roll over.
    pub async fn set_date(&self, date: NaiveDate) -> Result<()> {
        let _guard = self.lock.acquire(&self.path).await;
        let (mut ledger, _) = load_json_or_default::<FireLedger>(&self.path);
        ledger.date = Some(date);
        write_json_atomic(&self.path, &ledger)
    }

    /// Copy of the ledger as currently persisted, after any rollover.
    pub async fn ledger(&self) -> Result<FireLedger> {
        let _guard = self.lock.acquire(&self.path).await;
        self.current_ledger()
    }

    // Caller must hold the path lock.
    fn current_ledger(&self) -> Result<FireLedger> {
        let today = self.today();
        let (ledger, _) = load_json_or_default::<FireLedger>(&self.path);
        if ledger.date == Some(today) {
            return Ok(ledger);
        }

        match ledger.date {
            Some(previous) => info!("fire guard rolled over from {previous} to {today}"),
            None => debug!("fire guard ledger initialised for {today}"),
        }
        let fresh = FireLedger::fresh(today);
        write_json_atomic(&self.path, &fresh)?;
        Ok(fresh)
    }
}
