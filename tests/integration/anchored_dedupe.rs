//! Anchored T-minus notifications and the fire-guard ledger on disk.

use crate::helpers::RecordingNotifier;
use chrono::{Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Asia::Jakarta;
use nudge::clock::ManualClock;
use nudge::lock::PathLock;
use nudge::scheduler::{AnchoredEvent, AnchoredWatcher, FireGuard};
use std::sync::Arc;

fn class() -> AnchoredEvent {
    AnchoredEvent {
        destination: "class-group".to_owned(),
        subject: "Operating Systems".to_owned(),
        start: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
        weekdays: Vec::new(),
        text: None,
    }
}

fn local(day: u32, hour: u32, minute: u32, second: u32) -> chrono::DateTime<Utc> {
    Jakarta
        .with_ymd_and_hms(2025, 8, day, hour, minute, second)
        .unwrap()
        .with_timezone(&Utc)
}

#[tokio::test]
async fn polls_within_one_minute_deliver_once_per_day() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("cron.state.json");
    let clock = ManualClock::new(local(27, 10, 15, 0));
    let lock = PathLock::new();
    let guard = FireGuard::new(&ledger_path, Jakarta, Arc::new(clock.clone())).with_lock(lock);
    let notifier = Arc::new(RecordingNotifier::default());
    let watcher = AnchoredWatcher::new(
        Arc::new(vec![class()]),
        guard.clone(),
        notifier.clone(),
        Arc::new(clock.clone()),
        Jakarta,
    );

    // Several polls land inside 10:15.
    for second in [0, 20, 40, 59] {
        clock.set(local(27, 10, 15, second));
        watcher.check().await.unwrap();
    }
    assert_eq!(notifier.sent().len(), 1);
    assert_eq!(
        notifier.sent()[0].text,
        "Operating Systems starts in 15 minutes (10:30)"
    );

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&ledger_path).unwrap()).unwrap();
    assert_eq!(raw["date"], "2025-08-27");
    assert_eq!(
        raw["firedSignatures"][0],
        "2025-08-27|class-group|Operating Systems|10:30"
    );

    // Next day the ledger rolls over and the class is announced again.
    clock.set(local(28, 10, 15, 5));
    watcher.check().await.unwrap();
    assert_eq!(notifier.sent().len(), 2);
    let ledger = guard.ledger().await.unwrap();
    assert_eq!(ledger.fired_signatures.len(), 1);
    assert!(ledger.fired_signatures[0].starts_with("2025-08-28|"));
}

#[tokio::test]
async fn two_watchers_sharing_a_ledger_deliver_once() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("cron.state.json");
    let clock = ManualClock::new(local(27, 10, 15, 0));
    let lock = PathLock::new();
    let notifier = Arc::new(RecordingNotifier::default());

    let make = || {
        AnchoredWatcher::new(
            Arc::new(vec![class()]),
            FireGuard::new(&ledger_path, Jakarta, Arc::new(clock.clone())).with_lock(lock.clone()),
            notifier.clone(),
            Arc::new(clock.clone()),
            Jakarta,
        )
    };
    let first = make();
    let second = make();

    first.check().await.unwrap();
    second.check().await.unwrap();

    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn manual_date_override_simulates_rollover() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(local(27, 8, 0, 0));
    let guard = FireGuard::new(
        dir.path().join("cron.state.json"),
        Jakarta,
        Arc::new(clock.clone()),
    )
    .with_lock(PathLock::new());
    let today = guard.today();
    let signature = FireGuard::signature(
        today,
        "class-group",
        "Operating Systems",
        NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
    );

    guard.mark_fired(&signature).await.unwrap();
    guard.mark_fired(&signature).await.unwrap();
    assert!(guard.has_fired(&signature).await.unwrap());

    guard.set_date(today - Duration::days(1)).await.unwrap();
    assert!(!guard.has_fired(&signature).await.unwrap());
}
