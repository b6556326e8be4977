//! Service-created reminders driven through scheduler ticks.

use crate::helpers::{base_time, harness};
use chrono::{Duration, TimeZone, Utc};
use chrono_tz::Asia::Jakarta;
use nudge::scheduler::ReminderStatus;
use nudge::service::{CreateReminder, ScheduleSpec};

fn request(text: &str, schedule: ScheduleSpec) -> CreateReminder {
    CreateReminder {
        text: text.to_owned(),
        schedule,
        destination: "family-group".to_owned(),
        created_by: "alice".to_owned(),
        ..CreateReminder::default()
    }
}

fn daily_at(hour: u8, count: Option<u32>, only_next_occurrence: bool) -> ScheduleSpec {
    ScheduleSpec::Calendar {
        rule: None,
        weekdays: Vec::new(),
        hour: Some(hour),
        minute: Some(0),
        start: None,
        end: None,
        count,
        only_next_occurrence,
    }
}

#[tokio::test]
async fn unspecified_once_fires_exactly_once_and_completes() {
    let mut h = harness();
    let created = h
        .service
        .create(request("take out the bins", ScheduleSpec::Unspecified))
        .await
        .unwrap();
    assert_eq!(
        created.preview_next_fire,
        Some(base_time() + Duration::minutes(5))
    );

    let report = h.scheduler.tick().await.unwrap();
    assert_eq!(report.fired, 0);

    h.clock.advance(Duration::minutes(5));
    let report = h.scheduler.tick().await.unwrap();
    assert_eq!(report.fired, 1);

    for _ in 0..3 {
        h.clock.advance(Duration::seconds(30));
        h.scheduler.tick().await.unwrap();
    }

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, "take out the bins");
    assert_eq!(sent[0].destination, "family-group");
    assert_eq!(sent[0].reminder_id, created.id);

    let stored = h.service.get(&created.id).await.unwrap();
    assert_eq!(stored.status, ReminderStatus::Done);
    assert_eq!(stored.fire_count, 1);
    assert_eq!(stored.next_fire_at, None);
    assert_eq!(stored.last_fired_at, Some(base_time() + Duration::minutes(5)));
}

#[tokio::test]
async fn daily_reminder_rolls_to_next_day_after_firing() {
    let mut h = harness();
    let created = h
        .service
        .create(request("walk the dog", daily_at(16, None, false)))
        .await
        .unwrap();
    let today_16 = Jakarta
        .with_ymd_and_hms(2025, 8, 27, 16, 0, 0)
        .unwrap()
        .with_timezone(&Utc);
    assert_eq!(created.preview_next_fire, Some(today_16));

    h.clock.set(today_16);
    assert_eq!(h.scheduler.tick().await.unwrap().fired, 1);

    let stored = h.service.get(&created.id).await.unwrap();
    assert_eq!(stored.status, ReminderStatus::Active);
    assert_eq!(stored.next_fire_at, Some(today_16 + Duration::days(1)));
}

#[tokio::test]
async fn count_bound_finishes_recurring_reminder() {
    let mut h = harness();
    let created = h
        .service
        .create(request("vitamins", daily_at(10, Some(2), false)))
        .await
        .unwrap();

    for _ in 0..2 {
        let next = h.service.get(&created.id).await.unwrap().next_fire_at.unwrap();
        h.clock.set(next);
        assert_eq!(h.scheduler.tick().await.unwrap().fired, 1);
    }

    let stored = h.service.get(&created.id).await.unwrap();
    assert_eq!(stored.fire_count, 2);
    assert_eq!(stored.status, ReminderStatus::Done);
}

#[tokio::test]
async fn windowed_reminder_fires_only_first_occurrence() {
    let mut h = harness();
    let created = h
        .service
        .create(request("parent meeting", daily_at(18, None, true)))
        .await
        .unwrap();

    h.clock.set(created.preview_next_fire.unwrap());
    assert_eq!(h.scheduler.tick().await.unwrap().fired, 1);

    h.clock.advance(Duration::days(1));
    h.scheduler.tick().await.unwrap();

    let stored = h.service.get(&created.id).await.unwrap();
    assert_eq!(stored.status, ReminderStatus::Done);
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn paused_reminder_is_not_delivered() {
    let mut h = harness();
    let created = h
        .service
        .create(request("quiet", ScheduleSpec::Unspecified))
        .await
        .unwrap();
    h.service.pause(&created.id).await.unwrap();

    h.clock.advance(Duration::minutes(10));
    let report = h.scheduler.tick().await.unwrap();

    assert_eq!(report.fired, 0);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn externally_written_reminder_without_next_time_is_bootstrapped() {
    let mut h = harness();
    let json = serde_json::json!([{
        "id": "legacy-1",
        "destination": "family-group",
        "createdBy": "import",
        "createdAt": "2025-08-26T00:00:00Z",
        "text": "imported",
        "schedule": { "kind": "interval", "everyDuration": 1800 },
        "status": "active"
    }]);
    std::fs::write(
        h.dir.path().join("reminders.json"),
        serde_json::to_vec_pretty(&json).unwrap(),
    )
    .unwrap();

    let report = h.scheduler.tick().await.unwrap();
    assert_eq!(report.bootstrapped, 1);

    let stored = h.service.get("legacy-1").await.unwrap();
    assert_eq!(stored.next_fire_at, Some(base_time() + Duration::minutes(30)));
}

#[tokio::test]
async fn persisted_shape_uses_camel_case_and_kind_tag() {
    let mut h = harness();
    h.service
        .create(request("shape", ScheduleSpec::Unspecified))
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(5));
    h.scheduler.tick().await.unwrap();

    let raw = std::fs::read_to_string(h.dir.path().join("reminders.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let record = &value[0];
    assert_eq!(record["schedule"]["kind"], "once");
    assert_eq!(record["status"], "done");
    assert_eq!(record["fireCount"], 1);
    assert!(record["lastFiredAt"].is_string());
    assert!(record["nextFireAt"].is_null());
    assert_eq!(record["createdBy"], "alice");
}
