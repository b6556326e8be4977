//! Tool-facing operations against a real store file.

use crate::helpers::{base_time, harness};
use chrono::Duration;
use nudge::scheduler::ReminderStatus;
use nudge::service::{
    CreateReminder, IntervalUnit, ListFilter, OpOutcome, ReminderPatch, ScheduleSpec,
    SnoozeOutcome,
};

fn request(text: &str, destination: &str) -> CreateReminder {
    CreateReminder {
        text: text.to_owned(),
        destination: destination.to_owned(),
        created_by: "alice".to_owned(),
        ..CreateReminder::default()
    }
}

#[tokio::test]
async fn half_minute_snooze_still_moves_a_full_minute() {
    let h = harness();
    let created = h
        .service
        .create(request("stretch", "room"))
        .await
        .unwrap();
    let before = created.preview_next_fire.unwrap();

    let outcome = h.service.snooze(&created.id, 0.5).await.unwrap();

    let SnoozeOutcome::Snoozed { next_fire_at } = outcome else {
        panic!("expected snooze, got {outcome:?}");
    };
    assert!(next_fire_at - before >= Duration::seconds(60));
    assert_eq!(
        h.service.get(&created.id).await.unwrap().next_fire_at,
        Some(next_fire_at)
    );
}

#[tokio::test]
async fn snoozed_reminder_fires_at_new_time() {
    let mut h = harness();
    let created = h
        .service
        .create(request("tea", "room"))
        .await
        .unwrap();
    h.service.snooze(&created.id, 10.0).await.unwrap();

    h.clock.advance(Duration::minutes(5));
    assert_eq!(h.scheduler.tick().await.unwrap().fired, 0);

    h.clock.advance(Duration::minutes(10));
    assert_eq!(h.scheduler.tick().await.unwrap().fired, 1);
}

#[tokio::test]
async fn list_is_capped_at_fifty_by_default() {
    let h = harness();
    for i in 0..60 {
        h.service
            .create(request(&format!("r{i}"), "room"))
            .await
            .unwrap();
    }
    assert_eq!(h.service.list(&ListFilter::All).await.len(), 50);
}

#[tokio::test]
async fn lifecycle_patch_pause_resume_delete() {
    let h = harness();
    let created = h
        .service
        .create(CreateReminder {
            schedule: ScheduleSpec::Every {
                value: 2,
                unit: IntervalUnit::Hour,
                start: None,
                end: None,
            },
            ..request("water plants", "garden")
        })
        .await
        .unwrap();

    let outcome = h
        .service
        .patch(
            &created.id,
            ReminderPatch {
                destination: Some("balcony".to_owned()),
                ..ReminderPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome, OpOutcome::Ok);
    assert_eq!(
        h.service
            .list(&ListFilter::ByDestination("balcony".to_owned()))
            .await
            .len(),
        1
    );

    h.service.pause(&created.id).await.unwrap();
    assert_eq!(
        h.service.get(&created.id).await.unwrap().status,
        ReminderStatus::Paused
    );

    h.service.resume(&created.id).await.unwrap();
    let resumed = h.service.get(&created.id).await.unwrap();
    assert_eq!(resumed.status, ReminderStatus::Active);
    assert_eq!(resumed.next_fire_at, Some(base_time() + Duration::hours(2)));

    assert_eq!(h.service.delete(&created.id).await.unwrap(), OpOutcome::Ok);
    assert!(h.service.list(&ListFilter::All).await.is_empty());
    assert_eq!(
        h.service.patch(&created.id, ReminderPatch::default()).await.unwrap(),
        OpOutcome::NotFound
    );
}
