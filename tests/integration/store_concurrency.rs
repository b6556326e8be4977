//! Concurrent read-modify-write through the reminder store.

use chrono::{TimeZone, Utc};
use nudge::lock::PathLock;
use nudge::scheduler::{Reminder, Schedule};
use nudge::store::ReminderStore;

fn reminder(text: &str) -> Reminder {
    let at = Utc.with_ymd_and_hms(2025, 8, 27, 9, 0, 0).unwrap();
    Reminder::new("room", "tester", at, text, Schedule::Once { at })
}

#[tokio::test]
async fn two_concurrent_updates_are_both_kept() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReminderStore::new(dir.path().join("reminders.json")).with_lock(PathLock::new());

    let slow = store.update(|list| {
        std::thread::sleep(std::time::Duration::from_millis(20));
        list.push(reminder("first"));
    });
    let fast = store.update(|list| list.push(reminder("second")));
    let (a, b) = tokio::join!(slow, fast);
    a.unwrap();
    b.unwrap();

    let mut texts: Vec<String> = store.snapshot().await.into_iter().map(|r| r.text).collect();
    texts.sort();
    assert_eq!(texts, vec!["first".to_owned(), "second".to_owned()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_tasks_on_separate_store_handles_lose_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reminders.json");
    let lock = PathLock::new();

    let mut tasks = Vec::new();
    for i in 0..24 {
        let store = ReminderStore::new(&path).with_lock(lock.clone());
        tasks.push(tokio::spawn(async move {
            store
                .update(move |list| list.push(reminder(&format!("r{i}"))))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let store = ReminderStore::new(&path).with_lock(lock.clone());
    assert_eq!(store.snapshot().await.len(), 24);
    assert_eq!(lock.active_keys(), 0);
}

#[tokio::test]
async fn update_result_is_returned_to_caller() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReminderStore::new(dir.path().join("reminders.json")).with_lock(PathLock::new());
    store
        .update(|list| {
            list.push(reminder("a"));
            list.push(reminder("b"));
        })
        .await
        .unwrap();

    let removed = store
        .update(|list| {
            let before = list.len();
            list.retain(|r| r.text != "a");
            before - list.len()
        })
        .await
        .unwrap();

    assert_eq!(removed, 1);
    assert_eq!(store.snapshot().await.len(), 1);
}
