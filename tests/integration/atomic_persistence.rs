//! Crash safety and corrupt-file recovery.

use chrono::{TimeZone, Utc};
use nudge::lock::PathLock;
use nudge::scheduler::{Reminder, Schedule};
use nudge::store::ReminderStore;
use nudge::store::atomic::{LoadStatus, load_json_or_default, stage_json};

fn reminder(text: &str) -> Reminder {
    let at = Utc.with_ymd_and_hms(2025, 8, 27, 9, 0, 0).unwrap();
    Reminder::new("room", "tester", at, text, Schedule::Once { at })
}

#[tokio::test]
async fn interrupted_save_keeps_previous_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reminders.json");
    let store = ReminderStore::new(&path).with_lock(PathLock::new());
    store
        .update(|list| list.push(reminder("survivor")))
        .await
        .unwrap();
    let before = std::fs::read(&path).unwrap();

    // Stage a replacement and "crash" before the rename.
    let staged = stage_json(&path, &vec![reminder("lost")]).unwrap();
    let leftover = staged.temp_path().to_path_buf();
    std::mem::forget(staged);

    assert_eq!(std::fs::read(&path).unwrap(), before);
    assert!(leftover.exists());

    let restarted = ReminderStore::new(&path).with_lock(PathLock::new());
    let texts: Vec<String> = restarted.snapshot().await.into_iter().map(|r| r.text).collect();
    assert_eq!(texts, vec!["survivor".to_owned()]);
}

#[tokio::test]
async fn corrupt_file_is_quarantined_and_store_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reminders.json");
    std::fs::write(&path, b"[{\"id\": \"half-writ").unwrap();
    let store = ReminderStore::new(&path).with_lock(PathLock::new());

    store
        .update(|list| {
            assert!(list.is_empty());
            list.push(reminder("fresh"));
        })
        .await
        .unwrap();

    let quarantined: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("reminders.json.corrupt-"))
        .collect();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(
        std::fs::read(quarantined[0].path()).unwrap(),
        b"[{\"id\": \"half-writ".to_vec()
    );

    let (reloaded, status): (Vec<Reminder>, _) = load_json_or_default(&path);
    assert_eq!(status, LoadStatus::Loaded);
    assert_eq!(reloaded.len(), 1);
}
