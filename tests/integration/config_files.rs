//! Config files feeding the scheduler, service and watcher constructors.

use chrono_tz::Asia::Jakarta;
use nudge::clock::{Clock, ManualClock};
use nudge::config::NudgeConfig;
use nudge::error::NudgeError;
use nudge::notify::LogNotifier;
use nudge::scheduler::{AnchoredWatcher, FireGuard, ReminderScheduler};
use nudge::service::{ListFilter, ReminderService};
use nudge::store::ReminderStore;
use std::sync::Arc;

const SAMPLE: &str = r#"
[scheduler]
poll_interval_secs = 15
list_limit = 2
delivery_timeout_secs = 5

[storage]
reminders_file = "r.json"
fire_guard_file = "guard.json"

[anchored]
enabled = true
lead_minutes = 10

[[anchored.events]]
destination = "class-group"
subject = "Networks"
start = "13:00"
weekdays = ["TU", "TH"]
"#;

#[tokio::test]
async fn components_build_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, SAMPLE).unwrap();

    let config = NudgeConfig::from_file(&path).unwrap();
    assert_eq!(config.scheduler.tz().unwrap(), Jakarta);
    assert_eq!(config.anchored.events.len(), 1);

    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(crate::helpers::base_time()));
    let data_dir = config.storage.resolve_data_dir(dir.path());
    let store = ReminderStore::new(config.storage.reminders_path(&data_dir));
    assert!(store.path().ends_with("r.json"));

    let service = ReminderService::from_config(&config.scheduler, store.clone(), clock.clone()).unwrap();
    assert!(service.list(&ListFilter::All).await.is_empty());

    let mut scheduler =
        ReminderScheduler::from_config(&config.scheduler, store, Arc::new(LogNotifier), clock.clone())
            .unwrap();
    assert!(!scheduler.tick().await.unwrap().persisted);

    let guard = FireGuard::new(config.storage.fire_guard_path(&data_dir), Jakarta, clock.clone());
    let watcher =
        AnchoredWatcher::from_config(&config.anchored, guard, Arc::new(LogNotifier), clock, Jakarta);
    // Base time is a Wednesday: no Networks class.
    assert_eq!(watcher.check().await.unwrap(), 0);
}

#[test]
fn invalid_timezone_in_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[scheduler]\ntimezone = \"Nowhere/Special\"\n").unwrap();

    match NudgeConfig::from_file(&path) {
        Err(NudgeError::Config(msg)) => assert!(msg.contains("Nowhere/Special")),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn default_config_round_trips_through_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    NudgeConfig::default().save_to_file(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("poll_interval_secs = 30"));
    assert!(text.contains("Asia/Jakarta"));

    let loaded = NudgeConfig::from_file(&path).unwrap();
    assert_eq!(loaded.scheduler.list_limit, 50);
}
