//! CLI binary for nudge.

use anyhow::Context;
use chrono::{DateTime, NaiveTime, Timelike, Utc};
use clap::{Args, Parser, Subcommand};
use nudge::clock::{Clock, SystemClock};
use nudge::config::NudgeConfig;
use nudge::notify::{LogNotifier, Notifier};
use nudge::scheduler::{AnchoredWatcher, FireGuard, ReminderScheduler, Weekday};
use nudge::service::{
    CreateReminder, IntervalUnit, ListFilter, OpOutcome, ReminderService, ScheduleSpec,
    SnoozeOutcome,
};
use nudge::store::ReminderStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Nudge: background reminder scheduler.
#[derive(Parser)]
#[command(name = "nudge", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the state directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Run the scheduler (and the anchored watcher when enabled) until Ctrl+C.
    Run,

    /// Create a reminder.
    Add(AddArgs),

    /// List reminders.
    List {
        /// Only reminders for this destination.
        #[arg(long, conflicts_with = "by")]
        dest: Option<String>,
        /// Only reminders created by this user.
        #[arg(long)]
        by: Option<String>,
    },

    /// Pause a reminder.
    Pause { id: String },

    /// Resume a paused reminder, scheduling it from now.
    Resume { id: String },

    /// Delete a reminder.
    Delete { id: String },

    /// Push a reminder back by some minutes (at least one).
    Snooze { id: String, minutes: f64 },

    /// Print the effective configuration as TOML.
    ShowConfig,
}

#[derive(Args)]
struct AddArgs {
    /// Message to deliver.
    text: String,

    /// Destination handle.
    #[arg(long, default_value = "local")]
    dest: String,

    /// Creator recorded on the reminder.
    #[arg(long, default_value = "cli")]
    by: String,

    /// Fire once at this RFC 3339 instant.
    #[arg(long, conflicts_with_all = ["every", "rule", "weekdays", "time"])]
    at: Option<DateTime<Utc>>,

    /// Fire every N units.
    #[arg(long, conflicts_with_all = ["rule", "weekdays", "time"])]
    every: Option<u64>,

    /// Unit for --every: minute, hour or day.
    #[arg(long, default_value = "minute")]
    unit: String,

    /// Calendar rule, e.g. "FREQ=WEEKLY;BYDAY=MO,WE;BYHOUR=16;BYMINUTE=0".
    #[arg(long)]
    rule: Option<String>,

    /// Comma separated weekday codes (MO,TU,...).
    #[arg(long, value_delimiter = ',')]
    weekdays: Vec<String>,

    /// Local time of day, HH:MM.
    #[arg(long)]
    time: Option<String>,

    /// Only the next matching calendar occurrence.
    #[arg(long)]
    next_only: bool,

    /// Stop after this many calendar occurrences.
    #[arg(long)]
    count: Option<u32>,

    /// No occurrence before this instant.
    #[arg(long)]
    start: Option<DateTime<Utc>>,

    /// No occurrence after this instant.
    #[arg(long)]
    end: Option<DateTime<Utc>>,

    /// Mention everyone at the destination.
    #[arg(long)]
    mention: bool,

    /// Free-form tags.
    #[arg(long = "tag")]
    tags: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nudge=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.storage.resolve_data_dir(&nudge::dirs::data_dir()));
    let store = ReminderStore::new(config.storage.reminders_path(&data_dir));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command {
        Command::Run => run(config, data_dir, store, clock).await,
        Command::ShowConfig => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        command => {
            let service = ReminderService::from_config(&config.scheduler, store, clock)?;
            manage(&service, command).await
        }
    }
}

fn load_config(explicit: Option<&PathBuf>) -> anyhow::Result<NudgeConfig> {
    if let Some(path) = explicit {
        return NudgeConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()));
    }
    let default_path = nudge::dirs::config_file();
    if default_path.exists() {
        return NudgeConfig::from_file(&default_path)
            .with_context(|| format!("loading config from {}", default_path.display()));
    }
    Ok(NudgeConfig::default())
}

async fn run(
    config: NudgeConfig,
    data_dir: PathBuf,
    store: ReminderStore,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<()> {
    println!("nudge v{}", env!("CARGO_PKG_VERSION"));
    let tz = config.scheduler.tz()?;
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

    let scheduler =
        ReminderScheduler::from_config(&config.scheduler, store, notifier.clone(), clock.clone())?;
    let mut handles = vec![scheduler.spawn()];

    if config.anchored.enabled {
        let guard = FireGuard::new(
            config.storage.fire_guard_path(&data_dir),
            tz,
            clock.clone(),
        );
        let watcher = AnchoredWatcher::from_config(&config.anchored, guard, notifier, clock, tz)
            .with_broadcast_mention(config.scheduler.broadcast_mention_default);
        handles.push(watcher.spawn());
        info!(
            "anchored watcher enabled for {} events",
            config.anchored.events.len()
        );
    }

    println!(
        "Watching {} (timezone {tz}). Press Ctrl+C to stop.",
        data_dir.display()
    );
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl+C")?;
    info!("received Ctrl+C, shutting down...");

    for handle in handles {
        handle.stop().await;
    }
    Ok(())
}

async fn manage(service: &ReminderService, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Add(args) => {
            let request = create_request(args)?;
            let created = service.create(request).await?;
            match created.preview_next_fire {
                Some(next) => println!(
                    "{} ({}) next at {}",
                    created.id,
                    created.kind,
                    next.to_rfc3339()
                ),
                None => println!("{} ({})", created.id, created.kind),
            }
        }
        Command::List { dest, by } => {
            let filter = match (dest, by) {
                (Some(dest), _) => ListFilter::ByDestination(dest),
                (None, Some(by)) => ListFilter::ByCreator(by),
                (None, None) => ListFilter::All,
            };
            for r in service.list(&filter).await {
                let next = r
                    .next_fire_at
                    .map_or_else(|| "-".to_owned(), |t| t.to_rfc3339());
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    r.id, r.status, next, r.schedule, r.destination, r.text
                );
            }
        }
        Command::Pause { id } => report(&id, service.pause(&id).await?),
        Command::Resume { id } => report(&id, service.resume(&id).await?),
        Command::Delete { id } => report(&id, service.delete(&id).await?),
        Command::Snooze { id, minutes } => match service.snooze(&id, minutes).await? {
            SnoozeOutcome::Snoozed { next_fire_at } => {
                println!("{id} snoozed until {}", next_fire_at.to_rfc3339());
            }
            SnoozeOutcome::NotFound => anyhow::bail!("no reminder with id {id}"),
            SnoozeOutcome::NotActive => anyhow::bail!("reminder {id} is not active"),
        },
        Command::Run | Command::ShowConfig => {}
    }
    Ok(())
}

fn report(id: &str, outcome: OpOutcome) {
    match outcome {
        OpOutcome::Ok => println!("ok"),
        OpOutcome::NotFound => println!("no reminder with id {id}"),
    }
}

fn create_request(args: AddArgs) -> anyhow::Result<CreateReminder> {
    let calendar = args.rule.is_some() || !args.weekdays.is_empty() || args.time.is_some();

    let schedule = if let Some(at) = args.at {
        ScheduleSpec::At(at)
    } else if let Some(value) = args.every {
        ScheduleSpec::Every {
            value,
            unit: args.unit.parse::<IntervalUnit>()?,
            start: args.start,
            end: args.end,
        }
    } else if calendar {
        let weekdays = args
            .weekdays
            .iter()
            .map(|code| {
                Weekday::from_code(code).with_context(|| format!("unknown weekday '{code}'"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let time = args
            .time
            .as_deref()
            .map(|t| NaiveTime::parse_from_str(t.trim(), "%H:%M"))
            .transpose()
            .context("--time must be HH:MM")?;
        ScheduleSpec::Calendar {
            rule: args.rule,
            weekdays,
            hour: time.and_then(|t| u8::try_from(t.hour()).ok()),
            minute: time.and_then(|t| u8::try_from(t.minute()).ok()),
            start: args.start,
            end: args.end,
            count: args.count,
            only_next_occurrence: args.next_only,
        }
    } else {
        ScheduleSpec::Unspecified
    };

    Ok(CreateReminder {
        text: args.text,
        schedule,
        destination: args.dest,
        created_by: args.by,
        use_broadcast_mention: args.mention.then_some(true),
        tags: args.tags,
        due_hint: None,
    })
}
