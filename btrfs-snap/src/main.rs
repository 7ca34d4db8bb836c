// btrfs-snap - snapshot manager for Btrfs root and home subvolumes

mod cli;
mod output;

use anyhow::Result;
use btrfs_snap_common::{
    ConfigPatch, ConfigStore, LogStore, OperationResult, RetentionPolicy, Snapshot, TimerConfig,
};
use btrfs_snap_core::{SnapshotManager, SystemRunner, TimerController, UnitPaths};
use clap::Parser;
use std::io::Write;
use std::process::ExitCode;

use cli::{Cli, Command, ConfigCommand, LogsCommand, TimerCommand};

fn main() -> Result<ExitCode> {
    let args = Cli::parse();

    let logs = LogStore::new();
    init_logging(&logs, args.verbose);

    let config = match &args.config {
        Some(path) => ConfigStore::with_path(path),
        None => ConfigStore::new(),
    };

    log::debug!("Configuration: {}", config.path().display());

    let ok = run(args.command, &config, &logs, args.json)?;
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Route all `log` records into the rotating log file
fn init_logging(logs: &LogStore, verbose: bool) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(logs.writer(verbose))))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                chrono::Utc::now().to_rfc3339(),
                record.level(),
                record.args()
            )
        })
        .init();
}

/// Execute one command; returns whether the operation reported success
fn run(command: Command, config: &ConfigStore, logs: &LogStore, json: bool) -> Result<bool> {
    let runner = SystemRunner::new();
    let snapshots = SnapshotManager::new(&runner);
    let timers = TimerController::new(&runner, UnitPaths::for_user());

    match command {
        Command::Check => {
            let system = snapshots.check();
            let timer = timers.status();
            output::check(&system, &timer, json)?;
            Ok(system.error.is_none())
        }

        Command::List { target } => {
            let current = config.get();
            let dirs = match target {
                Some(dir) => vec![dir],
                None if current.home_target == current.root_target => vec![current.root_target],
                None => vec![current.root_target, current.home_target],
            };

            let mut found: Vec<Snapshot> =
                dirs.iter().flat_map(|dir| snapshots.list(dir)).collect();
            found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            output::snapshots(&found, json)?;
            Ok(true)
        }

        Command::Create {
            root_target,
            home_target,
            prefix,
        } => {
            let current = config.get();
            let root_target = root_target.unwrap_or(current.root_target);
            let home_target = home_target.unwrap_or(current.home_target);
            let prefix = prefix.unwrap_or(current.name_prefix);

            let result = snapshots.create(&root_target, &home_target, &prefix);
            output::create(&result, json)?;
            Ok(result.ok)
        }

        Command::Restore { path } => {
            let result = snapshots.restore(&path);
            output::restore(&result, json)?;
            Ok(result.ok)
        }

        Command::Delete { path } => {
            let result = snapshots.delete(&path);
            output::operation(&format!("Deleted {}", path.display()), &result, json)?;
            Ok(result.ok)
        }

        Command::Config(ConfigCommand::Show) => {
            output::config(&config.get(), json)?;
            Ok(true)
        }

        Command::Config(ConfigCommand::Set {
            root_target,
            home_target,
            prefix,
            exclusions,
        }) => {
            let saved = config.set(ConfigPatch {
                root_target,
                home_target,
                name_prefix: prefix,
                exclusions,
                timer: None,
            });
            let result = if saved {
                OperationResult::success()
            } else {
                OperationResult::error(format!(
                    "Failed to save configuration to {} (see logs)",
                    config.path().display()
                ))
            };
            output::operation("Configuration saved", &result, json)?;
            Ok(result.ok)
        }

        Command::Config(ConfigCommand::Reset) => {
            output::config(&config.reset(), json)?;
            Ok(true)
        }

        Command::Timer(TimerCommand::Enable {
            schedule,
            retention,
            value,
        }) => {
            let current = config.get();
            let schedule = schedule.unwrap_or(current.timer.schedule);
            let retention = match (retention, value) {
                (None, None) => current.timer.retention,
                (kind, value) => RetentionPolicy::new(
                    kind.unwrap_or(current.timer.retention.kind),
                    value.unwrap_or(current.timer.retention.value()),
                )
                .map_err(anyhow::Error::msg)?,
            };

            let mut result = timers.enable(schedule, retention, &current.targets());
            if result.ok {
                let timer = TimerConfig {
                    enabled: true,
                    schedule,
                    retention,
                };
                result = persist_timer(config, timer);
            }
            output::operation(
                &format!("Timer enabled ({}, {})", schedule, retention),
                &result,
                json,
            )?;
            Ok(result.ok)
        }

        Command::Timer(TimerCommand::Disable) => {
            let mut result = timers.disable();
            if result.ok {
                let timer = TimerConfig {
                    enabled: false,
                    ..config.get().timer
                };
                result = persist_timer(config, timer);
            }
            output::operation("Timer disabled", &result, json)?;
            Ok(result.ok)
        }

        Command::Timer(TimerCommand::Status) => {
            output::timer_status(&timers.status(), json)?;
            Ok(true)
        }

        Command::Logs(LogsCommand::Show) => {
            print!("{}", logs.read());
            Ok(true)
        }

        Command::Logs(LogsCommand::Clear) => {
            let result = if logs.clear() {
                OperationResult::success()
            } else {
                OperationResult::error(format!("Failed to clear {}", logs.log_path().display()))
            };
            output::operation("Logs cleared", &result, json)?;
            Ok(result.ok)
        }
    }
}

/// Record the timer state in the configuration; a failed save fails the operation
fn persist_timer(config: &ConfigStore, timer: TimerConfig) -> OperationResult {
    let state = if timer.enabled { "enabled" } else { "disabled" };
    let patch = ConfigPatch {
        timer: Some(timer),
        ..Default::default()
    };
    if config.set(patch) {
        OperationResult::success()
    } else {
        OperationResult::error(format!(
            "Timer {} but saving the setting to {} failed (see logs)",
            state,
            config.path().display()
        ))
    }
}
