// Command-line arguments

use btrfs_snap_common::{RetentionKind, TimerSchedule};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Manage read-only Btrfs snapshots of / and /home
#[derive(Debug, Parser)]
#[command(name = "btrfs-snap", version, about)]
pub struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Echo log records to stderr as well as the log file
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file to use instead of ~/.config/btrfs-snap/config.toml
    #[arg(long, global = true, env = "BTRFS_SNAP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check for the btrfs tool, the root and home subvolumes, free space and the timer
    Check,
    /// List read-only snapshots, newest first
    List {
        /// Directory to list (defaults to the configured root and home targets)
        #[arg(long)]
        target: Option<PathBuf>,
    },
    /// Snapshot / and then /home
    Create {
        #[arg(long)]
        root_target: Option<PathBuf>,
        #[arg(long)]
        home_target: Option<PathBuf>,
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Make a snapshot the default subvolume (takes effect after reboot)
    Restore {
        /// Absolute path of the snapshot
        path: PathBuf,
    },
    /// Delete a snapshot
    Delete {
        /// Absolute path of the snapshot
        path: PathBuf,
    },
    /// Show or change the stored configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Manage the recurring snapshot timer
    #[command(subcommand)]
    Timer(TimerCommand),
    /// Show or clear the application log
    #[command(subcommand)]
    Logs(LogsCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the current configuration
    Show,
    /// Update individual settings
    Set {
        #[arg(long)]
        root_target: Option<PathBuf>,
        #[arg(long)]
        home_target: Option<PathBuf>,
        #[arg(long)]
        prefix: Option<String>,
        /// Replace the exclusion list (repeatable)
        #[arg(long = "exclude")]
        exclusions: Option<Vec<String>>,
    },
    /// Restore the default configuration
    Reset,
}

#[derive(Debug, Subcommand)]
pub enum TimerCommand {
    /// Install the snapshot script and units, then enable and start the timer
    Enable {
        /// hourly, daily or weekly
        #[arg(long)]
        schedule: Option<TimerSchedule>,
        /// count or age
        #[arg(long)]
        retention: Option<RetentionKind>,
        /// Snapshots to keep (count) or maximum age in days (age)
        #[arg(long)]
        value: Option<u32>,
    },
    /// Stop and disable the timer
    Disable,
    /// Show whether the timer is enabled and when it runs
    Status,
}

#[derive(Debug, Subcommand)]
pub enum LogsCommand {
    /// Print the accumulated log
    Show,
    /// Delete the active log file
    Clear,
}
