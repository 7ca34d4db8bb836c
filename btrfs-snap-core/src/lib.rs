//! Snapshot orchestration core for btrfs-snap
//!
//! Drives `btrfs` and `systemctl` through a [`CommandRunner`], parses their
//! text output, and generates the unattended snapshot script run by the
//! systemd timer. Every public operation reports failure inside its result
//! value rather than as an `Err`.

pub mod inventory;
pub mod orchestrator;
pub mod runner;
pub mod script;
pub mod timer;

pub use inventory::parse_listing;
pub use orchestrator::{RESTORE_NOTE, SnapshotManager};
pub use runner::{CommandOutput, CommandRunner, SystemRunner};
pub use script::{ScriptParams, UnitPaths};
pub use timer::TimerController;
