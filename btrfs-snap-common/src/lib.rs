// Shared types and utilities for btrfs-snap

pub mod config;
pub mod logfile;
pub mod retention;
pub mod schedules;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use config::{AppConfig, ConfigPatch, ConfigStore, TimerConfig};
pub use logfile::{LogFile, LogStore};
pub use retention::{RetentionKind, RetentionPolicy};
pub use schedules::TimerSchedule;

/// Snapshot utility invoked for every subvolume operation
pub const BTRFS_BINARY: &str = "btrfs";

/// Privilege elevation wrapper
pub const ELEVATION_BINARY: &str = "pkexec";

/// systemd unit names installed by the timer controller
pub const TIMER_UNIT: &str = "btrfs-snap.timer";
pub const SERVICE_UNIT: &str = "btrfs-snap.service";

/// File name of the generated cleanup script
pub const SCRIPT_NAME: &str = "btrfs-snap.sh";

/// Timestamp token embedded at the end of every snapshot name
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Which subvolume a snapshot was taken from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    Root,
    Home,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &str {
        match self {
            SnapshotKind::Root => "root",
            SnapshotKind::Home => "home",
        }
    }

    /// Source mount point of this kind of snapshot
    pub fn source(&self) -> &'static Path {
        match self {
            SnapshotKind::Root => Path::new("/"),
            SnapshotKind::Home => Path::new("/home"),
        }
    }

    /// Name fragment identifying this kind, e.g. `_home_`
    pub fn marker(&self) -> String {
        format!("_{}_", self.as_str())
    }

    /// Build a snapshot name: `{prefix}_{kind}_{timestamp}`
    pub fn snapshot_name(&self, prefix: &str, timestamp: &str) -> String {
        format!("{}_{}_{}", prefix, self.as_str(), timestamp)
    }
}

/// A read-only snapshot found on the live filesystem
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    /// Absolute path; identifies the snapshot
    pub path: PathBuf,
    /// Final path segment
    pub name: String,
    pub kind: SnapshotKind,
    /// Local wall-clock time taken from the name, or capture time if the name has none
    pub created_at: NaiveDateTime,
    pub read_only: bool,
}

impl Snapshot {
    /// Format timestamp for display
    pub fn format_timestamp(&self) -> String {
        self.created_at.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Free/used/total space of the root filesystem, as reported by `df -h`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpaceInfo {
    pub free: String,
    pub used: String,
    pub total: String,
}

impl Default for SpaceInfo {
    fn default() -> Self {
        Self {
            free: "0".to_string(),
            used: "0".to_string(),
            total: "0".to_string(),
        }
    }
}

/// Result of the prerequisite check
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemCheck {
    pub btrfs_available: bool,
    pub root_subvolume_present: bool,
    pub home_subvolume_present: bool,
    pub space: SpaceInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of creating a root + home snapshot pair
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateResult {
    pub ok: bool,
    pub log: Vec<String>,
    /// Set whenever the root snapshot was created, even if home failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of pointing the default subvolume at a snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestoreResult {
    pub ok: bool,
    pub log: Vec<String>,
    /// Operator instructions; empty on failure
    pub note: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a single-step operation (delete, timer enable/disable)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResult {
    pub fn success() -> Self {
        Self { ok: true, error: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
        }
    }
}

/// State of the recurring snapshot timer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimerStatus {
    pub enabled: bool,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run: Option<String>,
    /// Verbose `systemctl status` output
    pub raw_status: String,
}

impl Default for TimerStatus {
    fn default() -> Self {
        Self {
            enabled: false,
            active: false,
            last_run: None,
            next_run: None,
            raw_status: "unknown".to_string(),
        }
    }
}

/// Where snapshots go and how they are named
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotTargets {
    pub root_target: PathBuf,
    pub home_target: PathBuf,
    pub prefix: String,
}

impl SnapshotTargets {
    /// Validate the prefix and both target directories
    pub fn validate(&self) -> Result<(), String> {
        validate_snapshot_prefix(&self.prefix)?;
        validate_target_dir(&self.root_target)?;
        validate_target_dir(&self.home_target)?;
        Ok(())
    }
}

/// Characters that would change the meaning of the generated shell script
const SHELL_UNSAFE: &[char] = &['"', '\'', '`', '$', '\\'];

/// Validate a snapshot name prefix
///
/// # Validation Rules
/// - Must not be empty and must be ≤ 200 characters
/// - Only ASCII letters, digits, `-` and `_`
/// - Cannot start with `-`
///
/// The prefix is spliced into `find -name` and `grep` patterns of the
/// generated cleanup script, so glob and regex metacharacters are refused.
pub fn validate_snapshot_prefix(prefix: &str) -> Result<(), String> {
    if prefix.is_empty() {
        return Err("Snapshot prefix cannot be empty".to_string());
    }

    if prefix.len() > 200 {
        return Err("Snapshot prefix too long (max 200 characters)".to_string());
    }

    // Only allow alphanumeric, dash, underscore
    if !prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(
            "Snapshot prefix can only contain letters, numbers, dashes, and underscores"
                .to_string(),
        );
    }

    if prefix.starts_with('-') {
        return Err("Snapshot prefix cannot start with '-'".to_string());
    }

    Ok(())
}

/// Validate a snapshot target directory
pub fn validate_target_dir(path: &Path) -> Result<(), String> {
    let text = path.to_string_lossy();

    if !path.is_absolute() {
        return Err(format!("Target directory must be absolute: {}", text));
    }

    if text.contains('\0') {
        return Err("Target directory cannot contain null bytes".to_string());
    }

    if text.contains(SHELL_UNSAFE) {
        return Err(format!(
            "Target directory cannot contain quotes, '$', '`' or '\\': {}",
            text
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_name() {
        assert_eq!(
            SnapshotKind::Home.snapshot_name("snap", "2025-11-02_10-30-00"),
            "snap_home_2025-11-02_10-30-00"
        );
        assert_eq!(SnapshotKind::Root.marker(), "_root_");
        assert_eq!(SnapshotKind::Home.source(), Path::new("/home"));
    }

    #[test]
    fn test_prefix_validation() {
        assert!(validate_snapshot_prefix("snap").is_ok());
        assert!(validate_snapshot_prefix("daily-backup_1").is_ok());
        assert!(validate_snapshot_prefix("").is_err());
        assert!(validate_snapshot_prefix("a/b").is_err());
        assert!(validate_snapshot_prefix("..").is_err());
        assert!(validate_snapshot_prefix("-snap").is_err());
        assert!(validate_snapshot_prefix(".snap").is_err());
        assert!(validate_snapshot_prefix("my snap").is_err());
        assert!(validate_snapshot_prefix("snap$(reboot)").is_err());
        assert!(validate_snapshot_prefix("snap\"x").is_err());
        assert!(validate_snapshot_prefix(&"a".repeat(201)).is_err());
    }

    #[test]
    fn test_prefix_rejects_pattern_characters() {
        for prefix in ["*", "?", "[a]", ".", "snap*", "snap.", "a+b", "snap^"] {
            assert!(
                validate_snapshot_prefix(prefix).is_err(),
                "accepted {:?}",
                prefix
            );
        }

        let targets = SnapshotTargets {
            root_target: PathBuf::from("/root/.snapshots"),
            home_target: PathBuf::from("/root/.snapshots"),
            prefix: "*".to_string(),
        };
        assert!(targets.validate().is_err());
    }

    #[test]
    fn test_target_validation() {
        assert!(validate_target_dir(Path::new("/root/.snapshots")).is_ok());
        assert!(validate_target_dir(Path::new("/mnt/my snapshots")).is_ok());
        assert!(validate_target_dir(Path::new("relative/dir")).is_err());
        assert!(validate_target_dir(Path::new("/tmp/$HOME")).is_err());
        assert!(validate_target_dir(Path::new("/tmp/\"x\"")).is_err());
    }

    #[test]
    fn test_default_results() {
        let check = SystemCheck::default();
        assert!(!check.btrfs_available);
        assert_eq!(check.space.free, "0");
        assert_eq!(TimerStatus::default().raw_status, "unknown");
        assert!(OperationResult::success().ok);
        assert_eq!(
            OperationResult::error("boom").error.as_deref(),
            Some("boom")
        );
    }
}
