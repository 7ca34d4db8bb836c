//! Generation of the unattended snapshot script and its systemd units
//!
//! Everything here is text assembly from typed parameters. The timer
//! controller writes the results to the locations in [`UnitPaths`].

use anyhow::{Context, Result};
use btrfs_snap_common::{
    RetentionKind, RetentionPolicy, SCRIPT_NAME, SERVICE_UNIT, SnapshotKind, SnapshotTargets,
    TIMER_UNIT, TimerSchedule,
};
use std::fs;
use std::path::{Path, PathBuf};

/// Inputs of the generated snapshot script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptParams {
    pub targets: SnapshotTargets,
    pub retention: RetentionPolicy,
}

/// Fixed locations the timer subsystem reads the artifacts from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPaths {
    /// `~/.local/bin/btrfs-snap.sh`
    pub script: PathBuf,
    /// `~/.config/systemd/user/btrfs-snap.service`
    pub service: PathBuf,
    /// `~/.config/systemd/user/btrfs-snap.timer`
    pub timer: PathBuf,
}

impl UnitPaths {
    /// Locations under the current user's home directory
    pub fn for_user() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        Self::under(&home)
    }

    /// Locations under an arbitrary home directory
    pub fn under(home: &Path) -> Self {
        let unit_dir = home.join(".config").join("systemd").join("user");
        Self {
            script: home.join(".local").join("bin").join(SCRIPT_NAME),
            service: unit_dir.join(SERVICE_UNIT),
            timer: unit_dir.join(TIMER_UNIT),
        }
    }
}

/// Render the snapshot + cleanup script
///
/// Root is snapshotted first and gates home; either failure exits 1 before
/// any cleanup runs. Cleanup matches snapshots by the `{prefix}_{kind}_`
/// substring, so root and home may share one target directory.
pub fn generate_script(params: &ScriptParams) -> String {
    let targets = &params.targets;

    let cleanup = match params.retention.kind {
        RetentionKind::Count => count_cleanup(params.retention.value()),
        RetentionKind::Age => age_cleanup(params.retention.value()),
    };

    format!(
        r#"#!/bin/bash
# Generated by btrfs-snap. Do not edit: it is rewritten whenever the timer is enabled.

TIMESTAMP=$(date +%Y-%m-%d_%H-%M-%S)
ROOT_TARGET="{root}"
HOME_TARGET="{home}"
PREFIX="{prefix}"

echo "=== Starting snapshots $(date) ==="

{root_snapshot}
{home_snapshot}
# Retention cleanup
{cleanup}
echo "=== Snapshots finished $(date) ==="
"#,
        root = targets.root_target.display(),
        home = targets.home_target.display(),
        prefix = targets.prefix,
        root_snapshot = snapshot_step(SnapshotKind::Root),
        home_snapshot = snapshot_step(SnapshotKind::Home),
        cleanup = cleanup,
    )
}

fn target_var(kind: SnapshotKind) -> &'static str {
    match kind {
        SnapshotKind::Root => "ROOT_TARGET",
        SnapshotKind::Home => "HOME_TARGET",
    }
}

fn snapshot_step(kind: SnapshotKind) -> String {
    format!(
        r#"echo "Creating {kind} snapshot..."
if pkexec btrfs subvolume snapshot -r {source} "${var}/${{PREFIX}}_{kind}_$TIMESTAMP"; then
    echo "{kind} snapshot created"
else
    echo "Failed to create {kind} snapshot" >&2
    exit 1
fi
"#,
        kind = kind.as_str(),
        source = kind.source().display(),
        var = target_var(kind),
    )
}

/// Keep the newest `keep` snapshots of each kind
fn count_cleanup(keep: u32) -> String {
    let mut block = format!(
        "echo \"Applying count retention (keep newest {})...\"\n",
        keep
    );

    for kind in [SnapshotKind::Root, SnapshotKind::Home] {
        let upper = kind.as_str().to_uppercase();
        block.push_str(&format!(
            r#"
{upper}_SNAPS=$(pkexec btrfs subvolume list -r "${var}" | awk '{{n = split($NF, parts, "/"); print parts[n]}}' | grep "${{PREFIX}}_{kind}_" | sort -r | tail -n +{skip})
for snap in ${upper}_SNAPS; do
    echo "Deleting old snapshot: ${var}/$snap"
    pkexec btrfs subvolume delete "${var}/$snap"
done
"#,
            upper = upper,
            var = target_var(kind),
            kind = kind.as_str(),
            skip = keep as u64 + 1,
        ));
    }

    block
}

/// Delete snapshots of each kind older than `days`
fn age_cleanup(days: u32) -> String {
    let mut block = format!(
        "echo \"Applying age retention (delete older than {} days)...\"\n",
        days
    );

    for kind in [SnapshotKind::Root, SnapshotKind::Home] {
        block.push_str(&format!(
            r#"
find "${var}" -maxdepth 1 -name "${{PREFIX}}_{kind}_*" -mtime +{days} -exec pkexec btrfs subvolume delete {{}} \;
"#,
            var = target_var(kind),
            kind = kind.as_str(),
            days = days,
        ));
    }

    block
}

/// One-shot service running the generated script
pub fn service_unit(script_path: &Path) -> String {
    format!(
        "[Unit]
Description=Btrfs Snapshot Service
After=local-fs.target

[Service]
Type=oneshot
ExecStart={}
StandardOutput=journal
StandardError=journal

[Install]
WantedBy=default.target
",
        script_path.display()
    )
}

/// Timer firing the service; missed runs fire on the next boot
pub fn timer_unit(schedule: TimerSchedule) -> String {
    format!(
        "[Unit]
Description=Btrfs Snapshot Timer
Requires={}

[Timer]
OnCalendar={}
Persistent=true

[Install]
WantedBy=timers.target
",
        SERVICE_UNIT,
        schedule.on_calendar()
    )
}

/// Write the script and mark it executable
pub fn write_script(path: &Path, content: &str) -> Result<()> {
    write_artifact(path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("Failed to make {} executable", path.display()))?;
    }

    Ok(())
}

/// Write a generated file, creating its directory first
pub fn write_artifact(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}
