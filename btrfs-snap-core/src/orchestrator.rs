// Snapshot check, create, list, restore and delete sequences

use btrfs_snap_common::logfile::event;
use btrfs_snap_common::{
    BTRFS_BINARY, CreateResult, OperationResult, RestoreResult, Snapshot, SnapshotKind,
    SpaceInfo, SystemCheck, TIMESTAMP_FORMAT, validate_snapshot_prefix,
};
use chrono::Local;
use std::path::Path;

use crate::inventory;
use crate::runner::CommandRunner;

/// Operator instructions returned by a successful restore
pub const RESTORE_NOTE: &str = "\
IMPORTANT: steps to complete the restore:

1. Save your work and close all applications
2. Reboot the system: sudo systemctl reboot
3. On boot, the system will use the restored snapshot

NOTE: if the system does not boot, start from a live USB and run:
  btrfs subvolume set-default 5 /mnt
(where /mnt is your mounted root partition)

To make the restored snapshot permanent and clean up the previous one,
consider moving data or deleting the old subvolume after verifying
that everything works correctly.";

/// Drives the btrfs tool for every snapshot operation
///
/// Operations never return `Err`: failures come back inside the result value
/// together with the tool's own stderr. Nothing is retried.
pub struct SnapshotManager<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> SnapshotManager<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Verify the btrfs tool, probe the root and home subvolumes and read free space
    pub fn check(&self) -> SystemCheck {
        let mut result = SystemCheck::default();

        result.btrfs_available = self.runner.is_resolvable(BTRFS_BINARY);
        if !result.btrfs_available {
            result.error = Some("btrfs is not installed or not available in PATH".to_string());
            return result;
        }

        result.root_subvolume_present = self
            .runner
            .run(BTRFS_BINARY, &["subvolume", "show", "/"], true)
            .success();

        result.home_subvolume_present = self
            .runner
            .run(BTRFS_BINARY, &["subvolume", "show", "/home"], true)
            .success();

        let df = self.runner.run("df", &["-h", "/"], false);
        if df.success() {
            if let Some(space) = parse_df(&df.stdout) {
                result.space = space;
            }
        } else {
            log::warn!("Failed to query free space: {}", df.stderr.trim());
        }

        result
    }

    /// Read-only snapshots found under `target_dir`, newest first
    ///
    /// A failing listing command is logged and yields an empty list.
    pub fn list(&self, target_dir: &Path) -> Vec<Snapshot> {
        let target = target_dir.to_string_lossy();
        let output = self
            .runner
            .run(BTRFS_BINARY, &["subvolume", "list", "-r", &*target], true);

        if !output.success() {
            log::error!("Failed to list snapshots: {}", output.stderr.trim());
            return Vec::new();
        }

        inventory::parse_listing(&output.stdout, target_dir)
    }

    /// Snapshot `/` then `/home`, sharing one timestamp
    pub fn create(&self, root_target: &Path, home_target: &Path, prefix: &str) -> CreateResult {
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        self.create_with_timestamp(root_target, home_target, prefix, &timestamp)
    }

    pub(crate) fn create_with_timestamp(
        &self,
        root_target: &Path,
        home_target: &Path,
        prefix: &str,
        timestamp: &str,
    ) -> CreateResult {
        let mut result = CreateResult::default();

        if let Err(e) = validate_snapshot_prefix(prefix) {
            result.log.push(format!("Invalid snapshot prefix: {}", e));
            result.error = Some(e);
            return result;
        }

        let root_name = SnapshotKind::Root.snapshot_name(prefix, timestamp);
        let home_name = SnapshotKind::Home.snapshot_name(prefix, timestamp);

        result.log.push("Starting snapshot creation...".to_string());
        result.log.push("Checking target directories...".to_string());
        self.ensure_dir(root_target, SnapshotKind::Root, &mut result.log);
        self.ensure_dir(home_target, SnapshotKind::Home, &mut result.log);

        result.log.push(format!("Creating root snapshot: {}", root_name));
        let root_path = root_target.join(&root_name);
        if let Err(stderr) = self.snapshot(SnapshotKind::Root, &root_path) {
            result
                .log
                .push(format!("Error creating root snapshot: {}", stderr.trim()));
            log::error!("Root snapshot failed: {}", stderr.trim());
            result.error = Some(stderr);
            return result;
        }
        result
            .log
            .push(format!("Root snapshot created: {}", root_path.display()));
        result.root_name = Some(root_name.clone());

        result.log.push(format!("Creating home snapshot: {}", home_name));
        let home_path = home_target.join(&home_name);
        if let Err(stderr) = self.snapshot(SnapshotKind::Home, &home_path) {
            result
                .log
                .push(format!("Error creating home snapshot: {}", stderr.trim()));
            result.log.push(format!(
                "Root snapshot {} was kept; delete it or retry home manually",
                root_path.display()
            ));
            log::error!(
                "{}",
                event(
                    "Home snapshot failed after root succeeded",
                    &serde_json::json!({ "root": root_name, "error": stderr.trim() }),
                )
            );
            result.error = Some(stderr);
            return result;
        }
        result
            .log
            .push(format!("Home snapshot created: {}", home_path.display()));
        result.log.push("Snapshots created successfully".to_string());

        log::info!(
            "{}",
            event(
                "Snapshots created",
                &serde_json::json!({ "root_name": root_name, "home_name": home_name }),
            )
        );

        result.ok = true;
        result.home_name = Some(home_name);
        result
    }

    /// Make `snapshot_path` the default subvolume; takes effect after a reboot
    pub fn restore(&self, snapshot_path: &Path) -> RestoreResult {
        let mut result = RestoreResult::default();
        let target = snapshot_path.to_string_lossy();

        result.log.push(format!("Restoring snapshot: {}", target));

        let current = self
            .runner
            .run(BTRFS_BINARY, &["subvolume", "get-default", "/"], true);
        if current.success() {
            result
                .log
                .push(format!("Current default subvolume: {}", current.stdout.trim()));
        } else {
            log::warn!(
                "Could not read current default subvolume: {}",
                current.stderr.trim()
            );
        }

        let output = self
            .runner
            .run(BTRFS_BINARY, &["subvolume", "set-default", &*target], true);
        if !output.success() {
            result.log.push(format!(
                "Error setting snapshot as default: {}",
                output.stderr.trim()
            ));
            log::error!("Restore of {} failed: {}", target, output.stderr.trim());
            result.error = Some(output.stderr);
            return result;
        }

        result
            .log
            .push("Snapshot set as default subvolume".to_string());
        log::info!("Snapshot restored, reboot required: {}", target);

        result.ok = true;
        result.note = RESTORE_NOTE.to_string();
        result
    }

    /// Delete a snapshot subvolume
    pub fn delete(&self, snapshot_path: &Path) -> OperationResult {
        let target = snapshot_path.to_string_lossy();
        log::info!("Deleting snapshot: {}", target);

        let output = self
            .runner
            .run(BTRFS_BINARY, &["subvolume", "delete", &*target], true);
        if !output.success() {
            log::error!("Failed to delete {}: {}", target, output.stderr.trim());
            return OperationResult::error(output.stderr);
        }

        log::info!("Snapshot deleted: {}", target);
        OperationResult::success()
    }

    /// `mkdir -p` a target directory; failures are warnings only
    fn ensure_dir(&self, dir: &Path, kind: SnapshotKind, log: &mut Vec<String>) {
        let dir = dir.to_string_lossy();
        let output = self.runner.run("mkdir", &["-p", &*dir], true);
        if !output.success() && !output.stderr.contains("File exists") {
            log::warn!("mkdir -p {} failed: {}", dir, output.stderr.trim());
            log.push(format!(
                "Warning creating {} directory: {}",
                kind.as_str(),
                output.stderr.trim()
            ));
        }
    }

    /// Take a read-only snapshot of the subvolume behind `kind`
    fn snapshot(&self, kind: SnapshotKind, dest: &Path) -> Result<(), String> {
        let source = kind.source().to_string_lossy();
        let dest = dest.to_string_lossy();
        let output = self
            .runner
            .run(BTRFS_BINARY, &["subvolume", "snapshot", "-r", &*source, &*dest], true);

        if output.success() {
            Ok(())
        } else {
            Err(output.stderr)
        }
    }
}

/// Total/used/free from the second line of `df -h` output
fn parse_df(stdout: &str) -> Option<SpaceInfo> {
    let line = stdout.lines().nth(1)?;
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }

    Some(SpaceInfo {
        total: parts[1].to_string(),
        used: parts[2].to_string(),
        free: parts[3].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::FakeRunner;
    use std::path::PathBuf;

    const DF_OUTPUT: &str = "\
Filesystem      Size  Used Avail Use% Mounted on
/dev/nvme0n1p2  476G  120G  354G  26% /
";

    const TS: &str = "2025-11-02_10-30-00";

    #[test]
    fn test_check_all_present() {
        let runner = FakeRunner::new().succeed_with("df -h /", DF_OUTPUT);
        let check = SnapshotManager::new(&runner).check();

        assert!(check.btrfs_available);
        assert!(check.root_subvolume_present);
        assert!(check.home_subvolume_present);
        assert_eq!(check.space.total, "476G");
        assert_eq!(check.space.used, "120G");
        assert_eq!(check.space.free, "354G");
        assert!(check.error.is_none());

        let calls = runner.calls();
        assert!(calls[0].elevate && calls[0].line() == "btrfs subvolume show /");
        assert!(calls[1].elevate && calls[1].line() == "btrfs subvolume show /home");
        assert!(!calls[2].elevate);
    }

    #[test]
    fn test_check_without_btrfs_short_circuits() {
        let runner = FakeRunner::new().without_binary("btrfs");
        let check = SnapshotManager::new(&runner).check();

        assert!(!check.btrfs_available);
        assert!(check.error.unwrap().contains("btrfs"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_check_degrades_on_probe_failures() {
        let runner = FakeRunner::new()
            .fail_with("subvolume show /home", "ERROR: not a subvolume")
            .fail_with("df", "df: /: No such file");
        let check = SnapshotManager::new(&runner).check();

        assert!(check.root_subvolume_present);
        assert!(!check.home_subvolume_present);
        assert_eq!(check.space, btrfs_snap_common::SpaceInfo::default());
        assert!(check.error.is_none());
    }

    #[test]
    fn test_check_tolerates_short_df_output() {
        let runner = FakeRunner::new().succeed_with("df -h /", "Filesystem Size\n/dev/sda 10G\n");
        let check = SnapshotManager::new(&runner).check();
        assert_eq!(check.space.free, "0");
    }

    #[test]
    fn test_create_root_failure_skips_home() {
        let runner = FakeRunner::new().fail_with(
            "snapshot -r / ",
            "ERROR: cannot snapshot '/': Permission denied",
        );
        let result = SnapshotManager::new(&runner).create_with_timestamp(
            Path::new("/snaps"),
            Path::new("/snaps"),
            "snap",
            TS,
        );

        assert!(!result.ok);
        assert!(result.root_name.is_none());
        assert!(result.home_name.is_none());
        assert_eq!(
            result.error.as_deref(),
            Some("ERROR: cannot snapshot '/': Permission denied")
        );
        assert_eq!(runner.count("subvolume snapshot -r /home"), 0);
        assert_eq!(runner.count("subvolume snapshot"), 1);
    }

    #[test]
    fn test_create_home_failure_reports_root() {
        let runner = FakeRunner::new().fail_with("snapshot -r /home", "ERROR: home is busy");
        let result = SnapshotManager::new(&runner).create_with_timestamp(
            Path::new("/snaps/root"),
            Path::new("/snaps/home"),
            "snap",
            TS,
        );

        assert!(!result.ok);
        assert_eq!(result.root_name.as_deref(), Some("snap_root_2025-11-02_10-30-00"));
        assert!(result.home_name.is_none());
        assert_eq!(result.error.as_deref(), Some("ERROR: home is busy"));
        assert!(result.log.iter().any(|line| line.contains("home is busy")));
    }

    #[test]
    fn test_create_success() {
        let runner = FakeRunner::new();
        let result = SnapshotManager::new(&runner).create_with_timestamp(
            Path::new("/snaps/root"),
            Path::new("/snaps/home"),
            "snap",
            TS,
        );

        assert!(result.ok);
        assert!(result.error.is_none());
        assert_eq!(result.root_name.as_deref(), Some("snap_root_2025-11-02_10-30-00"));
        assert_eq!(result.home_name.as_deref(), Some("snap_home_2025-11-02_10-30-00"));

        let lines: Vec<String> = runner.calls().iter().map(|c| c.line()).collect();
        assert_eq!(
            lines,
            vec![
                "mkdir -p /snaps/root",
                "mkdir -p /snaps/home",
                "btrfs subvolume snapshot -r / /snaps/root/snap_root_2025-11-02_10-30-00",
                "btrfs subvolume snapshot -r /home /snaps/home/snap_home_2025-11-02_10-30-00",
            ]
        );
        assert!(runner.calls().iter().all(|c| c.elevate));
    }

    #[test]
    fn test_create_generates_shared_timestamp() {
        let runner = FakeRunner::new();
        let result =
            SnapshotManager::new(&runner).create(Path::new("/s"), Path::new("/s"), "nightly");

        let root = result.root_name.unwrap();
        let home = result.home_name.unwrap();
        let root_ts = root.strip_prefix("nightly_root_").unwrap();
        let home_ts = home.strip_prefix("nightly_home_").unwrap();
        assert_eq!(root_ts, home_ts);
        assert!(crate::inventory::timestamp_from_name(&root).is_some());
    }

    #[test]
    fn test_create_mkdir_warning_is_not_fatal() {
        let runner =
            FakeRunner::new().fail_with("mkdir -p /snaps/home", "mkdir: Read-only file system");
        let result = SnapshotManager::new(&runner).create_with_timestamp(
            Path::new("/snaps/root"),
            Path::new("/snaps/home"),
            "snap",
            TS,
        );

        assert!(result.ok);
        assert!(result
            .log
            .iter()
            .any(|line| line.starts_with("Warning creating home directory")));
    }

    #[test]
    fn test_create_rejects_bad_prefix() {
        let runner = FakeRunner::new();
        let result = SnapshotManager::new(&runner).create_with_timestamp(
            Path::new("/snaps"),
            Path::new("/snaps"),
            "../escape",
            TS,
        );

        assert!(!result.ok);
        assert!(result.error.is_some());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_restore_success() {
        let runner =
            FakeRunner::new().succeed_with("get-default", "ID 256 gen 9 top level 5 path @\n");
        let result = SnapshotManager::new(&runner).restore(Path::new("/snaps/snap_root_x"));

        assert!(result.ok);
        assert!(result.note.contains("reboot"));
        assert!(result.note.contains("btrfs subvolume set-default 5 /mnt"));
        assert!(result.log.iter().any(|line| line.contains("path @")));
        assert_eq!(runner.count("set-default /snaps/snap_root_x"), 1);
        assert_eq!(runner.count("delete"), 0);
    }

    #[test]
    fn test_restore_failure() {
        let runner = FakeRunner::new()
            .fail_with("get-default", "not permitted")
            .fail_with("set-default", "ERROR: unable to set default: Not a btrfs subvolume");
        let result = SnapshotManager::new(&runner).restore(Path::new("/snaps/missing"));

        assert!(!result.ok);
        assert_eq!(result.note, "");
        assert_eq!(
            result.error.as_deref(),
            Some("ERROR: unable to set default: Not a btrfs subvolume")
        );
    }

    #[test]
    fn test_delete() {
        let runner = FakeRunner::new();
        let result = SnapshotManager::new(&runner).delete(Path::new("/snaps/snap_root_x"));
        assert!(result.ok);
        assert_eq!(runner.count("btrfs subvolume delete /snaps/snap_root_x"), 1);

        let runner = FakeRunner::new().fail_with("delete", "ERROR: Could not destroy subvolume");
        let result = SnapshotManager::new(&runner).delete(Path::new("/snaps/snap_root_x"));
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("ERROR: Could not destroy subvolume"));
    }

    #[test]
    fn test_list() {
        let runner = FakeRunner::new().succeed_with(
            "subvolume list -r /snaps",
            "ID 256 gen 1 top level 5 path snaps/snap_root_2025-01-01_00-00-00\n\
             ID 257 gen 2 top level 5 path snaps/snap_home_2025-02-01_00-00-00\n",
        );
        let snapshots = SnapshotManager::new(&runner).list(Path::new("/snaps"));

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].kind, SnapshotKind::Home);
        assert_eq!(
            snapshots[1].path,
            PathBuf::from("/snaps/snap_root_2025-01-01_00-00-00")
        );
    }

    #[test]
    fn test_list_failure_is_empty() {
        let runner = FakeRunner::new().fail_with("subvolume list", "ERROR: not a btrfs filesystem");
        assert!(SnapshotManager::new(&runner).list(Path::new("/snaps")).is_empty());
    }
}
