// Parsing of `btrfs subvolume list` output into snapshot records

use btrfs_snap_common::{Snapshot, SnapshotKind, TIMESTAMP_FORMAT};
use chrono::{Local, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Component, Path};

/// Trailing `path <relative-path>` field; leading columns are ignored
static PATH_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)path\s+(.+)$").expect("valid path regex"));

/// `YYYY-MM-DD_HH-MM-SS` at the very end of a snapshot name
static NAME_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2})$").expect("valid timestamp regex")
});

/// Turn listing text into snapshots, newest first
///
/// Lines look like `ID 256 gen 123 top level 5 path .snapshots/snap_root_2025-11-02_10-30-00`.
/// Lines without a usable `path` field are skipped.
///
/// The listed path is relative to the filesystem's top level and the listing
/// covers every read-only subvolume, not just those under `target_dir`. An
/// entry is kept only when the trailing components of its parent directory
/// match the trailing components of `target_dir`; its path is then
/// `target_dir` joined with the final segment. When several entries map to
/// the same path, the one whose parent matches more components wins, so
/// every returned path is unique.
pub fn parse_listing(raw: &str, target_dir: &Path) -> Vec<Snapshot> {
    let now = Local::now().naive_local();
    let target: Vec<&str> = target_dir
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();

    let mut best: HashMap<String, (usize, Snapshot)> = HashMap::new();

    for (score, snapshot) in raw
        .lines()
        .filter_map(|line| parse_line(line, target_dir, &target, now))
    {
        let kept = best.get(&snapshot.name).map(|(kept, _)| *kept);
        match kept {
            Some(kept) if kept > score => {}
            Some(kept) if kept == score => {
                log::warn!(
                    "Ambiguous snapshot {} in listing of {}; keeping the first entry",
                    snapshot.name,
                    target_dir.display()
                );
            }
            _ => {
                best.insert(snapshot.name.clone(), (score, snapshot));
            }
        }
    }

    let mut snapshots: Vec<Snapshot> = best
        .into_values()
        .map(|(_, snapshot)| snapshot)
        .collect();
    snapshots.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.name.cmp(&b.name))
    });
    snapshots
}

fn parse_line(
    line: &str,
    target_dir: &Path,
    target: &[&str],
    now: NaiveDateTime,
) -> Option<(usize, Snapshot)> {
    let captures = PATH_FIELD.captures(line.trim())?;
    let listed_path = captures.get(1)?.as_str().trim();

    let (parent, name) = match listed_path.rsplit_once('/') {
        Some((parent, name)) => (parent, name.trim()),
        None => ("", listed_path),
    };
    if name.is_empty() {
        return None;
    }

    let parent: Vec<&str> = parent.split('/').filter(|part| !part.is_empty()).collect();
    let score = shared_suffix(&parent, target);

    // A top-level entry only belongs to a listing of the filesystem root
    let belongs = if target.is_empty() {
        parent.is_empty()
    } else {
        score > 0
    };
    if !belongs {
        return None;
    }

    Some((
        score,
        Snapshot {
            path: target_dir.join(name),
            name: name.to_string(),
            kind: kind_from_name(name),
            created_at: timestamp_from_name(name).unwrap_or(now),
            read_only: true,
        },
    ))
}

/// Number of trailing components `a` and `b` have in common
fn shared_suffix(a: &[&str], b: &[&str]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Home if the name carries the home marker, root otherwise
pub fn kind_from_name(name: &str) -> SnapshotKind {
    if name.contains(&SnapshotKind::Home.marker()) {
        SnapshotKind::Home
    } else {
        SnapshotKind::Root
    }
}

/// Timestamp encoded at the end of a snapshot name, if any
pub fn timestamp_from_name(name: &str) -> Option<NaiveDateTime> {
    let token = NAME_TIMESTAMP.captures(name)?.get(1)?.as_str();
    NaiveDateTime::parse_from_str(token, TIMESTAMP_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn test_home_name_parses_kind_and_time() {
        assert_eq!(kind_from_name("snap_home_2025-11-02_10-30-00"), SnapshotKind::Home);
        assert_eq!(
            timestamp_from_name("snap_home_2025-11-02_10-30-00"),
            Some(at(2025, 11, 2, 10, 30, 0))
        );
    }

    #[test]
    fn test_name_without_marker_is_root() {
        assert_eq!(kind_from_name("snap_root_2025-11-02_10-30-00"), SnapshotKind::Root);
        assert_eq!(kind_from_name("manual-before-upgrade"), SnapshotKind::Root);
    }

    #[test]
    fn test_name_without_timestamp_falls_back_to_now() {
        assert_eq!(timestamp_from_name("manual-before-upgrade"), None);
        // Not anchored at the end
        assert_eq!(timestamp_from_name("snap_2025-11-02_10-30-00_old"), None);
        // Shape matches but the date is impossible
        assert_eq!(timestamp_from_name("snap_root_2025-13-45_10-30-00"), None);

        let before = Local::now().naive_local();
        let parsed = parse_listing(
            "ID 300 gen 9 top level 5 path snaps/manual-before-upgrade\n",
            Path::new("/snaps"),
        );
        let after = Local::now().naive_local();

        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].created_at >= before && parsed[0].created_at <= after);
    }

    #[test]
    fn test_parse_listing_skips_malformed_and_sorts() {
        let raw = "\
ID 256 gen 10 top level 5 path .snapshots/snap_root_2025-11-01_08-00-00
garbage line without the field
ID 257 gen 11 top level 5 path .snapshots/snap_home_2025-11-02_10-30-00

ID 258 gen 12 top level 5 path
pathological
ID 259 gen 13 top level 5 path .snapshots/snap_root_2025-11-03_09-15-30
";
        let snapshots = parse_listing(raw, Path::new("/root/.snapshots"));

        assert_eq!(snapshots.len(), 3);
        assert_eq!(snapshots[0].name, "snap_root_2025-11-03_09-15-30");
        assert_eq!(snapshots[1].name, "snap_home_2025-11-02_10-30-00");
        assert_eq!(snapshots[2].name, "snap_root_2025-11-01_08-00-00");

        assert_eq!(snapshots[1].kind, SnapshotKind::Home);
        assert_eq!(snapshots[1].created_at, at(2025, 11, 2, 10, 30, 0));
        assert_eq!(
            snapshots[1].path,
            PathBuf::from("/root/.snapshots/snap_home_2025-11-02_10-30-00")
        );
        assert!(snapshots.iter().all(|s| s.read_only));
    }

    #[test]
    fn test_path_with_spaces_is_kept_whole() {
        let raw = "ID 260 gen 14 top level 5 path backups/my snap_root_2025-01-01_00-00-00\n";
        let snapshots = parse_listing(raw, Path::new("/backups"));

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].name, "my snap_root_2025-01-01_00-00-00");
    }

    #[test]
    fn test_same_name_in_other_directories() {
        let raw = "\
ID 400 gen 20 top level 5 path @/root/.snapshots/snap_root_2025-01-01_00-00-00
ID 401 gen 21 top level 5 path timeshift/old/snap_root_2025-01-01_00-00-00
ID 402 gen 22 top level 5 path @home/.snapshots/snap_root_2025-01-01_00-00-00
ID 403 gen 23 top level 5 path snap_root_2025-01-01_00-00-00
";
        let snapshots = parse_listing(raw, Path::new("/root/.snapshots"));

        assert_eq!(snapshots.len(), 1);
        assert_eq!(
            snapshots[0].path,
            PathBuf::from("/root/.snapshots/snap_root_2025-01-01_00-00-00")
        );
    }

    #[test]
    fn test_paths_are_unique() {
        let raw = "\
ID 500 gen 30 top level 5 path @/root/.snapshots/snap_home_2025-03-01_12-00-00
ID 501 gen 31 top level 5 path other/.snapshots/snap_home_2025-03-01_12-00-00
ID 502 gen 32 top level 5 path @/root/.snapshots/snap_root_2025-03-01_12-00-00
";
        let snapshots = parse_listing(raw, Path::new("/root/.snapshots"));

        let mut paths: Vec<&PathBuf> = snapshots.iter().map(|s| &s.path).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), snapshots.len());
        assert_eq!(snapshots.len(), 2);
    }

    #[test]
    fn test_filesystem_root_target_keeps_top_level_only() {
        let raw = "\
ID 600 gen 40 top level 5 path snap_root_2025-04-01_00-00-00
ID 601 gen 41 top level 5 path nested/snap_root_2025-04-02_00-00-00
";
        let snapshots = parse_listing(raw, Path::new("/"));

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].path, PathBuf::from("/snap_root_2025-04-01_00-00-00"));
    }

    #[test]
    fn test_empty_listing() {
        assert!(parse_listing("", Path::new("/snaps")).is_empty());
        assert!(parse_listing("\n\nnot a listing\n", Path::new("/snaps")).is_empty());
    }
}
