// Persistent per-user configuration for btrfs-snap

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::{RetentionPolicy, SnapshotTargets, TimerSchedule};

/// Recurring snapshot settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimerConfig {
    pub enabled: bool,
    pub schedule: TimerSchedule,
    pub retention: RetentionPolicy,
}

/// User configuration document
///
/// Every field falls back to its default when missing from the stored file,
/// so documents written by older versions keep loading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Directory receiving root snapshots (default: /root/.snapshots)
    pub root_target: PathBuf,

    /// Directory receiving home snapshots (default: /root/.snapshots)
    pub home_target: PathBuf,

    /// Prefix of every snapshot name (default: snap)
    pub name_prefix: String,

    /// Paths under home the operator does not care to keep
    pub exclusions: Vec<String>,

    pub timer: TimerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root_target: PathBuf::from("/root/.snapshots"),
            home_target: PathBuf::from("/root/.snapshots"),
            name_prefix: "snap".to_string(),
            exclusions: vec![
                "Downloads".to_string(),
                "Cache".to_string(),
                ".cache".to_string(),
                ".npm/_cacache".to_string(),
                ".mozilla/firefox/*/cache2".to_string(),
                ".config/google-chrome/*/Cache".to_string(),
            ],
            timer: TimerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Snapshot destinations and naming taken from this configuration
    pub fn targets(&self) -> SnapshotTargets {
        SnapshotTargets {
            root_target: self.root_target.clone(),
            home_target: self.home_target.clone(),
            prefix: self.name_prefix.clone(),
        }
    }

    /// Merge a partial update into this configuration
    ///
    /// `timer` replaces the whole timer block rather than merging into it.
    pub fn apply(&mut self, patch: ConfigPatch) {
        if let Some(root_target) = patch.root_target {
            self.root_target = root_target;
        }
        if let Some(home_target) = patch.home_target {
            self.home_target = home_target;
        }
        if let Some(name_prefix) = patch.name_prefix {
            self.name_prefix = name_prefix;
        }
        if let Some(exclusions) = patch.exclusions {
            self.exclusions = exclusions;
        }
        if let Some(timer) = patch.timer {
            self.timer = timer;
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.targets().validate()
    }
}

/// Partial configuration update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigPatch {
    pub root_target: Option<PathBuf>,
    pub home_target: Option<PathBuf>,
    pub name_prefix: Option<String>,
    pub exclusions: Option<Vec<String>>,
    pub timer: Option<TimerConfig>,
}

/// Reads and writes the configuration document
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Create a store at the default per-user location
    ///
    /// Uses `~/.config/btrfs-snap/config.toml`; the `BTRFS_SNAP_CONFIG`
    /// environment variable overrides the path.
    pub fn new() -> Self {
        let config_path = std::env::var_os("BTRFS_SNAP_CONFIG")
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|dir| dir.join("btrfs-snap").join("config.toml")))
            .unwrap_or_else(|| PathBuf::from("/tmp/btrfs-snap-config.toml"));

        Self { config_path }
    }

    /// Create a store backed by an explicit file
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Load the stored configuration
    ///
    /// A missing file is not an error and yields the defaults.
    pub fn load(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            return Ok(AppConfig::default());
        }

        let mut file = self.locked_file(false)?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .with_context(|| format!("Failed to read {}", self.config_path.display()))?;
        fs2::FileExt::unlock(&file).ok();

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.config_path.display()))?;

        Ok(config)
    }

    /// Current configuration, falling back to defaults on any read error
    pub fn get(&self) -> AppConfig {
        self.load().unwrap_or_else(|e| {
            log::error!("Failed to load configuration: {:#}", e);
            AppConfig::default()
        })
    }

    /// Validate and write a full configuration document
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        config.validate().map_err(|e| anyhow::anyhow!(e))?;

        let content = toml::to_string_pretty(config).context("Failed to serialize configuration")?;

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let _lock = self.locked_file(true)?;
        let tmp_path = self.config_path.with_extension("tmp");

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)
                .with_context(|| {
                    format!(
                        "Failed to open temporary configuration file {}",
                        tmp_path.display()
                    )
                })?;
            file.write_all(content.as_bytes())
                .context("Failed to write configuration")?;
            file.sync_all().context("Failed to sync configuration")?;
        }

        fs::rename(&tmp_path, &self.config_path)
            .with_context(|| format!("Failed to replace {}", self.config_path.display()))?;

        Ok(())
    }

    /// Merge a partial update into the stored configuration
    pub fn set(&self, patch: ConfigPatch) -> bool {
        let mut config = self.get();
        config.apply(patch);

        match self.save(&config) {
            Ok(()) => {
                log::info!("Configuration saved to {}", self.config_path.display());
                true
            }
            Err(e) => {
                log::error!("Failed to save configuration: {:#}", e);
                false
            }
        }
    }

    /// Overwrite the stored configuration with the defaults
    pub fn reset(&self) -> AppConfig {
        let defaults = AppConfig::default();
        if let Err(e) = self.save(&defaults) {
            log::error!("Failed to reset configuration: {:#}", e);
        }
        defaults
    }

    fn locked_file(&self, write: bool) -> Result<std::fs::File> {
        let file = OpenOptions::new()
            .read(true)
            .write(write)
            .create(write)
            .truncate(false)
            .open(&self.config_path)
            .with_context(|| format!("Failed to open {}", self.config_path.display()))?;

        if write {
            fs2::FileExt::lock_exclusive(&file)
                .context("Failed to lock configuration for writing")?;
        } else {
            fs2::FileExt::lock_shared(&file)
                .context("Failed to lock configuration for reading")?;
        }

        Ok(file)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}
