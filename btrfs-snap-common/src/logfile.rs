//! Rotating application log
//!
//! `LogFile` is handed to `env_logger` as its output target, so every
//! `log::info!`/`warn!`/`error!` in the workspace ends up in
//! `~/.local/share/btrfs-snap/logs/app.log`. `LogStore` owns the file
//! location and provides rotation, retrieval and clearing.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Rotate once the active log grows past this size
pub const MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;

const LOG_FILE_NAME: &str = "app.log";

/// Location and retention of the application log
#[derive(Debug, Clone)]
pub struct LogStore {
    log_path: PathBuf,
    max_size: u64,
}

impl LogStore {
    /// Log store at the default per-user location
    ///
    /// `BTRFS_SNAP_LOG_DIR` overrides the directory.
    pub fn new() -> Self {
        let log_dir = std::env::var_os("BTRFS_SNAP_LOG_DIR")
            .map(PathBuf::from)
            .or_else(|| dirs::data_dir().map(|dir| dir.join("btrfs-snap").join("logs")))
            .unwrap_or_else(|| PathBuf::from("/tmp/btrfs-snap-logs"));

        Self::with_dir(log_dir)
    }

    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            log_path: dir.as_ref().join(LOG_FILE_NAME),
            max_size: MAX_LOG_SIZE,
        }
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// The single rotated backup, `app.log.old`
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.log_path.as_os_str().to_owned();
        name.push(".old");
        PathBuf::from(name)
    }

    /// Move the active log aside once it exceeds the size threshold
    ///
    /// Any previous backup is replaced, so at most one backup exists.
    /// Returns whether a rotation happened.
    pub fn rotate_if_needed(&self) -> Result<bool> {
        let size = match fs::metadata(&self.log_path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e).context("Failed to stat log file"),
        };

        if size <= self.max_size {
            return Ok(false);
        }

        let backup = self.backup_path();
        if backup.exists() {
            fs::remove_file(&backup)
                .with_context(|| format!("Failed to remove {}", backup.display()))?;
        }
        fs::rename(&self.log_path, &backup)
            .with_context(|| format!("Failed to rotate {}", self.log_path.display()))?;

        Ok(true)
    }

    /// Append raw text to the active log, rotating first if needed
    pub fn append(&self, entry: &[u8]) -> Result<()> {
        self.rotate_if_needed()?;

        if let Some(parent) = self.log_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("Failed to open {}", self.log_path.display()))?;
        file.write_all(entry).context("Failed to write log entry")?;

        Ok(())
    }

    /// Accumulated log text; empty when nothing has been logged yet
    pub fn read(&self) -> String {
        match fs::read_to_string(&self.log_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                log::warn!("Failed to read {}: {}", self.log_path.display(), e);
                String::new()
            }
        }
    }

    /// Remove the active log file
    pub fn clear(&self) -> bool {
        match fs::remove_file(&self.log_path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => {
                log::warn!("Failed to clear {}: {}", self.log_path.display(), e);
                false
            }
        }
    }

    /// Writer suitable for `env_logger::Target::Pipe`
    pub fn writer(&self, echo_stderr: bool) -> LogFile {
        LogFile {
            store: self.clone(),
            echo_stderr,
        }
    }
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new()
    }
}

/// `Write` sink appending formatted log records to the log file
pub struct LogFile {
    store: LogStore,
    echo_stderr: bool,
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.echo_stderr {
            io::stderr().write_all(buf)?;
        }

        // Log file errors are reported, never returned
        if let Err(e) = self.store.append(buf) {
            if !self.echo_stderr {
                eprintln!("btrfs-snap: {:#}", e);
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.echo_stderr {
            io::stderr().flush()?;
        }
        Ok(())
    }
}

/// Render a log message with structured context as pretty JSON
pub fn event<T: Serialize + ?Sized>(message: &str, data: &T) -> String {
    match serde_json::to_string_pretty(data) {
        Ok(json) => format!("{}\n{}", message, json),
        Err(_) => message.to_string(),
    }
}
