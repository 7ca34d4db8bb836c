// External command execution with optional privilege elevation

use btrfs_snap_common::ELEVATION_BINARY;
use serde::{Deserialize, Serialize};
use std::process::Command;

/// Captured result of an external command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Output standing in for a process that could not be started
    pub fn spawn_failure(description: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: description.into(),
            exit_code: 1,
        }
    }
}

/// Runs external programs
///
/// Implementations never fail: a program that cannot be spawned is reported
/// as exit code 1 with the reason in `stderr`, so callers only ever check
/// [`CommandOutput::success`].
pub trait CommandRunner {
    /// Run `program` with `args`, under `pkexec` when `elevate` is set
    fn run(&self, program: &str, args: &[&str], elevate: bool) -> CommandOutput;

    /// Whether `program` can be found on `PATH`
    fn is_resolvable(&self, program: &str) -> bool;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, program: &str, args: &[&str], elevate: bool) -> CommandOutput {
        (**self).run(program, args, elevate)
    }

    fn is_resolvable(&self, program: &str) -> bool {
        (**self).is_resolvable(program)
    }
}

/// Build the argv actually executed
///
/// Elevation prepends the wrapper and shifts the target program into the
/// argument list; each original argument stays a separate argv entry.
pub fn invocation<'a>(
    program: &'a str,
    args: &[&'a str],
    elevate: bool,
    elevation: &'a str,
) -> (&'a str, Vec<&'a str>) {
    if elevate {
        let mut wrapped = Vec::with_capacity(args.len() + 1);
        wrapped.push(program);
        wrapped.extend_from_slice(args);
        (elevation, wrapped)
    } else {
        (program, args.to_vec())
    }
}

/// Runner backed by `std::process::Command`
#[derive(Debug, Clone)]
pub struct SystemRunner {
    elevation: String,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self {
            elevation: ELEVATION_BINARY.to_string(),
        }
    }

    /// Use a different elevation wrapper (e.g. `sudo` when no polkit agent runs)
    pub fn with_elevation(elevation: impl Into<String>) -> Self {
        Self {
            elevation: elevation.into(),
        }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], elevate: bool) -> CommandOutput {
        let (command, argv) = invocation(program, args, elevate, &self.elevation);

        log::info!("Running command: {} {}", command, argv.join(" "));

        match Command::new(command).args(&argv).output() {
            Ok(output) => CommandOutput {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                // Killed by a signal: no exit code
                exit_code: output.status.code().unwrap_or(1),
            },
            Err(e) => {
                log::error!("Failed to run {}: {}", command, e);
                CommandOutput::spawn_failure(format!("Failed to run {}: {}", command, e))
            }
        }
    }

    fn is_resolvable(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}
