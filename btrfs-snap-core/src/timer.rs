// systemd user timer installation and status

use btrfs_snap_common::logfile::event;
use btrfs_snap_common::{
    OperationResult, RetentionPolicy, SnapshotTargets, TIMER_UNIT, TimerSchedule, TimerStatus,
};

use crate::runner::{CommandOutput, CommandRunner};
use crate::script::{self, ScriptParams, UnitPaths};

/// Installs and drives `btrfs-snap.timer` through `systemctl --user`
pub struct TimerController<R: CommandRunner> {
    runner: R,
    paths: UnitPaths,
}

impl<R: CommandRunner> TimerController<R> {
    pub fn new(runner: R, paths: UnitPaths) -> Self {
        Self { runner, paths }
    }

    pub fn paths(&self) -> &UnitPaths {
        &self.paths
    }

    fn systemctl(&self, args: &[&str]) -> CommandOutput {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push("--user");
        argv.extend_from_slice(args);
        self.runner.run("systemctl", &argv, false)
    }

    /// Write the script and units, then reload, enable and start the timer
    ///
    /// Write and reload failures are logged and the sequence continues; the
    /// first enable/start failure ends it with that command's stderr.
    pub fn enable(
        &self,
        schedule: TimerSchedule,
        retention: RetentionPolicy,
        targets: &SnapshotTargets,
    ) -> OperationResult {
        if let Err(e) = targets.validate() {
            log::error!("Refusing to install timer: {}", e);
            return OperationResult::error(e);
        }

        log::info!(
            "{}",
            event(
                "Enabling snapshot timer",
                &serde_json::json!({
                    "schedule": schedule,
                    "retention": retention,
                    "targets": targets,
                }),
            )
        );

        let params = ScriptParams {
            targets: targets.clone(),
            retention,
        };

        match script::write_script(&self.paths.script, &script::generate_script(&params)) {
            Ok(()) => log::info!("Snapshot script written to {}", self.paths.script.display()),
            Err(e) => log::error!("{:#}", e),
        }

        let service = script::service_unit(&self.paths.script);
        match script::write_artifact(&self.paths.service, &service) {
            Ok(()) => log::info!("Service unit written to {}", self.paths.service.display()),
            Err(e) => log::error!("{:#}", e),
        }

        match script::write_artifact(&self.paths.timer, &script::timer_unit(schedule)) {
            Ok(()) => log::info!("Timer unit written to {}", self.paths.timer.display()),
            Err(e) => log::error!("{:#}", e),
        }

        let reload = self.systemctl(&["daemon-reload"]);
        if !reload.success() {
            log::warn!("systemctl daemon-reload failed: {}", reload.stderr.trim());
        }

        let enable = self.systemctl(&["enable", TIMER_UNIT]);
        if !enable.success() {
            log::error!("Failed to enable timer: {}", enable.stderr.trim());
            return OperationResult::error(format!(
                "Failed to enable timer: {}",
                enable.stderr.trim()
            ));
        }

        let start = self.systemctl(&["start", TIMER_UNIT]);
        if !start.success() {
            log::error!("Failed to start timer: {}", start.stderr.trim());
            return OperationResult::error(format!(
                "Failed to start timer: {}",
                start.stderr.trim()
            ));
        }

        log::info!("Snapshot timer enabled ({})", schedule);
        OperationResult::success()
    }

    /// Stop and unregister the timer
    ///
    /// Succeeds even when the unit was never installed.
    pub fn disable(&self) -> OperationResult {
        log::info!("Disabling snapshot timer");

        let stop = self.systemctl(&["stop", TIMER_UNIT]);
        if !stop.success() {
            log::warn!("Failed to stop timer: {}", stop.stderr.trim());
        }

        let disable = self.systemctl(&["disable", TIMER_UNIT]);
        if !disable.success() {
            log::warn!("Failed to disable timer: {}", disable.stderr.trim());
        }

        log::info!("Snapshot timer disabled");
        OperationResult::success()
    }

    /// Query enabled/active state, verbose status and next/last run
    pub fn status(&self) -> TimerStatus {
        let mut status = TimerStatus::default();

        status.enabled = self.systemctl(&["is-enabled", TIMER_UNIT]).stdout.trim() == "enabled";
        status.active = self.systemctl(&["is-active", TIMER_UNIT]).stdout.trim() == "active";
        status.raw_status = self.systemctl(&["status", TIMER_UNIT]).stdout;

        let listing = self.systemctl(&["list-timers", "--all"]);
        let (next_run, last_run) = parse_timer_listing(&listing.stdout, TIMER_UNIT);
        status.next_run = next_run;
        status.last_run = last_run;

        status
    }
}

/// Next and last run of `unit` from `systemctl list-timers` output
///
/// Columns are taken by position (0-1 next, 2-3 last) after splitting on
/// whitespace. This depends on the tool's locale and column layout; a layout
/// change yields `None`, never an error.
pub fn parse_timer_listing(listing: &str, unit: &str) -> (Option<String>, Option<String>) {
    let Some(line) = listing.lines().find(|line| line.contains(unit)) else {
        return (None, None);
    };

    let parts: Vec<&str> = line.split_whitespace().collect();
    let next_run = (parts.len() >= 2).then(|| format!("{} {}", parts[0], parts[1]));
    let last_run = (parts.len() >= 4).then(|| format!("{} {}", parts[2], parts[3]));

    (next_run, last_run)
}
