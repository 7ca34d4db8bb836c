// Rendering of operation results for the terminal

use anyhow::{Context, Result};
use btrfs_snap_common::{
    AppConfig, CreateResult, OperationResult, RestoreResult, Snapshot, SystemCheck, TimerStatus,
};
use serde::Serialize;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    println!("{}", json);
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

#[derive(Serialize)]
struct CheckReport<'a> {
    #[serde(flatten)]
    system: &'a SystemCheck,
    timers: &'a TimerStatus,
}

pub fn check(system: &SystemCheck, timers: &TimerStatus, json: bool) -> Result<()> {
    if json {
        return print_json(&CheckReport { system, timers });
    }

    println!("btrfs available:   {}", yes_no(system.btrfs_available));
    if let Some(error) = &system.error {
        println!("error:             {}", error);
        return Ok(());
    }
    println!("root subvolume:    {}", yes_no(system.root_subvolume_present));
    println!("home subvolume:    {}", yes_no(system.home_subvolume_present));
    println!(
        "space (/):         {} free, {} used, {} total",
        system.space.free, system.space.used, system.space.total
    );
    println!(
        "timer:             {}, {}",
        if timers.enabled { "enabled" } else { "disabled" },
        if timers.active { "active" } else { "inactive" }
    );
    Ok(())
}

pub fn snapshots(snapshots: &[Snapshot], json: bool) -> Result<()> {
    if json {
        return print_json(snapshots);
    }

    if snapshots.is_empty() {
        println!("No snapshots found");
        return Ok(());
    }

    for snapshot in snapshots {
        println!(
            "{}  {:<4}  {}",
            snapshot.format_timestamp(),
            snapshot.kind.as_str(),
            snapshot.path.display()
        );
    }
    Ok(())
}

fn print_log(log: &[String]) {
    for line in log {
        println!("  {}", line);
    }
}

pub fn create(result: &CreateResult, json: bool) -> Result<()> {
    if json {
        return print_json(result);
    }

    print_log(&result.log);
    if !result.ok {
        if let Some(root) = &result.root_name {
            println!("Partial: root snapshot {} exists, home snapshot failed", root);
        }
        if let Some(error) = &result.error {
            eprintln!("Error: {}", error.trim());
        }
    }
    Ok(())
}

pub fn restore(result: &RestoreResult, json: bool) -> Result<()> {
    if json {
        return print_json(result);
    }

    print_log(&result.log);
    if result.ok {
        println!();
        println!("{}", result.note);
    } else if let Some(error) = &result.error {
        eprintln!("Error: {}", error.trim());
    }
    Ok(())
}

pub fn operation(success: &str, result: &OperationResult, json: bool) -> Result<()> {
    if json {
        return print_json(result);
    }

    if result.ok {
        println!("{}", success);
    } else if let Some(error) = &result.error {
        eprintln!("Error: {}", error.trim());
    }
    Ok(())
}

pub fn timer_status(status: &TimerStatus, json: bool) -> Result<()> {
    if json {
        return print_json(status);
    }

    println!("enabled:  {}", yes_no(status.enabled));
    println!("active:   {}", yes_no(status.active));
    println!("next run: {}", status.next_run.as_deref().unwrap_or("-"));
    println!("last run: {}", status.last_run.as_deref().unwrap_or("-"));
    if !status.raw_status.trim().is_empty() {
        println!();
        println!("{}", status.raw_status.trim_end());
    }
    Ok(())
}

pub fn config(config: &AppConfig, json: bool) -> Result<()> {
    if json {
        return print_json(config);
    }

    println!("root target: {}", config.root_target.display());
    println!("home target: {}", config.home_target.display());
    println!("prefix:      {}", config.name_prefix);
    println!("exclusions:  {}", config.exclusions.join(", "));
    println!(
        "timer:       {} ({}, {})",
        if config.timer.enabled { "enabled" } else { "disabled" },
        config.timer.schedule,
        config.timer.retention
    );
    Ok(())
}
