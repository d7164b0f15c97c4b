//! The `health`, `format` and `progress` commands.
//!
//! Each returns `true` when it left output the operator should read before
//! the menu redraws.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use super::monitor::{self, MonitorApp};
use super::select::{choose_devices, print_device_table};
use super::style::{bold, bold_red, cyan, dim, yellow};
use super::prompt;
use crate::context::AppContext;
use crate::core::discovery::describe;
use crate::core::{
    FormatEvent, FormatLauncher, FormatMode, JobState, PathResolver, ResolvedDevice, ToolError,
};

/// Resolve every populated bay, in configured port order.
pub fn discover(ctx: &AppContext) -> Result<Vec<ResolvedDevice>> {
    let index = ctx.config.slot_index().context("Invalid enclosure configuration")?;
    let devices = PathResolver::new(&index, ctx.tools.as_ref()).resolve();
    info!(ports = index.len(), found = devices.len(), "Discovery finished");
    Ok(devices)
}

pub fn health(ctx: &AppContext, dump: bool) -> Result<bool> {
    let devices = discover(ctx)?;
    if devices.is_empty() {
        println!("{}", yellow("No disks connected on specified ports."));
        return Ok(false);
    }

    println!("  {}", cyan("Scanning disks ..."));
    let nodes: Vec<PathBuf> = devices.into_iter().map(|d| d.path).collect();
    match ctx.tools.health_report(&nodes, dump) {
        Ok(()) => {}
        Err(ToolError::Spawn { tool, .. }) => {
            anyhow::bail!("{} could not be started; check health_tool in the configuration", tool)
        }
        Err(e) => println!("  {}", yellow(&e.to_string())),
    }
    Ok(true)
}

pub async fn format(ctx: &AppContext, fast: bool) -> Result<bool> {
    let devices = discover(ctx)?;
    if devices.is_empty() {
        println!("{}", yellow("No disks found on specified ports."));
        return Ok(false);
    }

    print_device_table(&devices);
    let selected = choose_devices(
        &devices,
        "Enter device numbers to format (space-separated, 'all', or Enter to cancel): ",
    )
    .await?;
    if selected.is_empty() {
        return Ok(false);
    }

    let mode = if fast {
        FormatMode::Fast
    } else {
        let answer = prompt(&bold("Format mode: [n]ormal (default) or [f]ast: ")).await?;
        match answer.to_lowercase().as_str() {
            "f" | "fast" => FormatMode::Fast,
            _ => FormatMode::Full,
        }
    };

    println!("\n  {}", bold("Selected for formatting:"));
    for d in &selected {
        println!(
            "    {}  {}  s/n: {}",
            cyan(&d.path.display().to_string()),
            dim(&d.model),
            d.serial
        );
    }
    println!();
    println!(
        "  {} This will {} all data on the selected devices!",
        bold_red("!! WARNING:"),
        bold("PERMANENTLY ERASE")
    );
    let label = match mode {
        FormatMode::Full => "FULL format".to_string(),
        FormatMode::Fast => "FAST format (ffmt=1)".to_string(),
    };
    println!(
        "  {}",
        dim(&format!("Mode: {}; sector size {} bytes.", label, ctx.config.sector_size))
    );
    println!();

    if prompt(&bold("  Type YES to confirm: ")).await? != "YES" {
        ctx.events.emit(FormatEvent::Aborted {
            devices: selected.iter().map(|d| d.path.clone()).collect(),
        });
        println!("{}", yellow("\n  Aborted."));
        return Ok(false);
    }

    println!();
    for d in &selected {
        println!("  {}", cyan(&format!("==> Starting format on {} ...", d.path.display())));
    }

    let mut launcher = FormatLauncher::new(ctx.tools.clone(), ctx.events.clone());
    launcher.launch(&selected, mode);

    for job in launcher.jobs().iter().filter(|j| j.state == JobState::Failed) {
        println!(
            "    {} to start format on {}",
            bold_red("FAILED"),
            job.device.path.display()
        );
    }

    if !launcher.has_running() {
        println!("{}", bold_red("\n  No formats were started."));
        return Ok(true);
    }

    println!("\n  {}", cyan("Handing off to progress monitor ..."));
    let app = MonitorApp::chained(
        launcher,
        ctx.tools.clone(),
        ctx.events.clone(),
        ctx.config.poll_interval_secs,
    );
    let app = monitor::run(app).await?;
    report_abandoned(&app);
    Ok(false)
}

pub async fn progress(ctx: &AppContext, requested: &[PathBuf]) -> Result<bool> {
    let devices = discover(ctx)?;

    let selected = if requested.is_empty() {
        if devices.is_empty() {
            println!("{}", yellow("No disks found on specified ports."));
            return Ok(false);
        }
        print_device_table(&devices);
        choose_devices(
            &devices,
            "Enter device numbers to monitor (space-separated, 'all', or Enter to cancel): ",
        )
        .await?
    } else {
        requested
            .iter()
            .map(|path| match devices.iter().find(|d| &d.path == path) {
                Some(d) => d.clone(),
                None => describe(ctx.tools.as_ref(), path, None, None),
            })
            .collect()
    };

    if selected.is_empty() {
        return Ok(false);
    }

    let app = MonitorApp::standalone(
        selected,
        ctx.tools.clone(),
        ctx.events.clone(),
        ctx.config.poll_interval_secs,
    );
    let app = monitor::run(app).await?;
    report_abandoned(&app);
    Ok(false)
}

fn report_abandoned(app: &MonitorApp) {
    if app.abandoned.is_empty() {
        return;
    }

    let list = app
        .abandoned
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" ");
    println!(
        "  {}",
        yellow(&format!("Monitoring stopped. Formats still running on: {}", list))
    );
    println!(
        "  {}",
        dim(&format!("Reattach with: diskops progress {}", list))
    );
}
