use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use diskops::cli::{self, Interrupted, commands};
use diskops::config::{AppConfig, DEFAULT_CONFIG_PATH};
use diskops::core::{EventLog, EventSink, MemoryEventLog};
use diskops::{adapters, context::AppContext, logging};
use nix::unistd::Uid;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "diskops")]
#[command(about = "Disk health, format, and progress monitoring for expander bays", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Show disk health via HDSentinel
    Health {
        /// Full detailed report
        #[arg(long)]
        dump: bool,
    },
    /// Interactive low-level format
    Format {
        /// Use fast format mode (sg_format --ffmt=1)
        #[arg(long)]
        fast: bool,
    },
    /// Monitor sg_format progress
    Progress {
        /// Devices to monitor (omit for interactive selection)
        #[arg(value_name = "DEV")]
        devices: Vec<PathBuf>,
    },
}

/// Command-line values layered over the configuration file.
#[derive(Args, Serialize)]
struct ConfigArgs {
    /// Run against a simulated enclosure
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, global = true)]
    simulation: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, global = true)]
    verbose: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, global = true)]
    json_logs: bool,

    /// Seconds between progress polls (1-60)
    #[serde(rename = "poll_interval_secs", skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    interval: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    event_log: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    trace_log: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config =
        AppConfig::load(&config_path, Some(&args.overrides)).context("Failed to load configuration")?;

    logging::init(logging::LogConfig {
        json: config.json_logs,
        verbose: config.verbose,
        file: config.trace_log.clone(),
    })
    .context("Failed to open trace log")?;

    adapters::demo_layout(&mut config);
    // Layout errors are fatal before any device is touched.
    config.slot_index()?;

    if !config.simulation && !Uid::effective().is_root() {
        anyhow::bail!("This tool must be run as root.");
    }

    let tools = adapters::get_tools(&config);
    let events: Arc<dyn EventSink> = match config.event_log_path() {
        Some(path) => Arc::new(EventLog::open(&path)),
        None => Arc::new(MemoryEventLog::new()),
    };
    let ctx = AppContext::new(config, tools, events);

    let result = match &args.command {
        None => cli::menu::run(&ctx).await,
        Some(Commands::Health { dump }) => commands::health(&ctx, *dump).map(|_| ()),
        Some(Commands::Format { fast }) => commands::format(&ctx, *fast).await.map(|_| ()),
        Some(Commands::Progress { devices }) => {
            commands::progress(&ctx, devices).await.map(|_| ())
        }
    };

    match result {
        Err(e) if e.is::<Interrupted>() => std::process::exit(130),
        other => other,
    }
}
