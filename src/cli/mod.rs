//! Operator-facing surfaces: subcommands, the interactive menu and the live
//! progress monitor.

pub mod commands;
pub mod menu;
pub mod monitor;
pub mod select;
pub mod style;

use std::io::Write;

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Returned when the operator interrupts a prompt or input runs out.
#[derive(Debug, Error)]
#[error("interrupted")]
pub struct Interrupted;

/// Resolves on SIGINT or SIGTERM.
pub async fn interrupted() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Print `text` and read one trimmed line.
pub async fn prompt(text: &str) -> Result<String> {
    print!("{}", text);
    std::io::stdout().flush()?;

    let mut line = String::new();
    let mut reader = BufReader::new(tokio::io::stdin());

    tokio::select! {
        read = reader.read_line(&mut line) => {
            if read.context("Failed to read from stdin")? == 0 {
                println!();
                return Err(Interrupted.into());
            }
        }
        _ = interrupted() => {
            println!();
            return Err(Interrupted.into());
        }
    }

    Ok(line.trim().to_string())
}
