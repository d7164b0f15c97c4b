//! Interactive main menu, shown when no subcommand is given.

use std::io::IsTerminal;

use anyhow::Result;

use super::style::{bold, bold_cyan, dim, yellow};
use super::{commands, prompt};
use crate::context::AppContext;

const ITEMS: [&str; 3] = ["Health check", "Format disks", "Monitor format progress"];

pub async fn run(ctx: &AppContext) -> Result<()> {
    loop {
        if std::io::stdout().is_terminal() {
            print!("\x1b[2J\x1b[H");
        }

        println!();
        println!("  {}", bold_cyan("Disk Management Tool"));
        println!("  {}", "─".repeat(28));
        println!();
        for (i, label) in ITEMS.iter().enumerate() {
            println!("  {}  {}", yellow(&bold(&format!("[{}]", i + 1))), label);
        }
        println!();
        println!("  {}  Quit", dim("[q]"));
        println!();

        let choice = prompt(&format!("  {} ", bold("Choose:"))).await?;
        let needs_pause = match choice.to_lowercase().as_str() {
            "q" => return Ok(()),
            "1" => commands::health(ctx, false)?,
            "2" => commands::format(ctx, false).await?,
            "3" => commands::progress(ctx, &[]).await?,
            _ => {
                println!("  {}", yellow("Invalid choice."));
                true
            }
        };

        if needs_pause {
            prompt(&format!("\n  {} ", bold("Press Enter to return to menu..."))).await?;
        }
    }
}
