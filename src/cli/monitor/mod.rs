//! Live progress monitor.
//!
//! One cooperative loop on the current task: it waits on whichever comes
//! first of a keypress, the next poll deadline, the frame tick (which also
//! collects finished format jobs) and an interrupt signal, then redraws.
//!
//! Leaving the monitor never stops a format. Processes started by
//! `diskops format` keep running after `q`; run `diskops progress <DEV>...`
//! to watch them again.

mod app;
mod input;
mod ui;

use std::io::{self, Stdout, Write};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{Event, EventStream};
use crossterm::terminal::{self, disable_raw_mode, enable_raw_mode};
use futures::StreamExt;
use tokio::time::MissedTickBehavior;
use tracing::debug;

pub use app::{Action, MonitorApp, Notice};
pub use ui::{FrameView, format_duration, render_session};

/// Redraw cadence, and how often finished jobs are collected.
const FRAME_INTERVAL: Duration = Duration::from_millis(250);

/// Raw mode and a hidden cursor for as long as it lives. Dropping it puts
/// the terminal back, whichever way the monitor exits.
struct TerminalGuard {
    out: Stdout,
}

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode().context("Failed to enable raw mode")?;
        let mut out = io::stdout();
        out.write_all(ui::HIDE_CURSOR.as_bytes())?;
        out.flush()?;
        Ok(Self { out })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = write!(self.out, "{}\r\n", ui::SHOW_CURSOR);
        let _ = self.out.flush();
    }
}

/// Run the monitor until every device settles or the operator quits.
/// Returns the app so the caller can report what was left running.
pub async fn run(mut app: MonitorApp) -> Result<MonitorApp> {
    let mut terminal = TerminalGuard::enter()?;
    let result = run_app(&mut terminal.out, &mut app).await;
    drop(terminal);

    result.map(|_| app)
}

async fn run_app(out: &mut Stdout, app: &mut MonitorApp) -> Result<()> {
    let mut input = EventStream::new();
    let mut frame_tick = tokio::time::interval(FRAME_INTERVAL);
    frame_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let interrupt = super::interrupted();
    tokio::pin!(interrupt);

    let mut clear = true;
    app.poll().await;
    draw(out, app, &mut clear)?;

    while app.running {
        let deadline = app.session.next_poll_at(Instant::now());
        let paused = app.session.paused;

        tokio::select! {
            _ = &mut interrupt => {
                debug!("Interrupted");
                app.quit();
            }
            event = input.next() => match event {
                Some(Ok(Event::Resize(..))) => clear = true,
                Some(Ok(event)) => {
                    if let Some(action) = input::handle_event(event) {
                        debug!(?action, "Key");
                        app.handle_action(action).await;
                    }
                }
                Some(Err(e)) => return Err(e).context("Failed to read terminal input"),
                None => app.quit(),
            },
            _ = tokio::time::sleep_until(deadline.into()), if !paused => {
                app.poll().await;
            }
            _ = frame_tick.tick() => {
                app.check_jobs();
            }
        }

        if app.running && app.finished() {
            app.complete();
        }

        draw(out, app, &mut clear)?;
    }

    Ok(())
}

fn draw(out: &mut Stdout, app: &MonitorApp, clear: &mut bool) -> Result<()> {
    let (width, _) = terminal::size().unwrap_or((80, 24));
    let view = FrameView {
        width,
        clock: chrono::Local::now().format("%Y-%m-%d  %H:%M:%S").to_string(),
        now: Instant::now(),
        clear: *clear,
    };
    *clear = false;

    out.write_all(ui::render(app, &view).as_bytes())
        .context("Failed to write to terminal")?;
    out.flush().context("Failed to write to terminal")?;
    Ok(())
}
