//! Frame rendering for the progress monitor.
//!
//! Frames are plain strings of ANSI escape sequences. Each frame homes the
//! cursor and overwrites the previous one line by line, clearing to the end
//! of every line, so there is no flicker from a full clear. Column widths
//! depend only on the terminal width, never on the values shown.

use std::time::{Duration, Instant};

use super::app::{MonitorApp, Notice};
use crate::core::{MonitorEntry, MonitorStatus, PollSession};

const CLEAR_SCREEN: &str = "\x1b[2J";
const HOME: &str = "\x1b[H";
const CLEAR_EOL: &str = "\x1b[K";
const CLEAR_BELOW: &str = "\x1b[J";
pub const HIDE_CURSOR: &str = "\x1b[?25l";
pub const SHOW_CURSOR: &str = "\x1b[?25h";

const RESET: &str = "\x1b[0m";
const GREEN: &str = "\x1b[32m";
const BOLD_GREEN: &str = "\x1b[1;32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const BOLD_CYAN: &str = "\x1b[1;36m";
const WHITE: &str = "\x1b[37m";
const DIM: &str = "\x1b[2m";

/// Row width without the bar. With the smallest bar a row fits 80 columns.
const ROW_FIXED_WIDTH: usize = 69;
const MIN_BAR: usize = 10;
const MAX_BAR: usize = 40;

/// Ticks without progress before the row says so.
const STALL_NOTE_TICKS: u32 = 3;

/// Everything about a frame that does not come from the session.
pub struct FrameView {
    pub width: u16,
    pub clock: String,
    pub now: Instant,
    pub clear: bool,
}

pub fn render(app: &MonitorApp, view: &FrameView) -> String {
    render_session(&app.session, app.notice.as_ref(), view)
}

pub fn render_session(session: &PollSession, notice: Option<&Notice>, view: &FrameView) -> String {
    let cols = usize::from(view.width).max(20);
    let mut out = String::with_capacity(4096);

    if view.clear {
        out.push_str(CLEAR_SCREEN);
    }
    out.push_str(HOME);

    push_line(
        &mut out,
        cols,
        BOLD_CYAN,
        &format!("sg_format Progress Monitor   {}", view.clock),
    );
    push_line(&mut out, cols, CYAN, &"─".repeat(cols - 1));

    if session.entries.is_empty() {
        push_line(&mut out, cols, DIM, "  No devices being monitored.");
    } else {
        let bar_width = cols
            .saturating_sub(ROW_FIXED_WIDTH + 1)
            .clamp(MIN_BAR, MAX_BAR);
        push_line(&mut out, cols, DIM, &column_header(bar_width));
        for entry in &session.entries {
            push_line(
                &mut out,
                cols,
                row_color(entry),
                &entry_row(entry, bar_width, view.now),
            );
        }
    }

    push_line(&mut out, cols, CYAN, &"─".repeat(cols - 1));
    push_line(&mut out, cols, "", &summary(session));
    push_line(&mut out, cols, "", &interval_line(session, view.now));

    if let Some(notice) = notice {
        push_line(&mut out, cols, "", "");
        let color = if notice.ok { BOLD_GREEN } else { RED };
        push_line(&mut out, cols, color, &format!("  {}", notice.text));
    }

    push_line(
        &mut out,
        cols,
        WHITE,
        "  [r] refresh   [p] pause/resume   [+/-] interval   [q] quit   Ctrl+C exit",
    );
    push_line(
        &mut out,
        cols,
        DIM,
        "  Quitting stops monitoring only; running formats continue.",
    );
    out.push_str(CLEAR_BELOW);

    out
}

fn push_line(out: &mut String, cols: usize, color: &str, text: &str) {
    out.push('\r');
    out.push_str(color);
    out.push_str(&fit(text, cols - 1));
    if !color.is_empty() {
        out.push_str(RESET);
    }
    out.push_str(CLEAR_EOL);
    out.push_str("\r\n");
}

/// Truncate to `width` characters.
fn fit(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

fn row_color(entry: &MonitorEntry) -> &'static str {
    match entry.status {
        MonitorStatus::Complete => BOLD_GREEN,
        MonitorStatus::Failed | MonitorStatus::Unreachable => RED,
        MonitorStatus::Waiting => WHITE,
        MonitorStatus::Running => match entry.percent {
            Some(p) if p >= 50.0 => GREEN,
            _ => YELLOW,
        },
    }
}

fn column_header(bar_width: usize) -> String {
    format!(
        " {:>3} {:<6} {:<12} {:<11} {:<bar$} {:>7} {:>10} {:>10}",
        "Bay",
        "Dev",
        "Serial",
        "Status",
        "Progress",
        "",
        "Elapsed",
        "ETA",
        bar = bar_width + 2,
    )
}

fn entry_row(entry: &MonitorEntry, bar_width: usize, now: Instant) -> String {
    let device = &entry.device;
    let percent = match entry.percent {
        Some(p) => format!("{:6.2}%", p),
        None => "--".to_string(),
    };
    let eta = match (entry.status, entry.eta) {
        (MonitorStatus::Complete, _) => "done".to_string(),
        (_, Some(eta)) => format_duration(eta),
        (_, None) => "--".to_string(),
    };

    let name = device
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| device.path.display().to_string());

    let mut row = format!(
        " {:>3} {:<6} {:<12} {:<11} [{}] {:>7} {:>10} {:>10}",
        fit(&device.slot_label(), 3),
        fit(&name, 6),
        fit(&device.serial, 12),
        entry.status.label(),
        progress_bar(entry.percent, bar_width),
        percent,
        format_duration(entry.elapsed_at(now)),
        eta,
    );

    if entry.status == MonitorStatus::Running && entry.unchanged_ticks >= STALL_NOTE_TICKS {
        row.push_str(&format!("  (no change for {} polls)", entry.unchanged_ticks));
    }

    row
}

fn summary(session: &PollSession) -> String {
    let parts: Vec<String> = [
        (MonitorStatus::Complete, "done"),
        (MonitorStatus::Running, "formatting"),
        (MonitorStatus::Waiting, "waiting"),
        (MonitorStatus::Unreachable, "unreachable"),
        (MonitorStatus::Failed, "failed"),
    ]
    .into_iter()
    .filter_map(|(status, label)| {
        let n = session.count(status);
        (n > 0).then(|| format!("{} {}", n, label))
    })
    .collect();

    if parts.is_empty() {
        "  ...".to_string()
    } else {
        format!("  {}", parts.join("  |  "))
    }
}

fn interval_line(session: &PollSession, now: Instant) -> String {
    let interval = session.interval().as_secs();
    if session.paused {
        return format!("  PAUSED   Interval: {}s", interval);
    }

    let next = session.next_poll_at(now).saturating_duration_since(now);
    format!(
        "  Interval: {}s   Next poll in {}s",
        interval,
        next.as_secs_f64().ceil() as u64
    )
}

/// A bar of `width` cells. Unknown progress draws an empty bar.
pub fn progress_bar(percent: Option<f64>, width: usize) -> String {
    let pct = percent.unwrap_or(0.0).clamp(0.0, 100.0);
    let filled = ((pct * width as f64) / 100.0) as usize;
    format!("{}{}", "#".repeat(filled), ".".repeat(width - filled))
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
