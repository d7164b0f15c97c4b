//! Live format progress tracking.
//!
//! A [`PollSession`] holds one [`MonitorEntry`] per watched device. The
//! [`Poller`] refreshes the entries on every tick; the control loop decides
//! when a tick happens and the renderer reads the entries afterwards.
//! Nothing here is persisted; only state transitions reach the event log.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use regex::Regex;
use tracing::{debug, warn};

use super::events::{EventSink, FormatEvent};
use super::hardware::DiskTools;
use super::launcher::JobOutcome;
use super::models::{JobState, MonitorStatus, ResolvedDevice};
use crate::logging::LogThrottle;

pub const MIN_INTERVAL_SECS: u64 = 1;
pub const MAX_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_INTERVAL_SECS: u64 = 5;
pub const INTERVAL_STEP_SECS: i64 = 1;

/// A device that stops reporting progress at or above this percentage is
/// taken to have finished.
pub const NEAR_COMPLETE_PERCENT: f64 = 90.0;

const UNREACHABLE_WARN_INTERVAL: Duration = Duration::from_secs(30);

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").expect("valid regex"));
static RATIO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,5})\s*/\s*(65535|65536)\b").expect("valid regex"));
static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)progress indication|format in progress").expect("valid regex")
});

#[derive(Debug, Clone)]
pub struct MonitorEntry {
    pub device: ResolvedDevice,
    /// `None` means the last query carried no progress at all, which is not
    /// the same as sitting at 0%.
    pub percent: Option<f64>,
    pub status: MonitorStatus,
    pub started: Instant,
    pub elapsed: Duration,
    pub eta: Option<Duration>,
    /// Consecutive ticks on which the percent did not move.
    pub unchanged_ticks: u32,
    /// Set when a format job owns this device's terminal events.
    pub job_backed: bool,
    last_known: Option<f64>,
    /// First reading seen by this session, for entries that joined a
    /// format already under way.
    baseline: Option<(Instant, f64)>,
}

impl MonitorEntry {
    pub fn new(device: ResolvedDevice, started: Instant) -> Self {
        Self {
            device,
            percent: None,
            status: MonitorStatus::Waiting,
            started,
            elapsed: Duration::ZERO,
            eta: None,
            unchanged_ticks: 0,
            job_backed: false,
            last_known: None,
            baseline: None,
        }
    }

    pub fn job_backed(mut self) -> Self {
        self.job_backed = true;
        self
    }

    /// Elapsed time as of `now`, frozen once the entry is terminal.
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        if self.status.is_terminal() {
            self.elapsed
        } else {
            now.saturating_duration_since(self.started)
        }
    }

    /// Remaining time from the rate observed since the first reading. The
    /// format's true start is unknown here, so elapsed time cannot be used.
    fn observed_eta(&mut self, now: Instant, percent: f64) -> Option<Duration> {
        match self.baseline {
            Some((since, from)) if percent >= from => {
                estimate_from_baseline(now.saturating_duration_since(since), from, percent)
            }
            _ => {
                self.baseline = Some((now, percent));
                None
            }
        }
    }

    fn finish(&mut self, status: MonitorStatus, now: Instant) {
        if !self.status.is_terminal() {
            self.elapsed = now.saturating_duration_since(self.started);
        }
        self.status = status;
        self.eta = None;
        if status == MonitorStatus::Complete {
            self.percent = Some(100.0);
            self.last_known = Some(100.0);
        }
    }
}

pub struct PollSession {
    pub entries: Vec<MonitorEntry>,
    interval: Duration,
    pub paused: bool,
    pub last_refresh: Option<Instant>,
}

impl PollSession {
    pub fn new(entries: Vec<MonitorEntry>, interval_secs: u64) -> Self {
        Self {
            entries,
            interval: Duration::from_secs(clamp_interval(interval_secs as i64)),
            paused: false,
            last_refresh: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Move the interval by `delta_secs`, staying within 1..=60 seconds.
    pub fn adjust_interval(&mut self, delta_secs: i64) {
        let current = self.interval.as_secs() as i64;
        self.interval = Duration::from_secs(clamp_interval(current + delta_secs));
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// When the next scheduled poll is due. Immediately if never polled.
    pub fn next_poll_at(&self, now: Instant) -> Instant {
        match self.last_refresh {
            Some(last) => last + self.interval,
            None => now,
        }
    }

    pub fn poll_due(&self, now: Instant) -> bool {
        !self.paused && now >= self.next_poll_at(now)
    }

    pub fn all_terminal(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|e| e.status.is_terminal())
    }

    pub fn count(&self, status: MonitorStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    /// Fold a finished format job into the matching entry. The job's exit
    /// status is the most specific answer available, so it overrides
    /// whatever the poller last concluded.
    pub fn apply_job_outcome(&mut self, outcome: &JobOutcome, now: Instant) {
        let Some(entry) = self.entries.iter_mut().find(|e| e.device.path == outcome.device) else {
            return;
        };

        match outcome.state {
            JobState::Complete => entry.finish(MonitorStatus::Complete, now),
            JobState::Failed => entry.finish(MonitorStatus::Failed, now),
            JobState::Pending | JobState::Running => {}
        }
    }
}

fn clamp_interval(secs: i64) -> u64 {
    secs.clamp(MIN_INTERVAL_SECS as i64, MAX_INTERVAL_SECS as i64) as u64
}

/// Linear extrapolation of the remaining time from progress so far.
///
/// Unknown or zero progress has no estimate.
pub fn estimate_remaining(elapsed: Duration, percent: Option<f64>) -> Option<Duration> {
    let percent = percent?;
    if !percent.is_finite() || percent <= 0.0 {
        return None;
    }
    if percent >= 100.0 {
        return Some(Duration::ZERO);
    }

    let secs = elapsed.as_secs_f64() * (100.0 - percent) / percent;
    Some(Duration::from_secs_f64(secs.max(0.0).round()))
}

/// Remaining time from progress gained over `since`, going from `from` to
/// `to` percent. No gain means no estimate.
pub fn estimate_from_baseline(since: Duration, from: f64, to: f64) -> Option<Duration> {
    if to >= 100.0 {
        return Some(Duration::ZERO);
    }
    let gained = to - from;
    if !gained.is_finite() || gained <= 0.0 {
        return None;
    }

    let secs = since.as_secs_f64() * (100.0 - to) / gained;
    Some(Duration::from_secs_f64(secs.max(0.0).round()))
}

/// What a single progress query said.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressReading {
    Percent(f64),
    /// The tool answered but reported no operation in progress.
    Idle,
    /// The query itself failed.
    Unreachable,
}

/// Extract a completion percentage from progress-tool output.
pub fn parse_progress(output: &str) -> ProgressReading {
    if !PROGRESS_RE.is_match(output) && !PERCENT_RE.is_match(output) {
        return ProgressReading::Idle;
    }

    if let Some(caps) = PERCENT_RE.captures(output) {
        if let Ok(pct) = caps[1].parse::<f64>() {
            return ProgressReading::Percent(pct.clamp(0.0, 100.0));
        }
    }

    if let Some(caps) = RATIO_RE.captures(output) {
        let num: f64 = caps[1].parse().unwrap_or(0.0);
        let den: f64 = caps[2].parse().unwrap_or(65536.0);
        return ProgressReading::Percent((num / den * 100.0).clamp(0.0, 100.0));
    }

    ProgressReading::Idle
}

pub struct Poller {
    tools: Arc<dyn DiskTools>,
    events: Arc<dyn EventSink>,
    /// One throttle per device so a flapping disk cannot mute the others.
    unreachable_warnings: Mutex<HashMap<PathBuf, LogThrottle>>,
}

impl Poller {
    pub fn new(tools: Arc<dyn DiskTools>, events: Arc<dyn EventSink>) -> Self {
        Self {
            tools,
            events,
            unreachable_warnings: Mutex::new(HashMap::new()),
        }
    }

    /// Query every non-terminal device, then apply all readings. No entry is
    /// updated until every query of the tick has returned.
    pub async fn tick(&self, session: &mut PollSession, now: Instant) {
        let pending: Vec<usize> = session
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.status.is_terminal())
            .map(|(i, _)| i)
            .collect();

        let nodes: Vec<_> = pending
            .iter()
            .map(|&i| session.entries[i].device.path.clone())
            .collect();

        let queries = nodes.into_iter().map(|node| {
            let tools = Arc::clone(&self.tools);
            async move {
                match tools.query_progress(&node).await {
                    Ok(output) => parse_progress(&output),
                    Err(e) => {
                        debug!(node = %node.display(), error = %e, "Progress query failed");
                        ProgressReading::Unreachable
                    }
                }
            }
        });
        let readings = join_all(queries).await;

        for (i, reading) in pending.into_iter().zip(readings) {
            self.apply(&mut session.entries[i], reading, now);
        }

        session.last_refresh = Some(now);
    }

    fn apply(&self, entry: &mut MonitorEntry, reading: ProgressReading, now: Instant) {
        let elapsed = now.saturating_duration_since(entry.started);
        entry.elapsed = elapsed;

        if entry.status == MonitorStatus::Unreachable && reading != ProgressReading::Unreachable {
            debug!(dev = %entry.device.path.display(), "Device answering again");
            self.reset_unreachable_warning(&entry.device.path);
        }

        match reading {
            ProgressReading::Percent(pct) => {
                if entry.last_known.is_some_and(|prev| pct <= prev) {
                    entry.unchanged_ticks += 1;
                } else {
                    entry.unchanged_ticks = 0;
                }
                entry.status = MonitorStatus::Running;
                entry.percent = Some(pct);
                entry.last_known = Some(pct);
                entry.eta = if entry.job_backed {
                    estimate_remaining(elapsed, Some(pct))
                } else {
                    entry.observed_eta(now, pct)
                };
            }
            ProgressReading::Idle => {
                if entry.last_known.is_some_and(|prev| prev >= NEAR_COMPLETE_PERCENT) {
                    entry.finish(MonitorStatus::Complete, now);
                    if !entry.job_backed {
                        self.events.emit(FormatEvent::Complete {
                            device: entry.device.clone(),
                        });
                    }
                } else {
                    if entry.status == MonitorStatus::Unreachable {
                        entry.status = if entry.last_known.is_some() {
                            MonitorStatus::Running
                        } else {
                            MonitorStatus::Waiting
                        };
                    }
                    entry.percent = None;
                    entry.eta = None;
                }
            }
            ProgressReading::Unreachable => {
                entry.status = MonitorStatus::Unreachable;
                entry.eta = None;
                if self.unreachable_warning_due(&entry.device.path) {
                    warn!(dev = %entry.device.path.display(), "Device not answering progress queries");
                }
            }
        }
    }

    fn unreachable_warning_due(&self, node: &Path) -> bool {
        let mut throttles = match self.unreachable_warnings.lock() {
            Ok(t) => t,
            Err(poisoned) => poisoned.into_inner(),
        };
        throttles
            .entry(node.to_path_buf())
            .or_insert_with(|| LogThrottle::new(UNREACHABLE_WARN_INTERVAL))
            .should_log()
    }

    fn reset_unreachable_warning(&self, node: &Path) {
        let throttles = match self.unreachable_warnings.lock() {
            Ok(t) => t,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(throttle) = throttles.get(node) {
            throttle.reset();
        }
    }
}
