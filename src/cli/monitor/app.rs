//! Monitor state and the actions that drive it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::core::progress::INTERVAL_STEP_SECS;
use crate::core::{
    DiskTools, EventSink, FormatLauncher, JobState, JobOutcome, MonitorEntry, MonitorStatus,
    PollSession, Poller, ResolvedDevice,
};

/// Actions that can be triggered by user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Refresh,
    TogglePause,
    SlowerPolling,
    FasterPolling,
}

/// Message shown under the device rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub ok: bool,
}

pub struct MonitorApp {
    pub session: PollSession,
    poller: Poller,
    launcher: Option<FormatLauncher>,
    pub running: bool,
    pub notice: Option<Notice>,
    /// Devices still formatting when the operator quit.
    pub abandoned: Vec<PathBuf>,
}

impl MonitorApp {
    /// Watch devices that are (or may be) formatting under some other
    /// invocation.
    pub fn standalone(
        devices: Vec<ResolvedDevice>,
        tools: Arc<dyn DiskTools>,
        events: Arc<dyn EventSink>,
        interval_secs: u64,
    ) -> Self {
        let now = Instant::now();
        let entries = devices
            .into_iter()
            .map(|d| MonitorEntry::new(d, now))
            .collect();

        Self {
            session: PollSession::new(entries, interval_secs),
            poller: Poller::new(tools, events),
            launcher: None,
            running: true,
            notice: None,
            abandoned: Vec::new(),
        }
    }

    /// Watch the jobs of a launched batch. Jobs that never started show up
    /// as failed right away.
    pub fn chained(
        launcher: FormatLauncher,
        tools: Arc<dyn DiskTools>,
        events: Arc<dyn EventSink>,
        interval_secs: u64,
    ) -> Self {
        let entries = launcher
            .jobs()
            .iter()
            .map(|job| MonitorEntry::new(job.device.clone(), job.started).job_backed())
            .collect();
        let mut session = PollSession::new(entries, interval_secs);

        let now = Instant::now();
        for job in launcher.jobs().iter().filter(|j| j.state == JobState::Failed) {
            session.apply_job_outcome(
                &JobOutcome {
                    device: job.device.path.clone(),
                    state: JobState::Failed,
                },
                now,
            );
        }

        Self {
            session,
            poller: Poller::new(tools, events),
            launcher: Some(launcher),
            running: true,
            notice: None,
            abandoned: Vec::new(),
        }
    }

    pub async fn poll(&mut self) {
        self.poller.tick(&mut self.session, Instant::now()).await;
        debug!(devices = self.session.entries.len(), "Poll tick");
    }

    /// Fold newly finished format jobs into the session. Returns true if any
    /// job finished.
    pub fn check_jobs(&mut self) -> bool {
        let Some(launcher) = self.launcher.as_mut() else {
            return false;
        };

        let outcomes = launcher.check();
        let now = Instant::now();
        for outcome in &outcomes {
            self.session.apply_job_outcome(outcome, now);
        }
        !outcomes.is_empty()
    }

    pub async fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.quit(),
            Action::Refresh => {
                // Paused sessions redraw but never query.
                if !self.session.paused {
                    self.poll().await;
                }
            }
            Action::TogglePause => self.session.toggle_pause(),
            Action::SlowerPolling => self.session.adjust_interval(INTERVAL_STEP_SECS),
            Action::FasterPolling => self.session.adjust_interval(-INTERVAL_STEP_SECS),
        }
    }

    /// Stop monitoring. Running formats are recorded as abandoned but keep
    /// going.
    pub fn quit(&mut self) {
        self.running = false;
        // Jobs that exited since the last frame tick get their own events.
        self.check_jobs();
        if let Some(launcher) = self.launcher.as_mut() {
            self.abandoned = launcher.abandon();
        }
    }

    /// Every device settled, no job still running, and not paused.
    pub fn finished(&self) -> bool {
        let jobs_running = self.launcher.as_ref().is_some_and(|l| l.has_running());
        self.session.all_terminal() && !jobs_running && !self.session.paused
    }

    /// Called once when [`MonitorApp::finished`] first holds.
    pub fn complete(&mut self) {
        self.running = false;

        let failed = self.session.count(MonitorStatus::Failed);
        let done = self.session.count(MonitorStatus::Complete);
        info!(done, failed, "All devices settled");

        self.notice = Some(if failed == 0 {
            Notice {
                text: "All formatting complete.".to_string(),
                ok: true,
            }
        } else {
            Notice {
                text: format!("Finished: {} done, {} failed.", done, failed),
                ok: false,
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SimulatedTools;
    use crate::core::MemoryEventLog;

    fn device(node: &str) -> ResolvedDevice {
        ResolvedDevice {
            slot: Some(0),
            path: PathBuf::from(node),
            port: None,
            model: "M".to_string(),
            serial: "S".to_string(),
            size: String::new(),
        }
    }

    #[tokio::test]
    async fn pause_blocks_polling_but_not_keys() {
        let (tools, sim) = SimulatedTools::new();
        sim.add_disk("port-a", "/dev/sdb", "M", "S");
        sim.push_progress("/dev/sdb", "Progress indication: 10.00% done");
        sim.push_progress("/dev/sdb", "Progress indication: 20.00% done");

        let mut app = MonitorApp::standalone(
            vec![device("/dev/sdb")],
            Arc::new(tools),
            Arc::new(MemoryEventLog::new()),
            5,
        );

        app.poll().await;
        assert_eq!(app.session.entries[0].percent, Some(10.0));

        app.handle_action(Action::TogglePause).await;
        assert!(app.session.paused);
        app.handle_action(Action::Refresh).await;
        assert_eq!(app.session.entries[0].percent, Some(10.0));

        app.handle_action(Action::SlowerPolling).await;
        assert_eq!(app.session.interval().as_secs(), 6);

        app.handle_action(Action::TogglePause).await;
        app.handle_action(Action::Refresh).await;
        assert_eq!(app.session.entries[0].percent, Some(20.0));

        app.handle_action(Action::Quit).await;
        assert!(!app.running);
        assert!(app.abandoned.is_empty());
    }

    #[tokio::test]
    async fn paused_session_does_not_finish() {
        let (tools, sim) = SimulatedTools::new();
        sim.add_disk("port-a", "/dev/sdb", "M", "S");
        sim.push_progress("/dev/sdb", "Progress indication: 95.00% done");
        sim.push_progress("/dev/sdb", "");

        let mut app = MonitorApp::standalone(
            vec![device("/dev/sdb")],
            Arc::new(tools),
            Arc::new(MemoryEventLog::new()),
            5,
        );
        app.poll().await;
        app.poll().await;
        assert!(app.session.all_terminal());

        app.handle_action(Action::TogglePause).await;
        assert!(!app.finished());
        app.handle_action(Action::TogglePause).await;
        assert!(app.finished());

        app.complete();
        assert!(!app.running);
        assert_eq!(app.notice.as_ref().map(|n| n.ok), Some(true));
    }
}
