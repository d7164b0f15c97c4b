//! Parallel format job launcher.
//!
//! Each selected device gets its own `sg_format` process. Launching never
//! waits on a process; the control loop calls [`FormatLauncher::check`] to
//! collect exits.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::events::{EventSink, FormatEvent};
use super::hardware::{DiskTools, FormatProcess};
use super::models::{FormatMode, JobState, ResolvedDevice};

pub struct FormatJob {
    pub device: ResolvedDevice,
    pub mode: FormatMode,
    pub state: JobState,
    pub started: Instant,
    process: Option<Box<dyn FormatProcess>>,
}

impl FormatJob {
    fn new(device: ResolvedDevice, mode: FormatMode) -> Self {
        Self {
            device,
            mode,
            state: JobState::Pending,
            started: Instant::now(),
            process: None,
        }
    }
}

/// A job that reached a terminal state during a [`FormatLauncher::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub device: PathBuf,
    pub state: JobState,
}

pub struct FormatLauncher {
    tools: Arc<dyn DiskTools>,
    events: Arc<dyn EventSink>,
    jobs: Vec<FormatJob>,
}

impl FormatLauncher {
    pub fn new(tools: Arc<dyn DiskTools>, events: Arc<dyn EventSink>) -> Self {
        Self {
            tools,
            events,
            jobs: Vec::new(),
        }
    }

    /// Start one format per device. A device whose process cannot be spawned
    /// fails on its own; the rest of the batch still launches.
    pub fn launch(&mut self, devices: &[ResolvedDevice], mode: FormatMode) {
        for device in devices {
            let mut job = FormatJob::new(device.clone(), mode);

            match self.tools.start_format(device, mode) {
                Ok(process) => {
                    job.process = Some(process);
                    job.state = JobState::Running;
                    job.started = Instant::now();
                    info!(dev = %device.path.display(), %mode, "Format started");
                    self.events.emit(FormatEvent::Started {
                        mode,
                        device: device.clone(),
                    });
                }
                Err(e) => {
                    job.state = JobState::Failed;
                    warn!(dev = %device.path.display(), error = %e, "Format failed to start");
                    self.events.emit(FormatEvent::Failed {
                        device: device.clone(),
                        reason: Some(e.to_string()),
                    });
                }
            }

            self.jobs.push(job);
        }
    }

    /// Non-blocking sweep over running jobs. Returns the jobs that finished
    /// since the previous call.
    pub fn check(&mut self) -> Vec<JobOutcome> {
        let mut finished = Vec::new();

        for job in self.jobs.iter_mut().filter(|j| j.state == JobState::Running) {
            let Some(process) = job.process.as_mut() else {
                continue;
            };

            let next = match process.try_wait() {
                Ok(None) => continue,
                Ok(Some(true)) => JobState::Complete,
                Ok(Some(false)) => JobState::Failed,
                Err(e) => {
                    warn!(dev = %job.device.path.display(), error = %e, "Lost track of format process");
                    JobState::Failed
                }
            };

            job.state = next;
            job.process = None;

            let elapsed = job.started.elapsed().as_secs();
            let event = if next == JobState::Complete {
                info!(dev = %job.device.path.display(), elapsed_secs = elapsed, "Format complete");
                FormatEvent::Complete {
                    device: job.device.clone(),
                }
            } else {
                warn!(dev = %job.device.path.display(), elapsed_secs = elapsed, "Format failed");
                FormatEvent::Failed {
                    device: job.device.clone(),
                    reason: None,
                }
            };
            self.events.emit(event);

            finished.push(JobOutcome {
                device: job.device.path.clone(),
                state: next,
            });
        }

        finished
    }

    pub fn jobs(&self) -> &[FormatJob] {
        &self.jobs
    }

    pub fn running(&self) -> Vec<&ResolvedDevice> {
        self.jobs
            .iter()
            .filter(|j| j.state == JobState::Running)
            .map(|j| &j.device)
            .collect()
    }

    pub fn has_running(&self) -> bool {
        self.jobs.iter().any(|j| j.state == JobState::Running)
    }

    /// Record that monitoring stopped with formats still in flight.
    ///
    /// The processes themselves are left alone and keep formatting.
    /// Returns the devices that were still running.
    pub fn abandon(&mut self) -> Vec<PathBuf> {
        let devices: Vec<PathBuf> = self.running().iter().map(|d| d.path.clone()).collect();
        if devices.is_empty() {
            return devices;
        }

        warn!(count = devices.len(), "Monitoring stopped with formats still running");
        self.events.emit(FormatEvent::Aborted {
            devices: devices.clone(),
        });

        // Dropping the handles does not signal the children.
        for job in self.jobs.iter_mut().filter(|j| j.state == JobState::Running) {
            job.process = None;
        }

        devices
    }
}
