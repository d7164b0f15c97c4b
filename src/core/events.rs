//! Format lifecycle events and the sinks that record them.
//!
//! Every job-state transition produces one [`FormatEvent`]. The file sink
//! renders it as a single `EVENT_NAME key=value ...` line and appends it to
//! the operations log; the tracing log gets a copy as well.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{info, warn};

use super::models::{FormatMode, ResolvedDevice};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatEvent {
    Started {
        mode: FormatMode,
        device: ResolvedDevice,
    },
    Complete {
        device: ResolvedDevice,
    },
    Failed {
        device: ResolvedDevice,
        reason: Option<String>,
    },
    /// Monitoring stopped (or the operator declined) while these devices
    /// were still formatting or about to be formatted.
    Aborted {
        devices: Vec<PathBuf>,
    },
}

impl FormatEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "FORMAT_STARTED",
            Self::Complete { .. } => "FORMAT_COMPLETE",
            Self::Failed { .. } => "FORMAT_FAILED",
            Self::Aborted { .. } => "FORMAT_ABORTED",
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Started { mode, device } => {
                let mut fields = vec![("mode", mode.to_string())];
                fields.extend(device_fields(device));
                fields
            }
            Self::Complete { device } => device_fields(device),
            Self::Failed { device, reason } => {
                let mut fields = device_fields(device);
                if let Some(reason) = reason {
                    fields.push(("error", reason.clone()));
                }
                fields
            }
            Self::Aborted { devices } => {
                let list = devices
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                vec![("devices", list)]
            }
        }
    }
}

fn device_fields(device: &ResolvedDevice) -> Vec<(&'static str, String)> {
    vec![
        ("slot", device.slot_label()),
        ("dev", device.path.display().to_string()),
        ("model", device.model.clone()),
        ("serial", device.serial.clone()),
    ]
}

fn quote(value: &str) -> String {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '"') {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

impl fmt::Display for FormatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        for (key, value) in self.fields() {
            write!(f, " {}={}", key, quote(&value))?;
        }
        Ok(())
    }
}

/// Destination for format events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: FormatEvent);
}

/// Append-only operations log on disk.
pub struct EventLog {
    path: PathBuf,
    file: Option<Mutex<File>>,
}

impl EventLog {
    /// Open (or create) the log for appending. An unwritable log is not an
    /// error: events are then only traced.
    pub fn open(path: &Path) -> Self {
        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(Mutex::new(file)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Event log unavailable, events will only be traced");
                None
            }
        };

        Self {
            path: path.to_path_buf(),
            file,
        }
    }

    pub fn is_writable(&self) -> bool {
        self.file.is_some()
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: FormatEvent) {
        let line = event.to_string();
        info!(event = event.name(), "{}", line);

        let Some(file) = &self.file else {
            return;
        };

        let stamped = format!("{} ts={}\n", line, chrono::Local::now().to_rfc3339());
        let result = match file.lock() {
            Ok(mut f) => f.write_all(stamped.as_bytes()),
            Err(poisoned) => poisoned.into_inner().write_all(stamped.as_bytes()),
        };

        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "Failed to append to event log");
        }
    }
}

/// In-memory sink, used by tests and simulation runs.
#[derive(Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<FormatEvent>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<FormatEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.events().iter().map(ToString::to_string).collect()
    }
}

impl EventSink for MemoryEventLog {
    fn emit(&self, event: FormatEvent) {
        info!(event = event.name(), "{}", event);
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
