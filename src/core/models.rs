use std::fmt;
use std::path::PathBuf;

/// Placeholder for identity fields the inventory query could not supply.
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDevice {
    /// Physical bay number. `None` for devices named on the command line
    /// that are not behind a configured port.
    pub slot: Option<u32>,
    pub path: PathBuf,
    pub port: Option<String>,
    pub model: String,
    pub serial: String,
    pub size: String,
}

impl ResolvedDevice {
    pub fn slot_label(&self) -> String {
        match self.slot {
            Some(slot) => slot.to_string(),
            None => "?".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatMode {
    Full,
    Fast,
}

impl FormatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Fast => "fast",
        }
    }
}

impl fmt::Display for FormatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single format process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Complete,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// What the monitor currently knows about one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    Waiting,
    Running,
    Complete,
    Failed,
    /// The last progress query errored. Retried on the next tick.
    Unreachable,
}

impl MonitorStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Running => "formatting",
            Self::Complete => "done",
            Self::Failed => "FAILED",
            Self::Unreachable => "unreachable",
        }
    }
}
