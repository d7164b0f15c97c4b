use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use super::models::{FormatMode, ResolvedDevice};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} did not answer within {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("{tool} exited with {status}")]
    Status { tool: String, status: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Identity metadata reported by the block-device inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    pub size: String,
    pub model: String,
    pub serial: String,
}

/// Handle on a spawned format process.
///
/// There is deliberately no way to kill the process through this handle:
/// dropping it leaves the format running.
pub trait FormatProcess: Send {
    /// Non-blocking exit check. `Some(true)` means the tool reported success.
    fn try_wait(&mut self) -> std::io::Result<Option<bool>>;
}

/// Every external tool the fleet manager talks to.
#[async_trait]
pub trait DiskTools: Send + Sync {
    /// Follow a stable port path to its current block-device node.
    /// Returns `None` for an empty bay or a stale link.
    fn resolve_port(&self, port: &Path) -> Option<PathBuf>;

    /// Look up size, model and serial for a device node.
    fn inventory(&self, node: &Path) -> Result<Inventory, ToolError>;

    /// Start a low-level format and return immediately.
    fn start_format(
        &self,
        device: &ResolvedDevice,
        mode: FormatMode,
    ) -> Result<Box<dyn FormatProcess>, ToolError>;

    /// Point-in-time progress query. Returns the tool's raw text output.
    /// Implementations must bound the call with a short timeout.
    async fn query_progress(&self, node: &Path) -> Result<String, ToolError>;

    /// Run the health report for the given nodes with output going straight
    /// to the terminal.
    fn health_report(&self, nodes: &[PathBuf], dump: bool) -> Result<(), ToolError>;
}
