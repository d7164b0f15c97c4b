pub mod discovery;
pub mod events;
pub mod hardware;
pub mod launcher;
pub mod models;
pub mod progress;

pub use discovery::{PathResolver, SlotIndex, SlotIndexError};
pub use events::{EventLog, EventSink, FormatEvent, MemoryEventLog};
pub use hardware::{DiskTools, FormatProcess, Inventory, ToolError};
pub use launcher::{FormatJob, FormatLauncher, JobOutcome};
pub use models::{FormatMode, JobState, MonitorStatus, ResolvedDevice, UNKNOWN};
pub use progress::{MonitorEntry, PollSession, Poller};
