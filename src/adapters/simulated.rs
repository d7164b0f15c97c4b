use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::core::hardware::{DiskTools, FormatProcess, Inventory, ToolError};
use crate::core::models::{FormatMode, ResolvedDevice};

const TOOL: &str = "simulator";

enum ScriptedReply {
    Output(String),
    Error,
}

struct SimFormat {
    started: Instant,
    mode: FormatMode,
    exit: Option<bool>,
}

struct SimDisk {
    inventory: Option<Inventory>,
    spawn_error: Option<String>,
    replies: VecDeque<ScriptedReply>,
    format: Option<SimFormat>,
    formats_started: usize,
}

#[derive(Default)]
struct SimState {
    ports: HashMap<String, PathBuf>,
    disks: HashMap<PathBuf, SimDisk>,
    /// When set, formats progress on their own and finish after this long.
    auto_duration: Option<Duration>,
}

impl SimState {
    /// Advance an auto-running format. Returns its percent if still going.
    fn advance(&mut self, node: &Path) -> Option<f64> {
        let duration = self.auto_duration?;
        let disk = self.disks.get_mut(node)?;
        let format = disk.format.as_mut()?;
        if format.exit.is_some() {
            return None;
        }

        // Fast formats only rewrite metadata.
        let duration = match format.mode {
            FormatMode::Full => duration,
            FormatMode::Fast => duration / 4,
        };

        let pct = format.started.elapsed().as_secs_f64() / duration.as_secs_f64() * 100.0;
        if pct >= 100.0 {
            format.exit = Some(true);
            None
        } else {
            Some(pct)
        }
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Controller for injecting hardware behaviour into [`SimulatedTools`].
#[derive(Clone)]
pub struct Simulator {
    state: Arc<Mutex<SimState>>,
}

impl Simulator {
    /// Put a disk behind `port`.
    pub fn add_disk(&self, port: &str, node: &str, model: &str, serial: &str) {
        let mut state = lock(&self.state);
        let node = PathBuf::from(node);
        state.ports.insert(port.to_string(), node.clone());
        state.disks.insert(
            node,
            SimDisk {
                inventory: Some(Inventory {
                    size: "3.6T".to_string(),
                    model: model.to_string(),
                    serial: serial.to_string(),
                }),
                spawn_error: None,
                replies: VecDeque::new(),
                format: None,
                formats_started: 0,
            },
        );
    }

    /// Pull the disk out of its bay; its port link goes stale.
    pub fn remove_disk(&self, port: &str) {
        let mut state = lock(&self.state);
        if let Some(node) = state.ports.remove(port) {
            state.disks.remove(&node);
        }
    }

    pub fn fail_inventory(&self, node: &str) {
        if let Some(disk) = lock(&self.state).disks.get_mut(Path::new(node)) {
            disk.inventory = None;
        }
    }

    /// Make the next format on `node` fail to start.
    pub fn fail_spawn(&self, node: &str, reason: &str) {
        if let Some(disk) = lock(&self.state).disks.get_mut(Path::new(node)) {
            disk.spawn_error = Some(reason.to_string());
        }
    }

    /// Queue raw progress-tool output for the next query on `node`.
    pub fn push_progress(&self, node: &str, output: &str) {
        if let Some(disk) = lock(&self.state).disks.get_mut(Path::new(node)) {
            disk.replies.push_back(ScriptedReply::Output(output.to_string()));
        }
    }

    /// Make the next progress query on `node` fail outright.
    pub fn push_query_error(&self, node: &str) {
        if let Some(disk) = lock(&self.state).disks.get_mut(Path::new(node)) {
            disk.replies.push_back(ScriptedReply::Error);
        }
    }

    /// End the running format on `node` with the given exit result.
    pub fn finish(&self, node: &str, success: bool) {
        if let Some(format) = lock(&self.state)
            .disks
            .get_mut(Path::new(node))
            .and_then(|d| d.format.as_mut())
        {
            format.exit = Some(success);
        }
    }

    /// True while a format process on `node` has been started and not exited.
    pub fn is_formatting(&self, node: &str) -> bool {
        lock(&self.state)
            .disks
            .get(Path::new(node))
            .and_then(|d| d.format.as_ref())
            .is_some_and(|f| f.exit.is_none())
    }

    pub fn formats_started(&self, node: &str) -> usize {
        lock(&self.state)
            .disks
            .get(Path::new(node))
            .map_or(0, |d| d.formats_started)
    }
}

/// In-process stand-in for the disk tools.
pub struct SimulatedTools {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedTools {
    /// A scripted simulator: nothing happens unless the controller says so.
    pub fn new() -> (Self, Simulator) {
        let state = Arc::new(Mutex::new(SimState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            Simulator { state },
        )
    }

    /// A self-running fleet with one disk behind each port. Full formats take
    /// `duration`, fast ones a quarter of it.
    pub fn demo(ports: &[String], duration: Duration) -> (Self, Simulator) {
        let (tools, sim) = Self::new();
        lock(&tools.state).auto_duration = Some(duration);

        for (i, port) in ports.iter().enumerate() {
            let node = format!("/dev/sd{}", (b'b' + (i % 24) as u8) as char);
            sim.add_disk(port, &node, "SIM-4000NM", &format!("SIM{:05}", i + 1));
        }

        (tools, sim)
    }
}

#[async_trait]
impl DiskTools for SimulatedTools {
    fn resolve_port(&self, port: &Path) -> Option<PathBuf> {
        let state = lock(&self.state);
        let port = port.to_str()?;
        state.ports.get(port).cloned()
    }

    fn inventory(&self, node: &Path) -> Result<Inventory, ToolError> {
        lock(&self.state)
            .disks
            .get(node)
            .and_then(|d| d.inventory.clone())
            .ok_or_else(|| ToolError::Status {
                tool: TOOL.to_string(),
                status: "exit status: 32".to_string(),
            })
    }

    fn start_format(
        &self,
        device: &ResolvedDevice,
        mode: FormatMode,
    ) -> Result<Box<dyn FormatProcess>, ToolError> {
        let mut state = lock(&self.state);
        let disk = state.disks.get_mut(&device.path).ok_or_else(|| ToolError::Spawn {
            tool: TOOL.to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;

        if let Some(reason) = disk.spawn_error.take() {
            return Err(ToolError::Spawn {
                tool: TOOL.to_string(),
                source: std::io::Error::other(reason),
            });
        }

        disk.formats_started += 1;
        disk.format = Some(SimFormat {
            started: Instant::now(),
            mode,
            exit: None,
        });

        Ok(Box::new(SimProcess {
            node: device.path.clone(),
            state: Arc::clone(&self.state),
        }))
    }

    async fn query_progress(&self, node: &Path) -> Result<String, ToolError> {
        let mut state = lock(&self.state);
        let unreachable = || ToolError::Status {
            tool: TOOL.to_string(),
            status: "exit status: 2".to_string(),
        };

        let disk = state.disks.get_mut(node).ok_or_else(unreachable)?;
        match disk.replies.pop_front() {
            Some(ScriptedReply::Output(text)) => return Ok(text),
            Some(ScriptedReply::Error) => return Err(unreachable()),
            None => {}
        }

        Ok(state
            .advance(node)
            .map(|pct| format!("Progress indication: {:.2}% done\n", pct))
            .unwrap_or_default())
    }

    fn health_report(&self, nodes: &[PathBuf], _dump: bool) -> Result<(), ToolError> {
        for node in nodes {
            println!("(Simulator) {}  health 100%  performance 100%", node.display());
        }
        Ok(())
    }
}

struct SimProcess {
    node: PathBuf,
    state: Arc<Mutex<SimState>>,
}

impl FormatProcess for SimProcess {
    fn try_wait(&mut self) -> std::io::Result<Option<bool>> {
        let mut state = lock(&self.state);
        state.advance(&self.node);
        Ok(state
            .disks
            .get(&self.node)
            .and_then(|d| d.format.as_ref())
            .and_then(|f| f.exit))
    }
}
