//! Real hardware adapter: sysfs, `lsblk`, `sg_format`, `sg_requests` and
//! HDSentinel.

use std::os::unix::fs::FileTypeExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::config::AppConfig;
use crate::core::hardware::{DiskTools, FormatProcess, Inventory, ToolError};
use crate::core::models::{FormatMode, ResolvedDevice, UNKNOWN};

static PAIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([A-Z:-]+)="([^"]*)""#).expect("valid regex"));

#[derive(Debug, Clone)]
pub struct LinuxToolsConfig {
    pub format_tool: PathBuf,
    pub progress_tool: PathBuf,
    pub inventory_tool: PathBuf,
    pub health_tool: PathBuf,
    pub sector_size: u32,
    pub query_timeout: Duration,
    /// Mount point of sysfs. Only changed by tests.
    pub sys_root: PathBuf,
}

impl Default for LinuxToolsConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for LinuxToolsConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            format_tool: config.format_tool.clone(),
            progress_tool: config.progress_tool.clone(),
            inventory_tool: config.inventory_tool.clone(),
            health_tool: config.health_tool.clone(),
            sector_size: config.sector_size,
            query_timeout: Duration::from_secs(config.query_timeout_secs.max(1)),
            sys_root: PathBuf::from("/sys"),
        }
    }
}

pub struct LinuxTools {
    config: LinuxToolsConfig,
}

impl LinuxTools {
    pub fn new(config: LinuxToolsConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(LinuxToolsConfig::default())
    }

    fn device_dir(&self, node: &Path) -> Option<PathBuf> {
        let name = node.file_name()?;
        Some(self.config.sys_root.join("block").join(name).join("device"))
    }

    /// The SCSI generic node behind a block device, e.g. `/dev/sdb` ->
    /// `/dev/sg2`. Falls back to the block node itself.
    pub fn sg_node(&self, node: &Path) -> PathBuf {
        let sg = self
            .device_dir(node)
            .and_then(|dir| std::fs::read_dir(dir.join("scsi_generic")).ok())
            .and_then(|mut entries| entries.next())
            .and_then(|entry| entry.ok())
            .map(|entry| Path::new("/dev").join(entry.file_name()));

        sg.unwrap_or_else(|| node.to_path_buf())
    }

    /// Drop the queue depth to one and shorten the command timeout, which
    /// keeps progress queries answerable while the drive formats.
    fn prepare_for_format(&self, node: &Path) {
        let Some(dir) = self.device_dir(node) else {
            return;
        };

        for (attr, value) in [("queue_depth", "1"), ("timeout", "5")] {
            if let Err(e) = std::fs::write(dir.join(attr), value) {
                debug!(node = %node.display(), attr, error = %e, "Could not tune device");
            }
        }
    }

    fn tool_name(path: &Path) -> String {
        path.display().to_string()
    }
}

#[async_trait]
impl DiskTools for LinuxTools {
    fn resolve_port(&self, port: &Path) -> Option<PathBuf> {
        let node = std::fs::canonicalize(port).ok()?;
        let meta = std::fs::metadata(&node).ok()?;
        meta.file_type().is_block_device().then_some(node)
    }

    fn inventory(&self, node: &Path) -> Result<Inventory, ToolError> {
        let tool = Self::tool_name(&self.config.inventory_tool);
        let output = Command::new(&self.config.inventory_tool)
            .args(["-dn", "-P", "-o", "NAME,SIZE,SERIAL,MODEL"])
            .arg(node)
            .output()
            .map_err(|source| ToolError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ToolError::Status {
                tool,
                status: output.status.to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_lsblk_pairs(&stdout).ok_or(ToolError::Status {
            tool,
            status: "no output".to_string(),
        })
    }

    fn start_format(
        &self,
        device: &ResolvedDevice,
        mode: FormatMode,
    ) -> Result<Box<dyn FormatProcess>, ToolError> {
        self.prepare_for_format(&device.path);

        let mut cmd = Command::new(&self.config.format_tool);
        cmd.arg("--format")
            .arg(format!("--size={}", self.config.sector_size));
        if mode == FormatMode::Fast {
            cmd.arg("--ffmt=1");
        }
        cmd.arg(self.sg_node(&device.path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            // Own process group: a Ctrl+C aimed at the monitor must not
            // reach the format.
            .process_group(0);

        let child = cmd.spawn().map_err(|source| ToolError::Spawn {
            tool: Self::tool_name(&self.config.format_tool),
            source,
        })?;

        debug!(dev = %device.path.display(), pid = child.id(), "Spawned format process");
        Ok(Box::new(ChildProcess(child)))
    }

    async fn query_progress(&self, node: &Path) -> Result<String, ToolError> {
        let tool = Self::tool_name(&self.config.progress_tool);
        let query = tokio::process::Command::new(&self.config.progress_tool)
            .arg("--progress")
            .arg(self.sg_node(node))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.config.query_timeout, query)
            .await
            .map_err(|_| ToolError::Timeout {
                tool: tool.clone(),
                secs: self.config.query_timeout.as_secs(),
            })?
            .map_err(|source| ToolError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        // A drive mid-format often answers with a NOT READY sense and a
        // non-zero exit, but the progress line is still there.
        if output.status.success() || text.to_lowercase().contains("progress") {
            Ok(text)
        } else {
            Err(ToolError::Status {
                tool,
                status: output.status.to_string(),
            })
        }
    }

    fn health_report(&self, nodes: &[PathBuf], dump: bool) -> Result<(), ToolError> {
        let tool = Self::tool_name(&self.config.health_tool);
        let list = nodes
            .iter()
            .map(|n| n.display().to_string())
            .collect::<Vec<_>>()
            .join(",");

        let mut cmd = Command::new(&self.config.health_tool);
        cmd.arg("-onlydevs").arg(list);
        if dump {
            cmd.arg("-dump");
        }

        let status = cmd.status().map_err(|source| ToolError::Spawn {
            tool: tool.clone(),
            source,
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(ToolError::Status {
                tool,
                status: status.to_string(),
            })
        }
    }
}

struct ChildProcess(Child);

impl FormatProcess for ChildProcess {
    fn try_wait(&mut self) -> std::io::Result<Option<bool>> {
        Ok(self.0.try_wait()?.map(|status| status.success()))
    }
}

/// Parse one device from `lsblk -P` output (`KEY="value"` pairs).
pub fn parse_lsblk_pairs(output: &str) -> Option<Inventory> {
    let line = output.lines().find(|l| !l.trim().is_empty())?;

    let mut size = String::new();
    let mut model = String::new();
    let mut serial = String::new();
    for caps in PAIR_RE.captures_iter(line) {
        let value = caps[2].trim().to_string();
        match &caps[1] {
            "SIZE" => size = value,
            "MODEL" => model = value,
            "SERIAL" => serial = value,
            _ => {}
        }
    }

    let or_unknown = |s: String| if s.is_empty() { UNKNOWN.to_string() } else { s };
    Some(Inventory {
        size,
        model: or_unknown(model),
        serial: or_unknown(serial),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lsblk_pairs() {
        let out = r#"NAME="sdb" SIZE="3.6T" SERIAL="ZC1234AB" MODEL="ST4000NM0035-1V4107""#;
        let inv = parse_lsblk_pairs(out).unwrap();
        assert_eq!(inv.size, "3.6T");
        assert_eq!(inv.serial, "ZC1234AB");
        assert_eq!(inv.model, "ST4000NM0035-1V4107");
    }

    #[test]
    fn blank_identity_becomes_unknown() {
        let out = "NAME=\"sdc\" SIZE=\"1.8T\" SERIAL=\"\" MODEL=\"HUS726020AL  \"\n";
        let inv = parse_lsblk_pairs(out).unwrap();
        assert_eq!(inv.serial, UNKNOWN);
        assert_eq!(inv.model, "HUS726020AL");
        assert!(parse_lsblk_pairs("").is_none());
    }

    #[test]
    fn sg_node_reads_scsi_generic_link() {
        let sys = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(sys.path().join("block/sdb/device/scsi_generic/sg3")).unwrap();

        let tools = LinuxTools::new(LinuxToolsConfig {
            sys_root: sys.path().to_path_buf(),
            ..LinuxToolsConfig::default()
        });

        assert_eq!(tools.sg_node(Path::new("/dev/sdb")), PathBuf::from("/dev/sg3"));
        assert_eq!(tools.sg_node(Path::new("/dev/sdc")), PathBuf::from("/dev/sdc"));
    }
}
