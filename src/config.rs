use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::progress::DEFAULT_INTERVAL_SECS;
use crate::core::{SlotIndex, SlotIndexError};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/diskops/config.toml";
pub const ENV_PREFIX: &str = "DISKOPS_";
pub const DEFAULT_EVENT_LOG: &str = "/var/log/diskops.log";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid enclosure layout: {0}")]
    Layout(#[from] SlotIndexError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Stable `/dev/disk/by-path` links, one per expander port.
    pub ports: Vec<String>,
    /// Bay number for each entry of `ports`, same order.
    pub slots: Vec<u32>,
    /// Operations log. Unset means the default path on real hardware and
    /// no file at all in simulation.
    pub event_log: Option<PathBuf>,
    pub trace_log: Option<PathBuf>,
    pub poll_interval_secs: u64,
    pub query_timeout_secs: u64,
    pub sector_size: u32,
    pub format_tool: PathBuf,
    pub progress_tool: PathBuf,
    pub inventory_tool: PathBuf,
    pub health_tool: PathBuf,
    pub simulation: bool,
    pub verbose: bool,
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ports: Vec::new(),
            slots: Vec::new(),
            event_log: None,
            trace_log: None,
            poll_interval_secs: DEFAULT_INTERVAL_SECS,
            query_timeout_secs: 1,
            sector_size: 512,
            format_tool: PathBuf::from("sg_format"),
            progress_tool: PathBuf::from("sg_requests"),
            inventory_tool: PathBuf::from("lsblk"),
            health_tool: PathBuf::from("/root/HDSentinel"),
            simulation: false,
            verbose: false,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Layer defaults, the TOML file, `DISKOPS_*` variables and command-line
    /// overrides, in that order. A missing file is the same as an empty one.
    pub fn load<T: Serialize>(file: &Path, overrides: Option<&T>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        figment.extract().map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Where format events are appended, if anywhere.
    pub fn event_log_path(&self) -> Option<PathBuf> {
        match &self.event_log {
            Some(path) => Some(path.clone()),
            None if self.simulation => None,
            None => Some(PathBuf::from(DEFAULT_EVENT_LOG)),
        }
    }

    /// Validate the port/slot lists and build the lookup used by discovery.
    pub fn slot_index(&self) -> Result<SlotIndex, ConfigError> {
        Ok(SlotIndex::new(&self.ports, &self.slots)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Overrides {
        #[serde(skip_serializing_if = "Option::is_none")]
        poll_interval_secs: Option<u64>,
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load::<Overrides>(&dir.path().join("none.toml"), None).unwrap();
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.sector_size, 512);
        assert_eq!(config.query_timeout_secs, 1);
        assert!(config.ports.is_empty());
    }

    #[test]
    fn file_values_and_overrides_are_layered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
ports = ["/dev/disk/by-path/a", "/dev/disk/by-path/b"]
slots = [2, 5]
poll_interval_secs = 10
event_log = "/tmp/ops.log"
"#,
        )
        .unwrap();

        let overrides = Overrides {
            poll_interval_secs: Some(3),
        };
        let config = AppConfig::load(&path, Some(&overrides)).unwrap();

        assert_eq!(config.ports.len(), 2);
        assert_eq!(config.slots, vec![2, 5]);
        assert_eq!(config.event_log_path(), Some(PathBuf::from("/tmp/ops.log")));
        assert_eq!(config.poll_interval_secs, 3);
        assert!(config.slot_index().is_ok());
    }

    #[test]
    fn event_log_follows_mode_unless_configured() {
        let real = AppConfig::default();
        assert_eq!(real.event_log_path(), Some(PathBuf::from(DEFAULT_EVENT_LOG)));

        let sim = AppConfig {
            simulation: true,
            ..AppConfig::default()
        };
        assert_eq!(sim.event_log_path(), None);

        let sim_with_log = AppConfig {
            simulation: true,
            event_log: Some(PathBuf::from("/tmp/demo.log")),
            ..AppConfig::default()
        };
        assert_eq!(sim_with_log.event_log_path(), Some(PathBuf::from("/tmp/demo.log")));
    }

    #[test]
    fn mismatched_layout_is_fatal() {
        let config = AppConfig {
            ports: vec!["a".to_string(), "b".to_string()],
            slots: vec![1],
            ..AppConfig::default()
        };
        assert!(matches!(
            config.slot_index(),
            Err(ConfigError::Layout(SlotIndexError::LengthMismatch { ports: 2, slots: 1 }))
        ));
    }
}
