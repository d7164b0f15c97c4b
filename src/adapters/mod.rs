use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::DiskTools;

mod linux;
mod simulated;

pub use linux::{LinuxTools, LinuxToolsConfig, parse_lsblk_pairs};
pub use simulated::{SimulatedTools, Simulator};

/// How long a full format takes in a `--simulation` run.
const DEMO_FORMAT_DURATION: Duration = Duration::from_secs(120);

pub fn get_tools(config: &AppConfig) -> Arc<dyn DiskTools> {
    if config.simulation {
        let (tools, _controller) = SimulatedTools::demo(&config.ports, DEMO_FORMAT_DURATION);
        return Arc::new(tools);
    }

    Arc::new(LinuxTools::new(LinuxToolsConfig::from(config)))
}

/// Fill in a small fake enclosure when simulating without a configured one.
pub fn demo_layout(config: &mut AppConfig) {
    if !config.simulation || !config.ports.is_empty() {
        return;
    }

    config.ports = (0..4)
        .map(|phy| format!("/dev/disk/by-path/pci-0000:00:00.0-sas-exp0x5000000000000000-phy{phy}-lun-0"))
        .collect();
    config.slots = (0..4).collect();
}
