//! Port-to-device discovery.
//!
//! The enclosure is described by two parallel lists: stable `by-path` port
//! links and the bay number printed on the chassis for each. Discovery walks
//! the ports in configured order, follows each link to whatever node the
//! kernel assigned this boot, and tags the node with its bay.

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};

use super::hardware::DiskTools;
use super::models::{ResolvedDevice, UNKNOWN};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlotIndexError {
    #[error("{ports} ports configured but {slots} slots; the lists must be the same length")]
    LengthMismatch { ports: usize, slots: usize },
}

/// Immutable mapping from port path to bay number, in configured order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotIndex {
    entries: Vec<(String, u32)>,
}

impl SlotIndex {
    pub fn new(ports: &[String], slots: &[u32]) -> Result<Self, SlotIndexError> {
        if ports.len() != slots.len() {
            return Err(SlotIndexError::LengthMismatch {
                ports: ports.len(),
                slots: slots.len(),
            });
        }

        let entries = ports.iter().cloned().zip(slots.iter().copied()).collect();
        Ok(Self { entries })
    }

    pub fn slot_for(&self, port: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(p, _)| p == port)
            .map(|(_, slot)| *slot)
    }

    pub fn ports(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(p, _)| p.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct PathResolver<'a> {
    index: &'a SlotIndex,
    tools: &'a dyn DiskTools,
}

impl<'a> PathResolver<'a> {
    pub fn new(index: &'a SlotIndex, tools: &'a dyn DiskTools) -> Self {
        Self { index, tools }
    }

    /// Resolve every populated bay. Empty bays are skipped without a trace
    /// in the result; two ports landing on the same node keep the first.
    pub fn resolve(&self) -> Vec<ResolvedDevice> {
        let mut seen = HashSet::new();
        let mut devices = Vec::new();

        for port in self.index.ports() {
            let Some(node) = self.tools.resolve_port(Path::new(port)) else {
                debug!(port, "Bay empty");
                continue;
            };

            if !seen.insert(node.clone()) {
                debug!(port, node = %node.display(), "Node already resolved through another port");
                continue;
            }

            let slot = self.index.slot_for(port);
            devices.push(describe(self.tools, &node, slot, Some(port.to_string())));
        }

        devices
    }
}

/// Build a device record for `node`, falling back to the unknown sentinel
/// when inventory fails.
pub fn describe(
    tools: &dyn DiskTools,
    node: &Path,
    slot: Option<u32>,
    port: Option<String>,
) -> ResolvedDevice {
    let (size, model, serial) = match tools.inventory(node) {
        Ok(inv) => (inv.size, inv.model, inv.serial),
        Err(e) => {
            warn!(node = %node.display(), error = %e, "Inventory query failed");
            (String::new(), UNKNOWN.to_string(), UNKNOWN.to_string())
        }
    };

    ResolvedDevice {
        slot,
        path: node.to_path_buf(),
        port,
        model,
        serial,
        size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("pci-0000:01:00.0-sas-phy{}-lun-0", i)).collect()
    }

    #[test]
    fn mismatched_lists_are_rejected() {
        let err = SlotIndex::new(&ports(3), &[1, 2]).unwrap_err();
        assert_eq!(err, SlotIndexError::LengthMismatch { ports: 3, slots: 2 });
    }

    #[test]
    fn slot_lookup_follows_configured_index() {
        let p = ports(3);
        let index = SlotIndex::new(&p, &[8, 2, 5]).unwrap();
        assert_eq!(index.slot_for(&p[0]), Some(8));
        assert_eq!(index.slot_for(&p[1]), Some(2));
        assert_eq!(index.slot_for(&p[2]), Some(5));
        assert_eq!(index.slot_for("not-a-port"), None);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn empty_configuration_is_valid() {
        let index = SlotIndex::new(&[], &[]).unwrap();
        assert!(index.is_empty());
    }
}
