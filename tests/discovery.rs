use std::path::{Path, PathBuf};

use diskops::adapters::{LinuxTools, SimulatedTools};
use diskops::core::{DiskTools, PathResolver, SlotIndex, UNKNOWN};
use tempfile::TempDir;

fn ports(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("/dev/disk/by-path/pci-0000:01:00.0-sas-phy{}-lun-0", i))
        .collect()
}

#[test]
fn test_empty_bays_are_skipped() {
    let ports = ports(4);
    let (tools, sim) = SimulatedTools::new();
    sim.add_disk(&ports[0], "/dev/sdb", "ST4000NM0035", "ZC1001");
    sim.add_disk(&ports[2], "/dev/sdd", "ST4000NM0035", "ZC1003");

    let index = SlotIndex::new(&ports, &[10, 11, 12, 13]).unwrap();
    let devices = PathResolver::new(&index, &tools).resolve();

    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].path, PathBuf::from("/dev/sdb"));
    assert_eq!(devices[0].slot, Some(10));
    assert_eq!(devices[0].port.as_deref(), Some(ports[0].as_str()));
    assert_eq!(devices[1].path, PathBuf::from("/dev/sdd"));
    assert_eq!(devices[1].slot, Some(12));
    assert_eq!(devices[1].size, "3.6T");
}

#[test]
fn test_pulled_disk_disappears() {
    let ports = ports(2);
    let (tools, sim) = SimulatedTools::new();
    sim.add_disk(&ports[0], "/dev/sdb", "M", "S1");
    sim.add_disk(&ports[1], "/dev/sdc", "M", "S2");

    let index = SlotIndex::new(&ports, &[0, 1]).unwrap();
    assert_eq!(PathResolver::new(&index, &tools).resolve().len(), 2);

    sim.remove_disk(&ports[0]);
    let devices = PathResolver::new(&index, &tools).resolve();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].slot, Some(1));
}

#[test]
fn test_inventory_failure_is_unknown() {
    let ports = ports(1);
    let (tools, sim) = SimulatedTools::new();
    sim.add_disk(&ports[0], "/dev/sdb", "M", "S");
    sim.fail_inventory("/dev/sdb");

    let index = SlotIndex::new(&ports, &[3]).unwrap();
    let devices = PathResolver::new(&index, &tools).resolve();

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].model, UNKNOWN);
    assert_eq!(devices[0].serial, UNKNOWN);
    assert_eq!(devices[0].slot, Some(3));
}

#[test]
fn test_linux_resolve_rejects_non_block_targets() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("not-a-disk");
    std::fs::write(&file, b"").unwrap();

    let link = dir.path().join("phy0");
    std::os::unix::fs::symlink(&file, &link).unwrap();
    let dangling = dir.path().join("phy1");
    std::os::unix::fs::symlink(dir.path().join("gone"), &dangling).unwrap();

    let tools = LinuxTools::with_defaults();
    assert_eq!(tools.resolve_port(&link), None);
    assert_eq!(tools.resolve_port(&dangling), None);
    assert_eq!(tools.resolve_port(Path::new("/dev/null")), None);
}
