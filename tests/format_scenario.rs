use std::sync::Arc;
use std::time::{Duration, Instant};

use diskops::adapters::SimulatedTools;
use diskops::cli::monitor::MonitorApp;
use diskops::core::{
    FormatEvent, FormatLauncher, FormatMode, MemoryEventLog, MonitorEntry, MonitorStatus,
    PathResolver, PollSession, Poller, SlotIndex,
};

fn ports(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("phy{}", i)).collect()
}

#[tokio::test]
async fn test_batch_complete_failed_and_abandoned() {
    let (tools, sim) = SimulatedTools::new();
    sim.add_disk("phy0", "/dev/sdb", "ST4000NM0035", "ZC1001");
    sim.add_disk("phy1", "/dev/sdc", "ST4000NM0035", "ZC1002");
    sim.add_disk("phy2", "/dev/sdd", "ST4000NM0035", "ZC1003");
    sim.fail_spawn("/dev/sdc", "permission denied");

    let tools = Arc::new(tools);
    let events = Arc::new(MemoryEventLog::new());

    let index = SlotIndex::new(&ports(3), &[4, 5, 6]).unwrap();
    let devices = PathResolver::new(&index, tools.as_ref()).resolve();
    assert_eq!(devices.len(), 3);

    let mut launcher = FormatLauncher::new(tools.clone(), events.clone());
    launcher.launch(&devices, FormatMode::Full);

    let lines = events.lines();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("FORMAT_STARTED mode=full slot=4 dev=/dev/sdb"));
    assert!(lines[1].starts_with("FORMAT_FAILED slot=5 dev=/dev/sdc"));
    assert!(lines[1].contains("permission denied"));
    assert!(lines[2].starts_with("FORMAT_STARTED mode=full slot=6 dev=/dev/sdd"));

    let mut app = MonitorApp::chained(launcher, tools.clone(), events.clone(), 5);
    assert_eq!(app.session.entries[1].status, MonitorStatus::Failed);

    sim.finish("/dev/sdb", true);
    assert!(app.check_jobs());
    assert_eq!(app.session.entries[0].status, MonitorStatus::Complete);
    assert_eq!(app.session.entries[0].percent, Some(100.0));

    let lines = events.lines();
    assert_eq!(
        lines[3],
        "FORMAT_COMPLETE slot=4 dev=/dev/sdb model=ST4000NM0035 serial=ZC1001"
    );
    assert!(!app.finished());

    app.quit();
    assert!(!app.running);
    assert_eq!(app.abandoned, vec![std::path::PathBuf::from("/dev/sdd")]);

    let lines = events.lines();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[4], "FORMAT_ABORTED devices=/dev/sdd");

    // Quitting leaves the process alone.
    assert!(sim.is_formatting("/dev/sdd"));
    assert_eq!(sim.formats_started("/dev/sdd"), 1);
    assert_eq!(sim.formats_started("/dev/sdc"), 0);
}

#[tokio::test]
async fn test_standalone_progress_to_completion() {
    let (tools, sim) = SimulatedTools::new();
    sim.add_disk("phy0", "/dev/sdb", "ST4000NM0035", "ZC1001");
    sim.push_progress("/dev/sdb", "Progress indication: 45.00% done\n");
    sim.push_progress("/dev/sdb", "Format in progress, 92.00% done\n");
    sim.push_progress("/dev/sdb", "");

    let tools = Arc::new(tools);
    let events = Arc::new(MemoryEventLog::new());
    let index = SlotIndex::new(&ports(1), &[0]).unwrap();
    let devices = PathResolver::new(&index, tools.as_ref()).resolve();

    let start = Instant::now();
    let entries = devices
        .into_iter()
        .map(|d| MonitorEntry::new(d, start))
        .collect();
    let mut session = PollSession::new(entries, 5);
    let poller = Poller::new(tools, events.clone());

    poller.tick(&mut session, start + Duration::from_secs(10)).await;
    let entry = &session.entries[0];
    assert_eq!(entry.status, MonitorStatus::Running);
    assert_eq!(entry.percent, Some(45.0));
    // One reading gives no rate yet.
    assert_eq!(entry.eta, None);

    poller.tick(&mut session, start + Duration::from_secs(20)).await;
    let entry = &session.entries[0];
    assert_eq!(entry.percent, Some(92.0));
    assert_eq!(entry.eta, Some(Duration::from_secs(2)));
    assert!(events.events().is_empty());

    poller.tick(&mut session, start + Duration::from_secs(30)).await;
    let entry = &session.entries[0];
    assert_eq!(entry.status, MonitorStatus::Complete);
    assert_eq!(entry.percent, Some(100.0));
    assert_eq!(entry.elapsed, Duration::from_secs(30));
    assert!(session.all_terminal());

    assert_eq!(
        events.lines(),
        vec!["FORMAT_COMPLETE slot=0 dev=/dev/sdb model=ST4000NM0035 serial=ZC1001".to_string()]
    );

    // Terminal entries are no longer queried.
    sim.push_progress("/dev/sdb", "Progress indication: 5.00% done\n");
    poller.tick(&mut session, start + Duration::from_secs(40)).await;
    assert_eq!(session.entries[0].status, MonitorStatus::Complete);
    assert_eq!(session.entries[0].elapsed, Duration::from_secs(30));
}

#[tokio::test]
async fn test_unreachable_device_recovers() {
    let (tools, sim) = SimulatedTools::new();
    sim.add_disk("phy0", "/dev/sdb", "M", "S");
    sim.push_progress("/dev/sdb", "Progress indication: 45.00% done\n");
    sim.push_query_error("/dev/sdb");
    sim.push_progress("/dev/sdb", "");

    let tools = Arc::new(tools);
    let events = Arc::new(MemoryEventLog::new());
    let index = SlotIndex::new(&ports(1), &[0]).unwrap();
    let devices = PathResolver::new(&index, tools.as_ref()).resolve();

    let start = Instant::now();
    let entries = devices
        .into_iter()
        .map(|d| MonitorEntry::new(d, start))
        .collect();
    let mut session = PollSession::new(entries, 5);
    let poller = Poller::new(tools, events.clone());

    poller.tick(&mut session, start + Duration::from_secs(5)).await;
    poller.tick(&mut session, start + Duration::from_secs(10)).await;
    assert_eq!(session.entries[0].status, MonitorStatus::Unreachable);
    assert!(!session.all_terminal());

    // Below the near-complete threshold an idle answer is not completion.
    poller.tick(&mut session, start + Duration::from_secs(15)).await;
    let entry = &session.entries[0];
    assert_eq!(entry.status, MonitorStatus::Running);
    assert_eq!(entry.percent, None);
    assert_eq!(entry.eta, None);
    assert!(events.events().is_empty());
}

#[tokio::test]
async fn test_job_backed_completion_logged_once() {
    let (tools, sim) = SimulatedTools::new();
    sim.add_disk("phy0", "/dev/sdb", "M", "S");
    sim.push_progress("/dev/sdb", "Progress indication: 95.00% done\n");
    sim.push_progress("/dev/sdb", "");

    let tools = Arc::new(tools);
    let events = Arc::new(MemoryEventLog::new());
    let index = SlotIndex::new(&ports(1), &[0]).unwrap();
    let devices = PathResolver::new(&index, tools.as_ref()).resolve();

    let mut launcher = FormatLauncher::new(tools.clone(), events.clone());
    launcher.launch(&devices, FormatMode::Fast);
    let mut app = MonitorApp::chained(launcher, tools, events.clone(), 5);

    app.poll().await;
    app.poll().await;
    assert_eq!(app.session.entries[0].status, MonitorStatus::Complete);
    // The job is still running, so the monitor keeps going.
    assert!(!app.finished());

    sim.finish("/dev/sdb", true);
    app.check_jobs();
    assert!(app.finished());

    let completes = events
        .events()
        .into_iter()
        .filter(|e| matches!(e, FormatEvent::Complete { .. }))
        .count();
    assert_eq!(completes, 1);
    assert!(events.lines()[0].starts_with("FORMAT_STARTED mode=fast"));

    app.complete();
    assert!(app.abandoned.is_empty());
}

#[tokio::test]
async fn test_quit_collects_jobs_that_just_exited() {
    let (tools, sim) = SimulatedTools::new();
    sim.add_disk("phy0", "/dev/sdb", "M", "S1");
    sim.add_disk("phy1", "/dev/sdc", "M", "S2");

    let tools = Arc::new(tools);
    let events = Arc::new(MemoryEventLog::new());
    let index = SlotIndex::new(&ports(2), &[0, 1]).unwrap();
    let devices = PathResolver::new(&index, tools.as_ref()).resolve();

    let mut launcher = FormatLauncher::new(tools.clone(), events.clone());
    launcher.launch(&devices, FormatMode::Full);
    let mut app = MonitorApp::chained(launcher, tools, events.clone(), 5);

    // Exits between frame ticks, right before the operator quits.
    sim.finish("/dev/sdb", true);
    app.quit();

    assert_eq!(app.abandoned, vec![std::path::PathBuf::from("/dev/sdc")]);
    assert_eq!(app.session.entries[0].status, MonitorStatus::Complete);

    let lines = events.lines();
    assert_eq!(lines.len(), 4);
    assert!(lines[2].starts_with("FORMAT_COMPLETE slot=0 dev=/dev/sdb"));
    assert_eq!(lines[3], "FORMAT_ABORTED devices=/dev/sdc");
}
