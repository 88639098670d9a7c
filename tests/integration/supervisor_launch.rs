//! Supervisor launching real processes

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use gridwatch::config::SupervisorConfig;
use gridwatch::supervisor::{Supervisor, SupervisorState, WorkerKind};

fn script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[tokio::test]
async fn test_launch_reports_each_worker_independently() {
    let dir = tempfile::tempdir().unwrap();
    script(dir.path(), "gridwatch-devices", "exec sleep 30");
    script(dir.path(), "gridwatch-health", "exit 1");

    let config = SupervisorConfig {
        workers: vec![WorkerKind::Devices, WorkerKind::Health, WorkerKind::Mqtt],
        ..SupervisorConfig::default()
    };
    let mut supervisor = Supervisor::new(
        config,
        dir.path().join("config.json"),
        dir.path().to_path_buf(),
    )
    .with_launch_grace(Duration::from_millis(500));

    supervisor.launch_workers().await;

    assert_eq!(supervisor.state(), SupervisorState::LaunchingWorkers);
    assert_eq!(supervisor.workers().len(), 1);
    assert_eq!(supervisor.workers()[0].kind, WorkerKind::Devices);

    supervisor.stop().await;
    assert!(supervisor.workers().is_empty());
}

#[tokio::test]
async fn test_exited_worker_is_forgotten_not_restarted() {
    let dir = tempfile::tempdir().unwrap();
    script(dir.path(), "gridwatch-devices", "sleep 1");

    let config = SupervisorConfig {
        workers: vec![WorkerKind::Devices],
        ..SupervisorConfig::default()
    };
    let mut supervisor = Supervisor::new(
        config,
        dir.path().join("config.json"),
        dir.path().to_path_buf(),
    )
    .with_launch_grace(Duration::from_millis(100));

    supervisor.launch_workers().await;
    assert_eq!(supervisor.workers().len(), 1);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    supervisor.reap_exited();

    assert!(supervisor.workers().is_empty());
}
