//! Reachability and health collectors driven end to end

use std::time::Duration;

use gridwatch::monitors::health::{AlertThresholds, HealthSampler};
use gridwatch::monitors::reachability::{HostRoster, ReachabilityPoller};
use gridwatch::monitors::run_periodic;
use gridwatch::util::shutdown_channel;
use pretty_assertions::assert_eq;

use crate::helpers::{HotHost, PrefixProbe, eventually, memory_sink};

#[tokio::test]
async fn test_reachability_points() {
    let (memory, sink) = memory_sink("check_devices");
    let (trigger, shutdown) = shutdown_channel();
    let poller = ReachabilityPoller::new(
        PrefixProbe,
        HostRoster::new(["up-router", "", "down-nas", "up-printer"]),
        Duration::from_millis(50),
        "data_check_devices",
    );

    let task = tokio::spawn(run_periodic(
        poller,
        sink,
        Duration::from_millis(20),
        shutdown,
    ));

    assert!(eventually(|| !memory.points_in("check_devices").is_empty()).await);
    trigger.trigger();
    task.await.unwrap();

    let point = &memory.points_in("check_devices")[0];
    assert_eq!(point.measurement, "data_check_devices");
    assert_eq!(point.fields.len(), 3);
    assert_eq!(point.fields["up-router"], 1.0);
    assert_eq!(point.fields["down-nas"], 0.0);
    assert_eq!(point.fields["up-printer"], 1.0);
}

#[tokio::test]
async fn test_empty_roster_writes_nothing() {
    let (memory, sink) = memory_sink("check_devices");
    let (trigger, shutdown) = shutdown_channel();
    let poller = ReachabilityPoller::new(
        PrefixProbe,
        HostRoster::new(Vec::<String>::new()),
        Duration::from_millis(50),
        "data_check_devices",
    );

    let task = tokio::spawn(run_periodic(
        poller,
        sink,
        Duration::from_millis(10),
        shutdown,
    ));

    assert!(eventually(|| memory.connect_attempts() == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    trigger.trigger();
    task.await.unwrap();

    assert!(memory.points().is_empty());
}

#[tokio::test]
async fn test_health_alert_point() {
    let (memory, sink) = memory_sink("raspberry");
    let (trigger, shutdown) = shutdown_channel();
    let sampler = HealthSampler::new(HotHost, AlertThresholds::default(), "data_raspberry");

    let task = tokio::spawn(run_periodic(
        sampler,
        sink,
        Duration::from_millis(20),
        shutdown,
    ));

    assert!(eventually(|| !memory.points_in("raspberry").is_empty()).await);
    trigger.trigger();
    task.await.unwrap();

    let point = &memory.points_in("raspberry")[0];
    assert_eq!(point.measurement, "data_raspberry");
    assert_eq!(point.fields["alerta_hardware"], 1.0);
    assert_eq!(point.fields["porcentaje_uso_cpu"], 93.0);
    assert_eq!(point.fields["temperatura_cpu"], 72.5);
    assert_eq!(point.fields["ram_total"], 1024.0);
    assert_eq!(point.fields["porcentaje_ram"], 50.0);
    assert_eq!(point.fields["memoria_total"], -1.0);
    assert_eq!(point.fields["porcentaje_memoria"], -1.0);
}
