//! The periodic loop survives the store going away and coming back

use std::time::Duration;

use gridwatch::monitors::run_periodic;
use gridwatch::util::shutdown_channel;

use crate::helpers::{CountingCollector, FlakyCollector, eventually, memory_sink};

#[tokio::test]
async fn test_initial_connect_retries_until_store_is_up() {
    let (memory, sink) = memory_sink("telemetry");
    memory.fail_next_connects(3);
    let (trigger, shutdown) = shutdown_channel();

    let task = tokio::spawn(run_periodic(
        CountingCollector { count: 0.0 },
        sink,
        Duration::from_millis(20),
        shutdown,
    ));

    assert!(eventually(|| !memory.points_in("telemetry").is_empty()).await);
    assert_eq!(memory.connect_attempts(), 4);
    assert_eq!(memory.databases(), vec!["telemetry".to_string()]);

    trigger.trigger();
    task.await.unwrap();
}

#[tokio::test]
async fn test_store_restart_triggers_reconnect() {
    let (memory, sink) = memory_sink("telemetry");
    let (trigger, shutdown) = shutdown_channel();

    let task = tokio::spawn(run_periodic(
        CountingCollector { count: 0.0 },
        sink,
        Duration::from_millis(20),
        shutdown,
    ));

    assert!(eventually(|| memory.points().len() >= 2).await);
    memory.drop_connections();

    assert!(eventually(|| memory.connect_attempts() >= 2).await);
    let before = memory.points().len();
    assert!(eventually(|| memory.points().len() > before).await);

    trigger.trigger();
    task.await.unwrap();
}

#[tokio::test]
async fn test_write_failure_then_recovery() {
    let (memory, sink) = memory_sink("telemetry");
    let (trigger, shutdown) = shutdown_channel();
    memory.fail_next_writes(2);

    let task = tokio::spawn(run_periodic(
        CountingCollector { count: 0.0 },
        sink,
        Duration::from_millis(20),
        shutdown,
    ));

    assert!(eventually(|| !memory.points().is_empty()).await);
    assert!(memory.connect_attempts() >= 3);

    trigger.trigger();
    task.await.unwrap();
}

#[tokio::test]
async fn test_unclassified_failures_do_not_stop_the_loop() {
    let (memory, sink) = memory_sink("telemetry");
    let (trigger, shutdown) = shutdown_channel();

    let task = tokio::spawn(run_periodic(
        FlakyCollector { calls: 0 },
        sink,
        Duration::from_millis(10),
        shutdown,
    ));

    assert!(eventually(|| memory.points().len() >= 2).await);
    assert_eq!(memory.connect_attempts(), 1);

    trigger.trigger();
    task.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_while_store_is_down() {
    let (memory, sink) = memory_sink("telemetry");
    memory.fail_next_connects(usize::MAX);
    let (trigger, shutdown) = shutdown_channel();

    let task = tokio::spawn(run_periodic(
        CountingCollector { count: 0.0 },
        sink,
        Duration::from_millis(10),
        shutdown,
    ));

    assert!(eventually(|| memory.connect_attempts() >= 2).await);
    trigger.trigger();

    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    assert!(memory.points().is_empty());
}
