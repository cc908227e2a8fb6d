use std::sync::Arc;
use std::time::Duration;

use sportstream_bus::{run_connection_monitor, BusConnection, InMemoryBus};
use sportstream_core::metrics::BUS_CONNECTION_EVENTS_TOTAL;
use sportstream_core::Metrics;
use tokio::sync::watch;

const WAIT: Duration = Duration::from_secs(5);

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
    tokio::task::yield_now().await;
}

#[tokio::test(start_paused = true)]
async fn test_monitor_leaves_healthy_connection_alone() {
    let bus = Arc::new(InMemoryBus::new());
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(run_connection_monitor(Arc::clone(&bus), WAIT, Metrics::new(), rx));

    advance(16).await;
    assert_eq!(bus.reconnect_attempts(), 0);

    tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_monitor_reconnects_dropped_connection() {
    let bus = Arc::new(InMemoryBus::new());
    bus.set_connected(false);
    let metrics = Metrics::new();
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(run_connection_monitor(Arc::clone(&bus), WAIT, metrics.clone(), rx));

    advance(6).await;
    assert_eq!(bus.reconnect_attempts(), 1);
    assert!(bus.is_connected());

    advance(10).await;
    assert_eq!(bus.reconnect_attempts(), 1, "no reconnect while healthy");

    tx.send(true).unwrap();
    task.await.unwrap();

    let snap = metrics.snapshot().await;
    assert_eq!(snap.counter(BUS_CONNECTION_EVENTS_TOTAL, &[("event", "reconnected")]), 1);
}

#[tokio::test(start_paused = true)]
async fn test_monitor_keeps_retrying_failed_reconnects() {
    let bus = Arc::new(InMemoryBus::new());
    bus.set_connected(false);
    bus.fail_reconnects(true);
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(run_connection_monitor(Arc::clone(&bus), WAIT, Metrics::new(), rx));

    advance(16).await;
    assert_eq!(bus.reconnect_attempts(), 3);
    assert!(!bus.is_connected());

    bus.fail_reconnects(false);
    advance(5).await;
    assert_eq!(bus.reconnect_attempts(), 4);
    assert!(bus.is_connected());

    tx.send(true).unwrap();
    task.await.unwrap();
}
