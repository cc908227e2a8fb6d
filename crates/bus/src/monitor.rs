//! Periodic liveness check for the bus connection.

use std::time::Duration;

use sportstream_core::Metrics;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::traits::BusConnection;
use crate::{wait_for_shutdown, ShutdownSignal};

/// Every `wait`, reconnect `conn` if it reports itself disconnected.
/// Returns when `shutdown` fires.
pub async fn run_connection_monitor<C: BusConnection>(
    conn: C,
    wait: Duration,
    metrics: Metrics,
    mut shutdown: ShutdownSignal,
) {
    let mut ticker = interval_at(Instant::now() + wait, wait);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval = ?wait, "connection monitor started");

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = ticker.tick() => {}
        }

        if conn.is_connected() {
            continue;
        }

        warn!("bus connection is down, reconnecting");
        match conn.reconnect().await {
            Ok(()) => {
                info!("bus connection re-established");
                metrics.connection_event("reconnected").await;
            }
            Err(e) => {
                error!(error = %e, "reconnect failed");
                metrics.connection_event("reconnect_failed").await;
            }
        }
    }

    info!("connection monitor stopped");
}
