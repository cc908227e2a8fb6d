//! poller: fetches the upstream article feed on a schedule and publishes
//! each page to the bus.
//!
//! Publishes:
//! - raw page bodies to the raw-status subject
//! - article batches (JSON arrays) to the articles subject

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use sportstream_bus::{run_connection_monitor, wait_for_shutdown, NatsBus};
use sportstream_core::{Config, Metrics};
use sportstream_poller::api::{admin_router, AdminState};
use sportstream_poller::config::DEFAULT_CONFIG_PATH;
use sportstream_poller::jobs::PollJob;
use sportstream_poller::{PollerConfig, Scheduler};

// ── CLI ─────────────────────────────────────────────────────────────

/// Scheduled poller for the upstream article feed.
#[derive(Parser, Debug)]
#[command(name = "poller", version, about)]
struct Cli {
    /// Path to the jobs file.
    #[arg(long, env = "POLLER_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Entry under `jobs:` that drives the poll job.
    #[arg(long, env = "POLLER_JOB", default_value = "poller")]
    job: String,

    /// Seconds the admin server may spend draining connections on shutdown.
    #[arg(long, env = "POLLER_SHUTDOWN_TIMEOUT", default_value_t = 10)]
    shutdown_timeout: u64,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    sportstream_core::config::load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    let poller_config = PollerConfig::from_file(&cli.config)?;
    info!(path = %cli.config, jobs = poller_config.jobs.len(), "loaded poller config");
    let job_config = poller_config
        .job(&cli.job)
        .ok_or_else(|| anyhow::anyhow!("job '{}' not found in {}", cli.job, cli.config))?;

    let metrics = Metrics::new();
    let bus = Arc::new(NatsBus::connect(&config.nats, metrics.clone()).await?);
    bus.ensure_stream(&config.consumer.stream, &config.consumer.stream_subjects)
        .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poll_job = PollJob::from_config(
        &cli.job,
        job_config,
        Arc::clone(&bus),
        config.subjects.clone(),
        metrics.clone(),
    )?;
    let scheduler = Arc::new(Scheduler::new());
    scheduler.configure(Arc::new(poll_job), job_config).await?;
    scheduler.start().await?;

    let monitor = tokio::spawn(run_connection_monitor(
        Arc::clone(&bus),
        config.nats.reconnect_wait,
        metrics.clone(),
        shutdown_rx.clone(),
    ));

    let app = admin_router(AdminState {
        scheduler: Arc::clone(&scheduler),
        metrics,
    });
    let listener = tokio::net::TcpListener::bind(config.server.bind_addr()).await?;
    info!(addr = %config.server.bind_addr(), "admin API listening");

    let server = {
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { wait_for_shutdown(&mut shutdown).await })
                .into_future(),
        )
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
    }
    info!("shutdown signal received");
    shutdown_tx.send_replace(true);

    match tokio::time::timeout(Duration::from_secs(cli.shutdown_timeout), server).await {
        Ok(Ok(Ok(()))) => info!("admin API stopped"),
        Ok(Ok(Err(e))) => warn!(error = %e, "admin API exited with error"),
        Ok(Err(e)) => warn!(error = %e, "admin API task failed"),
        Err(_) => warn!(timeout_secs = cli.shutdown_timeout, "admin API drain timed out"),
    }

    scheduler.shutdown().await?;
    if let Err(e) = monitor.await {
        warn!(error = %e, "connection monitor task failed");
    }
    if let Err(e) = bus.flush().await {
        warn!(error = %e, "flushing bus on shutdown failed");
    }

    info!("poller exited cleanly");
    Ok(())
}
