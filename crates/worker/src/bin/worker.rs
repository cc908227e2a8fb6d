//! worker: consumes article batches from the durable subject and upserts
//! them into PostgreSQL.
//!
//! Subscribes to:
//! - the articles subject through a durable JetStream consumer

use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use sportstream_bus::{run_connection_monitor, ConsumerSpec, DurableConsumer, NatsBus};
use sportstream_core::{Config, Metrics};
use sportstream_storage::{init_pg_pool, PgArticleRepository, PgSequenceAllocator};
use sportstream_worker::{ArticleMessageHandler, ArticleService};

// ── CLI ─────────────────────────────────────────────────────────────

/// Article ingestion worker.
#[derive(Parser, Debug)]
#[command(name = "worker", version, about)]
struct Cli {
    /// Durable consumer name; overrides NATS_CONSUMER_NAME.
    #[arg(long)]
    durable_name: Option<String>,

    /// Subject to consume; overrides NATS_CONSUMER_SUBJECT.
    #[arg(long)]
    subject: Option<String>,
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
    let mut config = Config::from_env();
    if let Some(durable_name) = cli.durable_name {
        config.consumer.durable_name = durable_name;
    }
    if let Some(subject) = cli.subject {
        config.consumer.subject = subject;
    }
    config.log_summary();

    let metrics = Metrics::new();

    let pool = init_pg_pool(&config.postgres).await?;
    let service = ArticleService::new(
        PgArticleRepository::new(pool.clone(), metrics.clone()),
        PgSequenceAllocator::articles(pool.clone()),
        metrics.clone(),
    );
    let handler = ArticleMessageHandler::new(service);

    let bus = Arc::new(NatsBus::connect(&config.nats, metrics.clone()).await?);
    bus.ensure_stream(&config.consumer.stream, &config.consumer.stream_subjects)
        .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let monitor = tokio::spawn(run_connection_monitor(
        Arc::clone(&bus),
        config.nats.reconnect_wait,
        metrics.clone(),
        shutdown_rx.clone(),
    ));

    let consumer = DurableConsumer::new(
        Arc::clone(&bus),
        ConsumerSpec {
            stream: config.consumer.stream.clone(),
            durable_name: config.consumer.durable_name.clone(),
            subject: config.consumer.subject.clone(),
        },
        config.consumer.resubscribe_wait,
        metrics,
    );

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutdown signal received");
        shutdown_tx.send_replace(true);
    });

    info!("worker starting");
    let processed = consumer.run(&handler, shutdown_rx).await;

    if let Err(e) = monitor.await {
        warn!(error = %e, "connection monitor task failed");
    }
    pool.close().await;

    info!(processed, "worker exited cleanly");
    Ok(())
}
