//! Message-bus layer for the article pipeline.
//!
//! The publisher, durable subscriber and connection seams live in
//! [`traits`]; [`nats`] implements them over NATS JetStream and [`memory`]
//! in-process for tests and local runs. [`consumer`] drives a durable
//! subscription through a handler and [`monitor`] keeps the connection alive.

pub mod consumer;
pub mod error;
pub mod memory;
pub mod monitor;
pub mod nats;
pub mod traits;

pub use consumer::{DurableConsumer, MessageHandler};
pub use error::BusError;
pub use memory::InMemoryBus;
pub use monitor::run_connection_monitor;
pub use nats::NatsBus;
pub use traits::{BusConnection, ConsumerSpec, Delivery, DurableSubscriber, MessagePublisher, PublishReceipt};

/// Receiver side of the process-wide shutdown signal. Flips to `true` once.
pub type ShutdownSignal = tokio::sync::watch::Receiver<bool>;

/// Resolve once `signal` reports shutdown (or its sender is gone).
pub async fn wait_for_shutdown(signal: &mut ShutdownSignal) {
    while !*signal.borrow() {
        if signal.changed().await.is_err() {
            return;
        }
    }
}
