use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::BusError;

/// Acknowledgement returned by the bus for a persisted publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub stream: String,
    pub sequence: u64,
}

/// Publishes raw payloads onto a subject of the durable bus.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish `payload` and wait until the bus has persisted it.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<PublishReceipt, BusError>;
}

/// Blanket implementation so `Arc<dyn MessagePublisher>` can be used directly.
#[async_trait]
impl<T: MessagePublisher + ?Sized> MessagePublisher for Arc<T> {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<PublishReceipt, BusError> {
        (**self).publish(subject, payload).await
    }
}

// ── Durable subscriptions ────────────────────────────────────────────

/// Identity of a durable consumer: the bus remembers its position across
/// restarts under `durable_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSpec {
    pub stream: String,
    pub durable_name: String,
    pub subject: String,
}

/// Explicit acknowledgement of a single delivery.
#[async_trait]
pub trait AckHandle: Send {
    async fn ack(self: Box<Self>) -> Result<(), BusError>;
}

/// A message received from a durable subscription. It stays pending on the
/// bus until [`Delivery::ack`] is called.
pub struct Delivery {
    pub subject: String,
    pub payload: Bytes,
    acker: Box<dyn AckHandle>,
}

impl Delivery {
    pub fn new(subject: impl Into<String>, payload: Bytes, acker: Box<dyn AckHandle>) -> Self {
        Self {
            subject: subject.into(),
            payload,
            acker,
        }
    }

    pub async fn ack(self) -> Result<(), BusError> {
        self.acker.ack().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("subject", &self.subject)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

pub type DeliveryStream = BoxStream<'static, Result<Delivery, BusError>>;

/// Opens durable, explicitly-acknowledged subscriptions.
#[async_trait]
pub trait DurableSubscriber: Send + Sync {
    /// Bind to (creating if absent) the durable consumer and return its
    /// in-order delivery stream.
    async fn subscribe(&self, spec: &ConsumerSpec) -> Result<DeliveryStream, BusError>;
}

#[async_trait]
impl<T: DurableSubscriber + ?Sized> DurableSubscriber for Arc<T> {
    async fn subscribe(&self, spec: &ConsumerSpec) -> Result<DeliveryStream, BusError> {
        (**self).subscribe(spec).await
    }
}

// ── Connection liveness ──────────────────────────────────────────────

/// A bus connection that can report liveness and be re-established.
#[async_trait]
pub trait BusConnection: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn reconnect(&self) -> Result<(), BusError>;
}

#[async_trait]
impl<T: BusConnection + ?Sized> BusConnection for Arc<T> {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    async fn reconnect(&self) -> Result<(), BusError> {
        (**self).reconnect().await
    }
}
