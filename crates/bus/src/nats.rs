//! NATS JetStream implementation of the bus seams.

use std::sync::RwLock;

use async_nats::connection::State;
use async_nats::jetstream::{self, consumer::pull, consumer::AckPolicy, stream};
use async_nats::{Client, ConnectOptions, Event};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use sportstream_core::config::NatsConfig;
use sportstream_core::Metrics;
use tracing::{debug, info, warn};

use crate::error::BusError;
use crate::traits::{
    AckHandle, BusConnection, ConsumerSpec, Delivery, DeliveryStream, DurableSubscriber,
    MessagePublisher, PublishReceipt,
};

/// A NATS connection with JetStream publish and durable pull consumers.
///
/// The client is swapped wholesale on [`BusConnection::reconnect`], so every
/// operation resolves the current client at call time.
pub struct NatsBus {
    url: String,
    client_name: String,
    client: RwLock<Client>,
    metrics: Metrics,
}

impl NatsBus {
    /// Connect to the server described by `config`.
    pub async fn connect(config: &NatsConfig, metrics: Metrics) -> Result<Self, BusError> {
        let url = config.url();
        let client = dial(&url, &config.client_name, metrics.clone()).await?;
        info!(url = %url, name = %config.client_name, "connected to NATS");
        Ok(Self {
            url,
            client_name: config.client_name.clone(),
            client: RwLock::new(client),
            metrics,
        })
    }

    fn client(&self) -> Client {
        self.client
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn jetstream(&self) -> jetstream::Context {
        jetstream::new(self.client())
    }

    /// Create the stream if it does not exist yet.
    pub async fn ensure_stream(&self, name: &str, subjects: &[String]) -> Result<(), BusError> {
        let config = stream::Config {
            name: name.to_string(),
            subjects: subjects.to_vec(),
            ..Default::default()
        };
        self.jetstream()
            .get_or_create_stream(config)
            .await
            .map_err(|e| BusError::Stream(e.to_string()))?;
        info!(stream = %name, subjects = ?subjects, "JetStream stream ready");
        Ok(())
    }

    /// Flush pending publishes before shutdown.
    pub async fn flush(&self) -> Result<(), BusError> {
        self.client()
            .flush()
            .await
            .map_err(|e| BusError::Connect(e.to_string()))
    }
}

async fn dial(url: &str, name: &str, metrics: Metrics) -> Result<Client, BusError> {
    ConnectOptions::new()
        .name(name)
        .event_callback(move |event| {
            let metrics = metrics.clone();
            async move {
                match event {
                    Event::Connected => {
                        info!("NATS connection established");
                        metrics.connection_event("connected").await;
                    }
                    Event::Disconnected => {
                        warn!("NATS connection lost");
                        metrics.connection_event("disconnected").await;
                    }
                    other => debug!(event = ?other, "NATS client event"),
                }
            }
        })
        .connect(url)
        .await
        .map_err(|e| BusError::Connect(e.to_string()))
}

#[async_trait]
impl MessagePublisher for NatsBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<PublishReceipt, BusError> {
        let publish_err = |reason: String| BusError::Publish {
            subject: subject.to_string(),
            reason,
        };
        let ack = self
            .jetstream()
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| publish_err(e.to_string()))?
            .await
            .map_err(|e| publish_err(e.to_string()))?;
        Ok(PublishReceipt {
            stream: ack.stream,
            sequence: ack.sequence,
        })
    }
}

#[async_trait]
impl DurableSubscriber for NatsBus {
    async fn subscribe(&self, spec: &ConsumerSpec) -> Result<DeliveryStream, BusError> {
        let stream = self
            .jetstream()
            .get_stream(&spec.stream)
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        let consumer = stream
            .get_or_create_consumer(
                &spec.durable_name,
                pull::Config {
                    durable_name: Some(spec.durable_name.clone()),
                    filter_subject: spec.subject.clone(),
                    ack_policy: AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        info!(
            stream = %spec.stream,
            durable = %spec.durable_name,
            subject = %spec.subject,
            "durable consumer bound"
        );

        let deliveries = messages.map(|item| match item {
            Ok(message) => {
                let subject = message.subject.to_string();
                let payload = message.payload.clone();
                Ok(Delivery::new(subject, payload, Box::new(NatsAck(message))))
            }
            Err(e) => Err(BusError::Receive(e.to_string())),
        });
        Ok(deliveries.boxed())
    }
}

#[async_trait]
impl BusConnection for NatsBus {
    fn is_connected(&self) -> bool {
        matches!(self.client().connection_state(), State::Connected)
    }

    async fn reconnect(&self) -> Result<(), BusError> {
        let client = dial(&self.url, &self.client_name, self.metrics.clone()).await?;
        *self
            .client
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = client;
        Ok(())
    }
}

struct NatsAck(jetstream::Message);

#[async_trait]
impl AckHandle for NatsAck {
    async fn ack(self: Box<Self>) -> Result<(), BusError> {
        self.0.ack().await.map_err(|e| BusError::Ack(e.to_string()))
    }
}
