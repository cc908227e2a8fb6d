//! Durable consumer loop.
//!
//! Pulls deliveries one at a time, hands each to a [`MessageHandler`] and
//! acknowledges it once the handler returns, whatever the outcome. Handler
//! failures are logged and counted once, under the reason the handler
//! reports; they never trigger redelivery.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use sportstream_core::Metrics;
use tracing::{info, warn};

use crate::traits::{ConsumerSpec, Delivery, DurableSubscriber};
use crate::{wait_for_shutdown, ShutdownSignal};

/// Processes the payload of one delivery.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn handle(&self, subject: &str, payload: &[u8]) -> Result<(), Self::Error>;

    /// Label recorded under `consumer_failures_total` for a failed delivery.
    fn failure_reason(&self, _error: &Self::Error) -> &'static str {
        "handler"
    }
}

pub struct DurableConsumer<S> {
    subscriber: S,
    spec: ConsumerSpec,
    resubscribe_wait: Duration,
    metrics: Metrics,
}

impl<S: DurableSubscriber> DurableConsumer<S> {
    pub fn new(subscriber: S, spec: ConsumerSpec, resubscribe_wait: Duration, metrics: Metrics) -> Self {
        Self {
            subscriber,
            spec,
            resubscribe_wait,
            metrics,
        }
    }

    pub fn spec(&self) -> &ConsumerSpec {
        &self.spec
    }

    /// Consume until `shutdown` fires. A delivery already being handled is
    /// finished and acknowledged before returning. Returns the number of
    /// deliveries processed.
    pub async fn run<H: MessageHandler>(&self, handler: &H, mut shutdown: ShutdownSignal) -> u64 {
        let mut processed: u64 = 0;

        loop {
            let subscribed = tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                result = self.subscriber.subscribe(&self.spec) => result,
            };

            match subscribed {
                Ok(mut deliveries) => {
                    info!(durable = %self.spec.durable_name, subject = %self.spec.subject, "consuming");
                    loop {
                        let next = tokio::select! {
                            biased;
                            _ = wait_for_shutdown(&mut shutdown) => {
                                info!(processed, "consumer stopped");
                                return processed;
                            }
                            next = deliveries.next() => next,
                        };

                        match next {
                            Some(Ok(delivery)) => {
                                self.process(handler, delivery).await;
                                processed += 1;
                            }
                            Some(Err(e)) => {
                                warn!(error = %e, "delivery stream error, resubscribing");
                                self.metrics.consumer_failure(&self.spec.subject, "receive").await;
                                break;
                            }
                            None => {
                                warn!("delivery stream ended, resubscribing");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, durable = %self.spec.durable_name, "subscribe failed");
                    self.metrics.consumer_failure(&self.spec.subject, "subscribe").await;
                }
            }

            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = tokio::time::sleep(self.resubscribe_wait) => {}
            }
        }

        info!(processed, "consumer stopped");
        processed
    }

    async fn process<H: MessageHandler>(&self, handler: &H, delivery: Delivery) {
        self.metrics.consumer_message(&delivery.subject).await;
        info!(subject = %delivery.subject, bytes = delivery.payload.len(), "message received");

        if let Err(e) = handler.handle(&delivery.subject, &delivery.payload).await {
            warn!(subject = %delivery.subject, error = %e, "message handling failed, acknowledging anyway");
            self.metrics
                .consumer_failure(&delivery.subject, handler.failure_reason(&e))
                .await;
        }

        let subject = delivery.subject.clone();
        if let Err(e) = delivery.ack().await {
            warn!(subject = %subject, error = %e, "ack failed");
            self.metrics.consumer_failure(&subject, "ack").await;
        }
    }
}
