//! Inbound handler for the articles subject.
//!
//! A payload is a JSON array of upstream articles. Each one becomes an
//! upsert keyed on its upstream id. Errors are reported back to the consumer,
//! which counts them as `decode` or `dispatch` and acknowledges the delivery
//! regardless, so a poison batch is never redelivered.

use async_trait::async_trait;
use sportstream_bus::MessageHandler;
use sportstream_core::{UpsertArticle, UpstreamArticle};
use sportstream_storage::{ArticleRepository, SequenceAllocator};
use tracing::{info, warn};

use crate::error::WorkerError;
use crate::service::ArticleService;

pub struct ArticleMessageHandler<R, S> {
    service: ArticleService<R, S>,
}

impl<R, S> ArticleMessageHandler<R, S> {
    pub fn new(service: ArticleService<R, S>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &ArticleService<R, S> {
        &self.service
    }
}

/// Decode a delivered batch into upsert commands.
pub fn decode_batch(payload: &[u8]) -> Result<Vec<UpsertArticle>, serde_json::Error> {
    let articles: Vec<UpstreamArticle> = serde_json::from_slice(payload)?;
    Ok(articles.into_iter().map(UpsertArticle::from).collect())
}

#[async_trait]
impl<R, S> MessageHandler for ArticleMessageHandler<R, S>
where
    R: ArticleRepository + Clone,
    S: SequenceAllocator,
{
    type Error = WorkerError;

    async fn handle(&self, subject: &str, payload: &[u8]) -> Result<(), WorkerError> {
        match decode_batch(payload) {
            Ok(batch) => self.service.upsert_batch(batch).await.map(|outcome| {
                info!(subject, articles = outcome.len(), "article batch stored");
            }),
            Err(e) => {
                warn!(subject, bytes = payload.len(), error = %e, "dropping undecodable article batch");
                Err(WorkerError::Decode(e))
            }
        }
    }

    fn failure_reason(&self, error: &WorkerError) -> &'static str {
        error.reason()
    }
}
