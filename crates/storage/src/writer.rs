//! Idempotent article writer.
//!
//! Resolves the internal id for an external id (allocating one on first
//! sight) and upserts the full record keyed on the external id. Replaying
//! the same command any number of times leaves exactly one row whose
//! internal id never changes.

use sportstream_core::{Article, Metrics, UpsertArticle};
use tracing::{debug, error};

use crate::articles::{ArticleRecord, ArticleRepository};
use crate::error::StoreError;
use crate::sequence::SequenceAllocator;

pub struct ArticleWriter<R, S> {
    repo: R,
    sequence: S,
    metrics: Metrics,
}

impl<R: ArticleRepository, S: SequenceAllocator> ArticleWriter<R, S> {
    pub fn new(repo: R, sequence: S, metrics: Metrics) -> Self {
        Self {
            repo,
            sequence,
            metrics,
        }
    }

    pub async fn upsert_by_external_id(&self, article: UpsertArticle) -> Result<Article, StoreError> {
        let external_id = article.external_id;

        self.metrics.db_call("find").await;
        let existing = match self.repo.find_internal_id(external_id).await {
            Ok(existing) => existing,
            Err(e) => {
                error!(external_id, error = %e, "lookup by external id failed");
                self.metrics.db_error("find", "find_error").await;
                return Err(e);
            }
        };

        // Concurrent first writes may each allocate; the loser's value is wasted.
        let id = match existing {
            Some(id) => id,
            None => {
                self.metrics.db_call("sequence").await;
                match self.sequence.next_id().await {
                    Ok(id) => id,
                    Err(e) => {
                        error!(external_id, error = %e, "sequence allocation failed");
                        self.metrics.db_error("sequence", "sequence_error").await;
                        return Err(e);
                    }
                }
            }
        };

        let record = ArticleRecord {
            id,
            external_id,
            content: article.content,
        };

        self.metrics.db_call("upsert").await;
        match self.repo.upsert(&record).await {
            Ok(Some(stored)) => {
                debug!(external_id, id = stored.id, created = existing.is_none(), "article upserted");
                Ok(stored)
            }
            Ok(None) => {
                error!(external_id, "upsert returned no row");
                self.metrics.db_error("upsert", "not_found").await;
                Err(StoreError::UpsertMissing { external_id })
            }
            Err(e) => {
                error!(external_id, error = %e, "upsert failed");
                self.metrics.db_error("upsert", "upsert_error").await;
                Err(e)
            }
        }
    }
}
