//! Article batch service.

use sportstream_core::pagination::PageRequest;
use sportstream_core::{Article, Metrics, StoredArticlePage, UpsertArticle};
use sportstream_storage::{ArticleReader, ArticleRepository, ArticleWriter, SequenceAllocator, StoreError};
use tracing::{debug, error};

use crate::error::WorkerError;

/// Writes article batches through the idempotent writer.
pub struct ArticleService<R, S> {
    writer: ArticleWriter<R, S>,
    reader: R,
}

impl<R, S> ArticleService<R, S>
where
    R: ArticleRepository + Clone,
    S: SequenceAllocator,
{
    pub fn new(repo: R, sequence: S, metrics: Metrics) -> Self {
        Self {
            writer: ArticleWriter::new(repo.clone(), sequence, metrics),
            reader: repo,
        }
    }

    pub async fn upsert(&self, article: UpsertArticle) -> Result<Article, StoreError> {
        self.writer.upsert_by_external_id(article).await
    }

    /// Write `batch` in order. The first failure stops the batch; articles
    /// already written stay written.
    pub async fn upsert_batch(&self, batch: Vec<UpsertArticle>) -> Result<BatchOutcome, WorkerError> {
        let total = batch.len();
        let mut stored = Vec::with_capacity(total);

        for (index, article) in batch.into_iter().enumerate() {
            let external_id = article.external_id;
            match self.writer.upsert_by_external_id(article).await {
                Ok(a) => stored.push(a),
                Err(source) => {
                    let skipped = total - index - 1;
                    error!(external_id, stored = stored.len(), skipped, error = %source, "batch stopped");
                    return Err(WorkerError::Store {
                        external_id,
                        skipped,
                        source,
                    });
                }
            }
        }

        debug!(stored = stored.len(), "batch stored");
        Ok(BatchOutcome { stored })
    }
}

impl<R, S> ArticleService<R, S>
where
    R: ArticleReader,
{
    pub async fn article(&self, id: i64) -> Result<Article, StoreError> {
        self.reader.get_by_id(id).await
    }

    pub async fn article_by_external_id(&self, external_id: i64) -> Result<Article, StoreError> {
        self.reader.get_by_external_id(external_id).await
    }

    /// One page of stored articles, newest first. Out-of-range paging
    /// arguments fall back to the defaults.
    pub async fn articles(&self, page: i64, page_size: i64) -> Result<StoredArticlePage, StoreError> {
        self.reader.list_page(PageRequest::normalize(page, page_size)).await
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub stored: Vec<Article>,
}

impl BatchOutcome {
    pub fn len(&self) -> usize {
        self.stored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stored.is_empty()
    }
}
