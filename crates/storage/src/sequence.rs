use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::StoreError;

/// Counter backing internal article ids.
pub const ARTICLE_ID_COUNTER: &str = "article_id";

/// Hands out strictly increasing integers, unique across concurrent callers.
/// Values consumed by a failed write are never reused.
#[async_trait]
pub trait SequenceAllocator: Send + Sync {
    async fn next_id(&self) -> Result<i64, StoreError>;
}

#[async_trait]
impl<T: SequenceAllocator + ?Sized> SequenceAllocator for Arc<T> {
    async fn next_id(&self) -> Result<i64, StoreError> {
        (**self).next_id().await
    }
}

/// Sequence allocator over a named row of the `counters` table.
#[derive(Clone)]
pub struct PgSequenceAllocator {
    pool: PgPool,
    counter: String,
}

impl PgSequenceAllocator {
    pub fn new(pool: PgPool, counter: impl Into<String>) -> Self {
        Self {
            pool,
            counter: counter.into(),
        }
    }

    pub fn articles(pool: PgPool) -> Self {
        Self::new(pool, ARTICLE_ID_COUNTER)
    }
}

#[async_trait]
impl SequenceAllocator for PgSequenceAllocator {
    /// Increment-and-fetch in one statement; the row is created at 1.
    async fn next_id(&self) -> Result<i64, StoreError> {
        let seq = sqlx::query_scalar::<_, i64>(
            "INSERT INTO counters (name, seq) VALUES ($1, 1)
             ON CONFLICT (name) DO UPDATE SET seq = counters.seq + 1
             RETURNING seq",
        )
        .bind(&self.counter)
        .fetch_one(&self.pool)
        .await?;
        Ok(seq)
    }
}
