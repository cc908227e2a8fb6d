//! Article repository seams and their PostgreSQL implementation.
//!
//! [`ArticleRepository`] is the narrow write-side surface the idempotent
//! writer needs; [`ArticleReader`] holds the read queries (by id, by
//! external id, paginated listing).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sportstream_core::pagination::PageRequest;
use sportstream_core::{Article, ArticleContent, Media, Metrics, StoredArticlePage, Tag};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::error;

use crate::error::StoreError;

// ── Record ───────────────────────────────────────────────────────────

/// A fully-built article ready to be upserted: the internal id is already
/// resolved (existing or freshly allocated).
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRecord {
    pub id: i64,
    pub external_id: i64,
    pub content: ArticleContent,
}

// ── Seams ────────────────────────────────────────────────────────────

#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Internal id of the article with this external id, if stored.
    async fn find_internal_id(&self, external_id: i64) -> Result<Option<i64>, StoreError>;

    /// Insert-or-update keyed on `external_id` in a single statement. On
    /// update only the content fields and `updated_at` change; `id`,
    /// `external_id` and `created_at` are written on insert only.
    /// Returns the post-update row.
    async fn upsert(&self, record: &ArticleRecord) -> Result<Option<Article>, StoreError>;
}

#[async_trait]
impl<T: ArticleRepository + ?Sized> ArticleRepository for Arc<T> {
    async fn find_internal_id(&self, external_id: i64) -> Result<Option<i64>, StoreError> {
        (**self).find_internal_id(external_id).await
    }

    async fn upsert(&self, record: &ArticleRecord) -> Result<Option<Article>, StoreError> {
        (**self).upsert(record).await
    }
}

#[async_trait]
pub trait ArticleReader: Send + Sync {
    async fn get_by_id(&self, id: i64) -> Result<Article, StoreError>;

    async fn get_by_external_id(&self, external_id: i64) -> Result<Article, StoreError>;

    /// Articles sorted by `date` descending.
    async fn list_page(&self, request: PageRequest) -> Result<StoredArticlePage, StoreError>;
}

#[async_trait]
impl<T: ArticleReader + ?Sized> ArticleReader for Arc<T> {
    async fn get_by_id(&self, id: i64) -> Result<Article, StoreError> {
        (**self).get_by_id(id).await
    }

    async fn get_by_external_id(&self, external_id: i64) -> Result<Article, StoreError> {
        (**self).get_by_external_id(external_id).await
    }

    async fn list_page(&self, request: PageRequest) -> Result<StoredArticlePage, StoreError> {
        (**self).list_page(request).await
    }
}

// ── PostgreSQL ───────────────────────────────────────────────────────

const ARTICLE_COLUMNS: &str = "id, external_id, title, description, date, body, summary,
     lead_media, tags, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct ArticleRow {
    id: i64,
    external_id: i64,
    title: String,
    description: String,
    date: String,
    body: String,
    summary: String,
    lead_media: Json<Media>,
    tags: Json<Vec<Tag>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        Self {
            id: row.id,
            external_id: row.external_id,
            content: ArticleContent {
                title: row.title,
                description: row.description,
                date: row.date,
                body: row.body,
                summary: row.summary,
                lead_media: row.lead_media.0,
                tags: row.tags.0,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Article store over the `articles` table.
#[derive(Clone)]
pub struct PgArticleRepository {
    pool: PgPool,
    metrics: Metrics,
}

impl PgArticleRepository {
    pub fn new(pool: PgPool, metrics: Metrics) -> Self {
        Self { pool, metrics }
    }

    async fn fetch_one_where(&self, op: &str, column: &str, value: i64) -> Result<Article, StoreError> {
        if value <= 0 {
            return Err(StoreError::InvalidId(value));
        }
        self.metrics.db_call(op).await;
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE {column} = $1");
        let row = sqlx::query_as::<_, ArticleRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!(operation = op, error = %e, "article lookup failed");
                e
            })?;
        match row {
            Some(row) => Ok(row.into()),
            None => Err(StoreError::NotFound(format!("{column}={value}"))),
        }
    }
}

#[async_trait]
impl ArticleRepository for PgArticleRepository {
    async fn find_internal_id(&self, external_id: i64) -> Result<Option<i64>, StoreError> {
        let id = sqlx::query_scalar::<_, i64>("SELECT id FROM articles WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn upsert(&self, record: &ArticleRecord) -> Result<Option<Article>, StoreError> {
        let sql = format!(
            "INSERT INTO articles (id, external_id, title, description, date, body, summary,
                                   lead_media, tags, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), now())
             ON CONFLICT (external_id) DO UPDATE SET
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                date = EXCLUDED.date,
                body = EXCLUDED.body,
                summary = EXCLUDED.summary,
                lead_media = EXCLUDED.lead_media,
                tags = EXCLUDED.tags,
                updated_at = now()
             RETURNING {ARTICLE_COLUMNS}"
        );
        let c = &record.content;
        let row = sqlx::query_as::<_, ArticleRow>(&sql)
            .bind(record.id)
            .bind(record.external_id)
            .bind(&c.title)
            .bind(&c.description)
            .bind(&c.date)
            .bind(&c.body)
            .bind(&c.summary)
            .bind(Json(c.lead_media.clone()))
            .bind(Json(c.tags.clone()))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Article::from))
    }
}

#[async_trait]
impl ArticleReader for PgArticleRepository {
    async fn get_by_id(&self, id: i64) -> Result<Article, StoreError> {
        self.fetch_one_where("get_by_id", "id", id).await
    }

    async fn get_by_external_id(&self, external_id: i64) -> Result<Article, StoreError> {
        self.fetch_one_where("get_by_external_id", "external_id", external_id).await
    }

    async fn list_page(&self, request: PageRequest) -> Result<StoredArticlePage, StoreError> {
        self.metrics.db_call("list").await;
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY date DESC, id DESC LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query_as::<_, ArticleRow>(&sql)
            .bind(request.page_size as i64)
            .bind(request.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(StoredArticlePage {
            page_info: request.page_info(total.max(0) as u64),
            content: rows.into_iter().map(Article::from).collect(),
        })
    }
}
