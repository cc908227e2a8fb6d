//! Article shapes as they travel through the pipeline: the upstream page
//! envelope, the bus payload, the upsert command and the stored record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Content ───────────────────────────────────────────────────

/// Lead image or video attached to an article.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Media {
    pub id: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub media_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tag {
    pub id: i64,
    pub label: String,
}

/// The content field set shared by every article shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArticleContent {
    pub title: String,
    pub description: String,
    /// Publication date exactly as the upstream formats it.
    pub date: String,
    pub body: String,
    pub summary: String,
    pub lead_media: Media,
    pub tags: Vec<Tag>,
}

// ── Upstream feed ─────────────────────────────────────────────

/// An article as the upstream feed and the articles subject carry it.
/// `id` is the upstream-assigned identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpstreamArticle {
    #[serde(default)]
    pub id: i64,
    #[serde(flatten)]
    pub content: ArticleContent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageInfo {
    pub page: u32,
    pub num_pages: u32,
    pub page_size: u32,
    pub num_entries: u32,
}

/// One page of the upstream feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlePage {
    #[serde(default)]
    pub page_info: PageInfo,
    #[serde(default)]
    pub content: Vec<UpstreamArticle>,
}

// ── Store ─────────────────────────────────────────────────────

/// Write command keyed by the upstream identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpsertArticle {
    #[serde(rename = "externalID")]
    pub external_id: i64,
    #[serde(flatten)]
    pub content: ArticleContent,
}

impl From<UpstreamArticle> for UpsertArticle {
    fn from(article: UpstreamArticle) -> Self {
        Self {
            external_id: article.id,
            content: article.content,
        }
    }
}

/// A persisted article. `id` is assigned once by the sequence allocator
/// and never changes; `external_id` is unique across the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    #[serde(rename = "externalID")]
    pub external_id: i64,
    #[serde(flatten)]
    pub content: ArticleContent,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// A page of stored articles plus the page arithmetic used to produce it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredArticlePage {
    pub page_info: PageInfo,
    pub content: Vec<Article>,
}
