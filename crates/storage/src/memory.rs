//! In-process article store mirroring the PostgreSQL semantics, with
//! failure injection for exercising error paths.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use sportstream_core::pagination::PageRequest;
use sportstream_core::{Article, StoredArticlePage};

use crate::articles::{ArticleReader, ArticleRecord, ArticleRepository};
use crate::error::StoreError;
use crate::sequence::SequenceAllocator;

#[derive(Default)]
struct Failures {
    find: bool,
    sequence: bool,
    upsert_external_ids: HashSet<i64>,
    lose_upserts: bool,
}

/// Articles keyed by external id plus one counter.
#[derive(Default)]
pub struct InMemoryArticleStore {
    rows: Mutex<BTreeMap<i64, Article>>,
    seq: AtomicI64,
    failures: Mutex<Failures>,
    find_calls: AtomicI64,
    closed: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored articles.
    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Last value handed out by the sequence (0 before first use).
    pub fn current_sequence(&self) -> i64 {
        self.seq.load(Ordering::SeqCst)
    }

    pub fn find_calls(&self) -> i64 {
        self.find_calls.load(Ordering::SeqCst)
    }

    /// Insert a stored article directly, bypassing the sequence.
    pub fn seed(&self, article: Article) {
        lock(&self.rows).insert(article.external_id, article);
    }

    pub fn fail_find(&self, fail: bool) {
        lock(&self.failures).find = fail;
    }

    pub fn fail_sequence(&self, fail: bool) {
        lock(&self.failures).sequence = fail;
    }

    /// Fail every upsert for this external id.
    pub fn fail_upsert_for(&self, external_id: i64) {
        lock(&self.failures).upsert_external_ids.insert(external_id);
    }

    /// Make upserts succeed without returning the row.
    pub fn lose_upserts(&self, lose: bool) {
        lock(&self.failures).lose_upserts = lose;
    }

    /// Reject every call, as if the database were down.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SequenceAllocator for InMemoryArticleStore {
    async fn next_id(&self) -> Result<i64, StoreError> {
        self.check_open()?;
        if lock(&self.failures).sequence {
            return Err(StoreError::Unavailable("sequence counter unavailable".to_string()));
        }
        Ok(self.seq.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl ArticleRepository for InMemoryArticleStore {
    async fn find_internal_id(&self, external_id: i64) -> Result<Option<i64>, StoreError> {
        self.check_open()?;
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        if lock(&self.failures).find {
            return Err(StoreError::Unavailable("find failed".to_string()));
        }
        Ok(lock(&self.rows).get(&external_id).map(|a| a.id))
    }

    async fn upsert(&self, record: &ArticleRecord) -> Result<Option<Article>, StoreError> {
        self.check_open()?;
        {
            let failures = lock(&self.failures);
            if failures.upsert_external_ids.contains(&record.external_id) {
                return Err(StoreError::Unavailable(format!(
                    "upsert failed for external id {}",
                    record.external_id
                )));
            }
            if failures.lose_upserts {
                return Ok(None);
            }
        }

        let now = Utc::now();
        let mut rows = lock(&self.rows);
        let stored = rows
            .entry(record.external_id)
            .and_modify(|existing| {
                existing.content = record.content.clone();
                existing.updated_at = now;
            })
            .or_insert_with(|| Article {
                id: record.id,
                external_id: record.external_id,
                content: record.content.clone(),
                created_at: now,
                updated_at: now,
            });
        Ok(Some(stored.clone()))
    }
}

#[async_trait]
impl ArticleReader for InMemoryArticleStore {
    async fn get_by_id(&self, id: i64) -> Result<Article, StoreError> {
        if id <= 0 {
            return Err(StoreError::InvalidId(id));
        }
        self.check_open()?;
        lock(&self.rows)
            .values()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("id={id}")))
    }

    async fn get_by_external_id(&self, external_id: i64) -> Result<Article, StoreError> {
        if external_id <= 0 {
            return Err(StoreError::InvalidId(external_id));
        }
        self.check_open()?;
        lock(&self.rows)
            .get(&external_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("external_id={external_id}")))
    }

    async fn list_page(&self, request: PageRequest) -> Result<StoredArticlePage, StoreError> {
        self.check_open()?;
        let mut all: Vec<Article> = lock(&self.rows).values().cloned().collect();
        all.sort_by(|a, b| b.content.date.cmp(&a.content.date).then(b.id.cmp(&a.id)));
        let total = all.len() as u64;
        let content = all
            .into_iter()
            .skip(request.offset() as usize)
            .take(request.page_size as usize)
            .collect();
        Ok(StoredArticlePage {
            page_info: request.page_info(total),
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use sportstream_core::ArticleContent;

    use super::*;

    fn record(id: i64, external_id: i64, title: &str, date: &str) -> ArticleRecord {
        ArticleRecord {
            id,
            external_id,
            content: ArticleContent {
                title: title.into(),
                date: date.into(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn sequence_is_strictly_increasing() {
        let store = InMemoryArticleStore::new();
        assert_eq!(store.next_id().await.unwrap(), 1);
        assert_eq!(store.next_id().await.unwrap(), 2);
        assert_eq!(store.current_sequence(), 2);
    }

    #[tokio::test]
    async fn upsert_keeps_id_and_created_at() {
        let store = InMemoryArticleStore::new();
        let first = store.upsert(&record(1, 42, "A", "2024-01-01")).await.unwrap().unwrap();
        let second = store.upsert(&record(99, 42, "B", "2024-01-01")).await.unwrap().unwrap();
        assert_eq!(second.id, 1);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.content.title, "B");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn list_page_sorts_by_date_desc() {
        let store = InMemoryArticleStore::new();
        store.upsert(&record(1, 10, "old", "2024-01-01")).await.unwrap();
        store.upsert(&record(2, 11, "new", "2024-03-01")).await.unwrap();
        store.upsert(&record(3, 12, "mid", "2024-02-01")).await.unwrap();

        let page = store.list_page(PageRequest::normalize(1, 2)).await.unwrap();
        let titles: Vec<_> = page.content.iter().map(|a| a.content.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "mid"]);
        assert_eq!(page.page_info.num_pages, 2);
        assert_eq!(page.page_info.num_entries, 3);

        let page = store.list_page(PageRequest::normalize(2, 2)).await.unwrap();
        assert_eq!(page.content.len(), 1);
        assert_eq!(page.content[0].content.title, "old");
    }

    #[tokio::test]
    async fn reads_reject_non_positive_ids() {
        let store = InMemoryArticleStore::new();
        assert!(matches!(store.get_by_id(0).await, Err(StoreError::InvalidId(0))));
        assert!(matches!(
            store.get_by_external_id(-1).await,
            Err(StoreError::InvalidId(-1))
        ));
        assert!(matches!(store.get_by_id(5).await, Err(StoreError::NotFound(_))));
    }
}
