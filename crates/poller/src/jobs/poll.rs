//! Poll-and-publish job.
//!
//! Each run fetches one page of the upstream feed, mirrors the raw body to
//! the status subject and publishes the re-serialized article list to the
//! articles subject. The page cursor only advances after the article list
//! has been published; it wraps to page 0 once it reaches the largest page
//! count seen so far.

use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sportstream_bus::MessagePublisher;
use sportstream_core::config::SubjectsConfig;
use sportstream_core::{ArticlePage, Metrics};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::JobConfig;
use crate::error::{ConfigError, PollError};
use crate::jobs::Job;
use crate::retry::{ConstantBackoff, RetryPolicy};
use crate::upstream::{UpstreamClient, UPSTREAM_DESTINATION};

// ── Cursor and state ─────────────────────────────────────────────────

/// Position in the upstream feed. In-memory only; a restart begins at page 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageCursor {
    pub current_page: u32,
    pub max_pages: u32,
    pub last_fetch_time: Option<DateTime<Utc>>,
}

impl PageCursor {
    /// Raise the known page count; it never shrinks.
    pub fn observe_num_pages(&mut self, num_pages: u32) {
        self.max_pages = self.max_pages.max(num_pages);
    }

    pub fn advance(&mut self, fetched_at: DateTime<Utc>) {
        self.current_page += 1;
        if self.current_page >= self.max_pages {
            self.current_page = 0;
        }
        self.last_fetch_time = Some(fetched_at);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Failed,
}

/// Point-in-time view of the job for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollJobSnapshot {
    pub state: RunState,
    #[serde(flatten)]
    pub cursor: PageCursor,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub page: u32,
    pub next_page: u32,
    pub max_pages: u32,
    pub articles: usize,
    pub attempts: u32,
}

// ── Job ──────────────────────────────────────────────────────────────

pub struct PollJob<P> {
    name: String,
    tags: Vec<String>,
    upstream: UpstreamClient,
    retry: RetryPolicy<ConstantBackoff>,
    publisher: P,
    subjects: SubjectsConfig,
    metrics: Metrics,
    /// Held for a whole run; serializes runs of this job.
    cursor: Mutex<PageCursor>,
    /// Published at every state transition; only ever held briefly.
    status: Mutex<PollJobSnapshot>,
}

impl<P: MessagePublisher> PollJob<P> {
    pub fn new(
        name: impl Into<String>,
        upstream: UpstreamClient,
        retry: RetryPolicy<ConstantBackoff>,
        publisher: P,
        subjects: SubjectsConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            upstream,
            retry,
            publisher,
            subjects,
            metrics,
            cursor: Mutex::new(PageCursor::default()),
            status: Mutex::new(PollJobSnapshot::default()),
        }
    }

    /// Build from a job entry of the jobs file.
    pub fn from_config(
        name: &str,
        config: &JobConfig,
        publisher: P,
        subjects: SubjectsConfig,
        metrics: Metrics,
    ) -> Result<Self, ConfigError> {
        let upstream = UpstreamClient::new(config.external_address.clone())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let retry = RetryPolicy::constant(config.retry.max_attempts, config.retry.delay()?);
        let mut job = Self::new(name, upstream, retry, publisher, subjects, metrics);
        job.tags = config.tags.clone();
        Ok(job)
    }

    /// Never waits on an in-flight run.
    pub async fn snapshot(&self) -> PollJobSnapshot {
        self.status.lock().await.clone()
    }

    async fn set_status(&self, state: RunState, cursor: &PageCursor) {
        *self.status.lock().await = PollJobSnapshot {
            state,
            cursor: cursor.clone(),
        };
    }

    /// Run one poll. Concurrent calls are serialized on the cursor lock.
    pub async fn poll(&self) -> Result<RunReport, PollError> {
        self.metrics.report_job_run(&self.name).await;

        let mut cursor = self.cursor.lock().await;
        self.set_status(RunState::Running, &cursor).await;

        let outcome = self.poll_page(&mut cursor).await;
        match &outcome {
            Ok(report) => {
                self.set_status(RunState::Idle, &cursor).await;
                info!(
                    job = %self.name,
                    page = report.page,
                    next_page = report.next_page,
                    max_pages = report.max_pages,
                    articles = report.articles,
                    "poll run completed"
                );
            }
            Err(e) => {
                self.set_status(RunState::Failed, &cursor).await;
                error!(job = %self.name, page = cursor.current_page, error = %e, "poll run failed");
                self.metrics.job_error(&self.name, e.reason()).await;
            }
        }
        outcome
    }

    async fn poll_page(&self, cursor: &mut PageCursor) -> Result<RunReport, PollError> {
        let page = cursor.current_page;
        let url = self.upstream.page_url(page);

        let upstream = &self.upstream;
        let url_ref = url.as_str();
        let started = Instant::now();
        let fetched = self.retry.run(move || upstream.fetch(url_ref)).await;

        let status = match &fetched {
            Ok(_) => "200".to_string(),
            Err(e) => e.last_error.status_label(),
        };
        self.metrics
            .outgoing_http(UPSTREAM_DESTINATION, "GET", &status, started.elapsed())
            .await;

        let fetched = fetched.map_err(|e| PollError::Fetch {
            attempts: e.attempts,
            source: e.last_error,
        })?;
        if fetched.attempts > 1 {
            info!(job = %self.name, url = %url, attempts = fetched.attempts, "upstream fetch succeeded after retries");
        }
        let body = fetched.value;

        let decoded: ArticlePage = serde_json::from_slice(&body).map_err(PollError::Decode)?;
        cursor.observe_num_pages(decoded.page_info.num_pages);

        if let Err(e) = self.publisher.publish(&self.subjects.raw_status, body.clone()).await {
            warn!(job = %self.name, subject = %self.subjects.raw_status, error = %e, "raw page mirror publish failed");
        }

        let batch = serde_json::to_vec(&decoded.content).map_err(PollError::Encode)?;
        self.publisher
            .publish(&self.subjects.articles, Bytes::from(batch))
            .await
            .map_err(PollError::Publish)?;

        cursor.advance(Utc::now());

        Ok(RunReport {
            page,
            next_page: cursor.current_page,
            max_pages: cursor.max_pages,
            articles: decoded.content.len(),
            attempts: fetched.attempts,
        })
    }
}

#[async_trait]
impl<P: MessagePublisher> Job for PollJob<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> Vec<String> {
        self.tags.clone()
    }

    async fn run(&self) {
        // Already logged at error level and counted inside `poll`.
        if let Err(e) = self.poll().await {
            debug!(job = %self.name, reason = e.reason(), "scheduled run ended with error");
        }
    }
}
