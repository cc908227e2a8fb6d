//! Side-channel metrics shared by the poller and the worker.
//!
//! Counters and duration summaries keyed by metric name plus label set.
//! Recording never fails and never influences the caller's control flow.
//! A JSON snapshot is exposed through the poller's `GET /metrics`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;

// ── Metric names ─────────────────────────────────────────────────────

pub const JOB_RUNS_TOTAL: &str = "scheduler_job_runs_total";
pub const JOB_ERRORS_TOTAL: &str = "scheduler_job_errors_total";
pub const HTTP_CLIENT_REQUESTS_TOTAL: &str = "http_client_requests_total";
pub const HTTP_CLIENT_DURATION: &str = "http_client_request_duration_seconds";
pub const DB_CALLS_TOTAL: &str = "db_calls_total";
pub const DB_ERRORS_TOTAL: &str = "db_errors_total";
pub const CONSUMER_MESSAGES_TOTAL: &str = "consumer_messages_total";
pub const CONSUMER_FAILURES_TOTAL: &str = "consumer_failures_total";
pub const BUS_CONNECTION_EVENTS_TOTAL: &str = "bus_connection_events_total";

// ── Keys and samples ─────────────────────────────────────────────────

type Labels = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct MetricKey {
    name: &'static str,
    labels: Labels,
}

impl MetricKey {
    fn new(name: &'static str, labels: &[(&str, &str)]) -> Self {
        Self {
            name,
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Running count/sum/max of observed durations.
#[derive(Debug, Clone, Copy, Default)]
struct DurationStats {
    count: u64,
    sum: Duration,
    max: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct CounterSample {
    pub name: String,
    pub labels: Labels,
    pub value: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DurationSample {
    pub name: String,
    pub labels: Labels,
    pub count: u64,
    pub sum_secs: f64,
    pub max_secs: f64,
}

/// JSON-serializable view returned by `GET /metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: f64,
    pub counters: Vec<CounterSample>,
    pub durations: Vec<DurationSample>,
}

impl MetricsSnapshot {
    /// Value of a counter with exactly these labels (0 when never recorded).
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .iter()
            .find(|c| c.name == name && labels_match(&c.labels, labels))
            .map(|c| c.value)
            .unwrap_or(0)
    }

    /// Sum of a counter across every label set.
    pub fn counter_total(&self, name: &str) -> u64 {
        self.counters
            .iter()
            .filter(|c| c.name == name)
            .map(|c| c.value)
            .sum()
    }
}

fn labels_match(have: &Labels, want: &[(&str, &str)]) -> bool {
    have.len() == want.len()
        && want
            .iter()
            .all(|(k, v)| have.get(*k).map(String::as_str) == Some(*v))
}

// ── Metrics ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Inner {
    counters: BTreeMap<MetricKey, u64>,
    durations: BTreeMap<MetricKey, DurationStats>,
}

/// Thread-safe metrics collector. Cloning shares the underlying state.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<Mutex<Inner>>,
    started: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            started: Instant::now(),
        }
    }

    /// Increment a counter by one.
    pub async fn increment(&self, name: &'static str, labels: &[(&str, &str)]) {
        let mut inner = self.inner.lock().await;
        *inner.counters.entry(MetricKey::new(name, labels)).or_insert(0) += 1;
    }

    /// Record one duration observation.
    pub async fn observe(&self, name: &'static str, labels: &[(&str, &str)], elapsed: Duration) {
        let mut inner = self.inner.lock().await;
        let stats = inner.durations.entry(MetricKey::new(name, labels)).or_default();
        stats.count += 1;
        stats.sum += elapsed;
        stats.max = stats.max.max(elapsed);
    }

    // ── Scheduler ────────────────────────────────────────────────────

    /// A scheduled job started a run.
    pub async fn report_job_run(&self, job: &str) {
        self.increment(JOB_RUNS_TOTAL, &[("job", job)]).await;
    }

    pub async fn job_error(&self, job: &str, reason: &str) {
        self.increment(JOB_ERRORS_TOTAL, &[("job", job), ("reason", reason)]).await;
    }

    /// Outgoing HTTP call made on behalf of a job. `status` is `"error"` when
    /// no response was received.
    pub async fn outgoing_http(&self, destination: &str, method: &str, status: &str, elapsed: Duration) {
        self.increment(
            HTTP_CLIENT_REQUESTS_TOTAL,
            &[("destination", destination), ("method", method), ("status", status)],
        )
        .await;
        self.observe(
            HTTP_CLIENT_DURATION,
            &[("destination", destination), ("method", method)],
            elapsed,
        )
        .await;
    }

    // ── Store ────────────────────────────────────────────────────────

    pub async fn db_call(&self, operation: &str) {
        self.increment(DB_CALLS_TOTAL, &[("operation", operation)]).await;
    }

    pub async fn db_error(&self, operation: &str, reason: &str) {
        self.increment(DB_ERRORS_TOTAL, &[("operation", operation), ("reason", reason)])
            .await;
    }

    // ── Consumer / bus ───────────────────────────────────────────────

    pub async fn consumer_message(&self, subject: &str) {
        self.increment(CONSUMER_MESSAGES_TOTAL, &[("subject", subject)]).await;
    }

    pub async fn consumer_failure(&self, subject: &str, reason: &str) {
        self.increment(CONSUMER_FAILURES_TOTAL, &[("subject", subject), ("reason", reason)])
            .await;
    }

    pub async fn connection_event(&self, event: &str) {
        self.increment(BUS_CONNECTION_EVENTS_TOTAL, &[("event", event)]).await;
    }

    // ── Snapshot ─────────────────────────────────────────────────────

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock().await;
        MetricsSnapshot {
            uptime_secs: self.started.elapsed().as_secs_f64(),
            counters: inner
                .counters
                .iter()
                .map(|(k, v)| CounterSample {
                    name: k.name.to_string(),
                    labels: k.labels.clone(),
                    value: *v,
                })
                .collect(),
            durations: inner
                .durations
                .iter()
                .map(|(k, s)| DurationSample {
                    name: k.name.to_string(),
                    labels: k.labels.clone(),
                    count: s.count,
                    sum_secs: s.sum.as_secs_f64(),
                    max_secs: s.max.as_secs_f64(),
                })
                .collect(),
        }
    }
}
