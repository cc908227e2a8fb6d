use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use sportstream_bus::InMemoryBus;
use sportstream_core::config::SubjectsConfig;
use sportstream_core::metrics::JOB_ERRORS_TOTAL;
use sportstream_core::{Metrics, UpstreamArticle};
use sportstream_poller::jobs::poll::RunState;
use sportstream_poller::jobs::{Job, PollJob};
use sportstream_poller::retry::RetryPolicy;
use sportstream_poller::upstream::UpstreamClient;
use sportstream_poller::{JobConfig, JobKind, PollError, RetryConfig, Scheduler};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn page_body(page: u32, num_pages: u32) -> serde_json::Value {
    json!({
        "pageInfo": { "page": page, "numPages": num_pages, "pageSize": 2, "numEntries": num_pages * 2 },
        "content": [
            {
                "id": page * 10 + 1,
                "title": format!("Match report {page}"),
                "description": "Late winner",
                "date": "2024-03-01 19:45:00",
                "body": "<p>Full time.</p>",
                "summary": "A late winner",
                "leadMedia": { "id": 7, "title": "Celebration", "type": "photo" },
                "tags": [{ "id": 1, "label": "Football" }]
            },
            {
                "id": page * 10 + 2,
                "title": format!("Preview {page}"),
                "tags": []
            }
        ]
    })
}

fn job(server: &MockServer, bus: Arc<InMemoryBus>, metrics: Metrics, attempts: u32) -> PollJob<Arc<InMemoryBus>> {
    PollJob::new(
        "poller",
        UpstreamClient::new(server.uri()).unwrap(),
        RetryPolicy::constant(attempts, Duration::from_millis(10)),
        bus,
        SubjectsConfig::default(),
        metrics,
    )
}

fn requested_pages(requests: &[wiremock::Request]) -> Vec<String> {
    requests
        .iter()
        .filter_map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "page")
                .map(|(_, v)| v.into_owned())
        })
        .collect()
}

#[tokio::test]
async fn test_cursor_walks_and_wraps() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("pageSize", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(0, 3)))
        .mount(&server)
        .await;

    let bus = Arc::new(InMemoryBus::new());
    let job = job(&server, bus.clone(), Metrics::new(), 1);

    let mut next_pages = Vec::new();
    for _ in 0..4 {
        next_pages.push(job.poll().await.unwrap().next_page);
    }
    assert_eq!(next_pages, vec![1, 2, 0, 1]);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requested_pages(&requests), vec!["0", "1", "2", "0"]);

    let snapshot = job.snapshot().await;
    assert_eq!(snapshot.state, RunState::Idle);
    assert_eq!(snapshot.cursor.max_pages, 3);
    assert!(snapshot.cursor.last_fetch_time.is_some());
}

#[tokio::test]
async fn test_publishes_raw_body_and_article_batch() {
    let server = MockServer::start().await;
    let body = page_body(0, 1);
    Mock::given(method("GET"))
        .and(query_param("page", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
        .mount(&server)
        .await;

    let bus = Arc::new(InMemoryBus::new());
    let subjects = SubjectsConfig::default();
    let report = job(&server, bus.clone(), Metrics::new(), 1).poll().await.unwrap();
    assert_eq!(report.articles, 2);
    assert_eq!(report.attempts, 1);

    let raw = bus.published(&subjects.raw_status);
    assert_eq!(raw.len(), 1);
    let mirrored: serde_json::Value = serde_json::from_slice(&raw[0]).unwrap();
    assert_eq!(mirrored, body);

    let batches = bus.published(&subjects.articles);
    assert_eq!(batches.len(), 1);
    let articles: Vec<UpstreamArticle> = serde_json::from_slice(&batches[0]).unwrap();
    assert_eq!(articles.len(), 2);
    assert_eq!(articles[0].id, 1);
    assert_eq!(articles[0].content.lead_media.media_type, "photo");
    assert_eq!(articles[1].content.title, "Preview 0");
}

#[tokio::test]
async fn test_non_200_is_retried_and_cursor_holds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let bus = Arc::new(InMemoryBus::new());
    let metrics = Metrics::new();
    let job = job(&server, bus.clone(), metrics.clone(), 3);

    let err = job.poll().await.unwrap_err();
    assert!(matches!(err, PollError::Fetch { attempts: 3, .. }));

    let snapshot = job.snapshot().await;
    assert_eq!(snapshot.state, RunState::Failed);
    assert_eq!(snapshot.cursor.current_page, 0);
    assert!(snapshot.cursor.last_fetch_time.is_none());
    assert!(bus.published(&SubjectsConfig::default().articles).is_empty());

    let snap = metrics.snapshot().await;
    assert_eq!(
        snap.counter(JOB_ERRORS_TOTAL, &[("job", "poller"), ("reason", "fetch_error")]),
        1
    );
    server.verify().await;
}

#[tokio::test]
async fn test_recovers_within_retry_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(0, 2)))
        .mount(&server)
        .await;

    let bus = Arc::new(InMemoryBus::new());
    let report = job(&server, bus, Metrics::new(), 3).poll().await.unwrap();
    assert_eq!(report.attempts, 2);
    assert_eq!(report.next_page, 1);
}

#[tokio::test]
async fn test_undecodable_page_does_not_advance() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let bus = Arc::new(InMemoryBus::new());
    let job = job(&server, bus.clone(), Metrics::new(), 3);

    let err = job.poll().await.unwrap_err();
    assert!(matches!(err, PollError::Decode(_)));
    assert_eq!(job.snapshot().await.cursor.current_page, 0);
    assert!(bus.published(&SubjectsConfig::default().raw_status).is_empty());
    server.verify().await;
}

#[tokio::test]
async fn test_articles_publish_failure_does_not_advance() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(0, 3)))
        .mount(&server)
        .await;

    let bus = Arc::new(InMemoryBus::new());
    let subjects = SubjectsConfig::default();
    bus.fail_publishes_to(&subjects.articles);
    let job = job(&server, bus.clone(), Metrics::new(), 1);

    let err = job.poll().await.unwrap_err();
    assert!(matches!(err, PollError::Publish(_)));

    let snapshot = job.snapshot().await;
    assert_eq!(snapshot.state, RunState::Failed);
    assert_eq!(snapshot.cursor.current_page, 0);
    // The page count is learned even though the run failed.
    assert_eq!(snapshot.cursor.max_pages, 3);

    bus.clear_publish_failures();
    let report = job.poll().await.unwrap();
    assert_eq!(report.page, 0);
    assert_eq!(job.snapshot().await.state, RunState::Idle);
}

#[tokio::test]
async fn test_raw_mirror_failure_does_not_fail_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(0, 2)))
        .mount(&server)
        .await;

    let bus = Arc::new(InMemoryBus::new());
    let subjects = SubjectsConfig::default();
    bus.fail_publishes_to(&subjects.raw_status);

    let report = job(&server, bus.clone(), Metrics::new(), 1).poll().await.unwrap();
    assert_eq!(report.next_page, 1);
    assert_eq!(bus.published(&subjects.articles).len(), 1);
}

async fn slow_feed(delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_body(0, 10))
                .set_delay(delay),
        )
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_snapshot_reports_running_during_a_run() {
    let server = slow_feed(Duration::from_millis(800)).await;
    let job = Arc::new(job(&server, Arc::new(InMemoryBus::new()), Metrics::new(), 1));

    let run = {
        let job = Arc::clone(&job);
        tokio::spawn(async move { job.poll().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let snapshot = tokio::time::timeout(Duration::from_millis(300), job.snapshot())
        .await
        .expect("snapshot must not wait for the run");
    assert_eq!(snapshot.state, RunState::Running);
    assert_eq!(snapshot.cursor.current_page, 0);

    run.await.unwrap().unwrap();
    let snapshot = job.snapshot().await;
    assert_eq!(snapshot.state, RunState::Idle);
    assert_eq!(snapshot.cursor.current_page, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_polls_are_serialized() {
    let delay = Duration::from_millis(200);
    let server = slow_feed(delay).await;
    let job = Arc::new(job(&server, Arc::new(InMemoryBus::new()), Metrics::new(), 1));

    let started = Instant::now();
    let runs: Vec<_> = (0..4)
        .map(|_| {
            let job = Arc::clone(&job);
            tokio::spawn(async move { job.poll().await })
        })
        .collect();

    let mut pages = Vec::new();
    for run in runs {
        pages.push(run.await.unwrap().unwrap().page);
    }
    pages.sort_unstable();
    assert_eq!(pages, vec![0, 1, 2, 3]);
    // Runs never overlap, so the upstream delays add up.
    assert!(started.elapsed() >= delay * 4);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requested_pages(&requests), vec!["0", "1", "2", "3"]);
    assert_eq!(job.snapshot().await.cursor.current_page, 4);
}

#[tokio::test]
async fn test_run_now_during_scheduled_run_waits_its_turn() {
    let server = slow_feed(Duration::from_millis(500)).await;
    let bus = Arc::new(InMemoryBus::new());
    let job = Arc::new(job(&server, bus.clone(), Metrics::new(), 1));

    let scheduler = Scheduler::new();
    let config = JobConfig {
        enabled: true,
        kind: JobKind::Duration,
        interval: "1s".to_string(),
        use_seconds: false,
        external_address: server.uri(),
        retry: RetryConfig::default(),
        tags: Vec::new(),
    };
    let id = scheduler.configure(job.clone(), &config).await.unwrap().unwrap();
    scheduler.start().await.unwrap();

    // The first tick fires at 1s and is still waiting on upstream at 1.2s.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(job.snapshot().await.state, RunState::Running);
    scheduler.run_now(id).unwrap();
    scheduler.shutdown().await.unwrap();

    let articles = SubjectsConfig::default().articles;
    tokio::time::timeout(Duration::from_secs(5), async {
        while bus.published(&articles).len() < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("both runs should publish");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requested_pages(&requests), vec!["0", "1"]);
    let snapshot = job.snapshot().await;
    assert_eq!(snapshot.state, RunState::Idle);
    assert_eq!(snapshot.cursor.current_page, 2);
}

#[tokio::test]
async fn test_scheduled_run_records_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let metrics = Metrics::new();
    let job = job(&server, Arc::new(InMemoryBus::new()), metrics.clone(), 2);
    job.run().await;

    assert_eq!(job.snapshot().await.state, RunState::Failed);
    let snap = metrics.snapshot().await;
    assert_eq!(
        snap.counter(JOB_ERRORS_TOTAL, &[("job", "poller"), ("reason", "fetch_error")]),
        1
    );
}
