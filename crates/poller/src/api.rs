//! Admin HTTP surface for the poller: health, metrics and job control.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use sportstream_core::metrics::MetricsSnapshot;
use sportstream_core::Metrics;
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::scheduler::{JobInfo, Scheduler};

#[derive(Clone)]
pub struct AdminState {
    pub scheduler: Arc<Scheduler>,
    pub metrics: Metrics,
}

pub fn admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}/run", post(run_job))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn metrics(State(state): State<AdminState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot().await)
}

async fn list_jobs(
    State(state): State<AdminState>,
) -> Result<Json<Vec<JobInfo>>, (StatusCode, String)> {
    state.scheduler.list_jobs().map(Json).map_err(scheduler_error)
}

/// Fire a job immediately. The run proceeds in the background.
async fn run_job(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<JobInfo>), (StatusCode, String)> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("Invalid job id '{}'", id)))?;
    let info = state.scheduler.run_now(id).map_err(scheduler_error)?;
    Ok((StatusCode::ACCEPTED, Json(info)))
}

fn scheduler_error(e: SchedulerError) -> (StatusCode, String) {
    match e {
        SchedulerError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        other => {
            warn!(error = %other, "scheduler request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::config::{JobConfig, JobKind};
    use crate::jobs::Job;

    struct NoopJob;

    #[async_trait]
    impl Job for NoopJob {
        fn name(&self) -> &str {
            "noop"
        }

        async fn run(&self) {}
    }

    fn hourly() -> JobConfig {
        JobConfig {
            enabled: true,
            kind: JobKind::Duration,
            interval: "1h".to_string(),
            use_seconds: false,
            external_address: "http://localhost".to_string(),
            retry: Default::default(),
            tags: vec!["test".to_string()],
        }
    }

    fn state(scheduler: Scheduler) -> AdminState {
        AdminState {
            scheduler: Arc::new(scheduler),
            metrics: Metrics::new(),
        }
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = admin_router(state(Scheduler::new()));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("\"ok\""));
    }

    #[tokio::test]
    async fn test_list_jobs_empty_is_not_found() {
        let app = admin_router(state(Scheduler::new()));
        let response = app
            .oneshot(Request::get("/jobs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_jobs() {
        let scheduler = Scheduler::new();
        scheduler.configure(Arc::new(NoopJob), &hourly()).await.unwrap();
        let app = admin_router(state(scheduler));

        let response = app
            .oneshot(Request::get("/jobs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let jobs: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(jobs[0]["name"], "noop");
        assert_eq!(jobs[0]["tags"][0], "test");
    }

    #[tokio::test]
    async fn test_run_job() {
        let scheduler = Scheduler::new();
        let id = scheduler
            .configure(Arc::new(NoopJob), &hourly())
            .await
            .unwrap()
            .unwrap();
        let app = admin_router(state(scheduler));

        let response = app
            .oneshot(
                Request::post(format!("/jobs/{id}/run"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let info: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(!info["last_run"].is_null());
    }

    #[tokio::test]
    async fn test_run_job_bad_id() {
        let app = admin_router(state(Scheduler::new()));
        let response = app
            .oneshot(Request::post("/jobs/not-a-uuid/run").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_run_job_unknown_id() {
        let app = admin_router(state(Scheduler::new()));
        let response = app
            .oneshot(
                Request::post(format!("/jobs/{}/run", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_snapshot() {
        let admin = state(Scheduler::new());
        admin.metrics.report_job_run("poller").await;
        let app = admin_router(admin);

        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("poller"));
    }
}
