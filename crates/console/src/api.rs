//! HTTP API for health checks, Prometheus metrics and manual job triggers

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use console_lib::{
    health::{ComponentStatus, HealthRegistry},
    metrics::{JobRun, ReplicaJobs, CLEAR_HISTORY_REPLICA_METRICS, COLLECT_REPLICA_METRICS},
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub jobs: ReplicaJobs,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, jobs: ReplicaJobs) -> Self {
        Self {
            health_registry,
            jobs,
        }
    }
}

/// 200 while operational (degraded included), 503 otherwise
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

fn already_running(job: &str) -> Response {
    (
        StatusCode::CONFLICT,
        Json(json!({ "job": job, "status": "running" })),
    )
        .into_response()
}

fn job_failed(job: &str, e: impl std::fmt::Display) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "job": job, "error": e.to_string() })),
    )
        .into_response()
}

async fn collect_replica_metrics(State(state): State<Arc<AppState>>) -> Response {
    info!(job = COLLECT_REPLICA_METRICS, "Manual job trigger");
    match state.jobs.collect_replica_metrics().await {
        Ok(JobRun::Completed(summary)) => (StatusCode::OK, Json(summary)).into_response(),
        Ok(JobRun::AlreadyRunning) => already_running(COLLECT_REPLICA_METRICS),
        Err(e) => job_failed(COLLECT_REPLICA_METRICS, e),
    }
}

async fn clear_history_replica_metrics(State(state): State<Arc<AppState>>) -> Response {
    info!(job = CLEAR_HISTORY_REPLICA_METRICS, "Manual job trigger");
    match state.jobs.clear_history_replica_metrics().await {
        Ok(JobRun::Completed(deleted)) => {
            (StatusCode::OK, Json(json!({ "deleted": deleted }))).into_response()
        }
        Ok(JobRun::AlreadyRunning) => already_running(CLEAR_HISTORY_REPLICA_METRICS),
        Err(e) => job_failed(CLEAR_HISTORY_REPLICA_METRICS, e),
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/jobs/collect-replica-metrics", post(collect_replica_metrics))
        .route(
            "/jobs/clear-history-replica-metrics",
            post(clear_history_replica_metrics),
        )
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
