pub mod error;
pub mod health;
pub mod jobs;

use axum::extract::DefaultBodyLimit;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

use crate::app_state::AppState;

/// Health and job API routes with state applied.
pub fn api_router(state: AppState) -> Router {
    let upload_limit = state.max_upload_bytes;

    let upload = Router::new()
        .route("/api/v1/jobs/upload", post(jobs::upload_job))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(upload_limit));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/models", get(jobs::list_models))
        .route("/api/v1/jobs", post(jobs::submit_job))
        .route("/api/v1/jobs/{job_id}", get(jobs::get_job_status))
        .route("/api/v1/jobs/{job_id}/events", get(jobs::job_events))
        .route(
            "/api/v1/jobs/{job_id}/artifacts/{artifact}",
            get(jobs::get_artifact),
        )
        .merge(upload)
        .with_state(state)
}

/// Prometheus scrape endpoint in text exposition format.
pub async fn prometheus_metrics(
    axum::extract::State(handle): axum::extract::State<Arc<PrometheusHandle>>,
) -> impl IntoResponse {
    handle.render()
}
