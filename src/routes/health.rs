use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::path::Path;

use crate::app_state::AppState;
use crate::services::job_store::JobCounts;
use crate::services::storage::LocalStorage;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
    pub jobs: JobCounts,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub upload_dir: ComponentHealth,
    pub output_dir: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

async fn check_dir(dir: &Path) -> ComponentHealth {
    let start = std::time::Instant::now();
    match LocalStorage::check_writable(dir).await {
        Ok(()) => ComponentHealth {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Directory health check failed");
            ComponentHealth {
                status: "error".to_string(),
                latency_ms: None,
            }
        }
    }
}

/// GET /health: storage checks and job counts.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let upload_check = check_dir(state.storage.upload_dir()).await;
    let output_check = check_dir(state.storage.output_root()).await;

    let all_healthy = upload_check.status == "ok" && output_check.status == "ok";
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            upload_dir: upload_check,
            output_dir: output_check,
        },
        jobs: state.jobs.counts(),
    };

    (status_code, Json(response))
}
