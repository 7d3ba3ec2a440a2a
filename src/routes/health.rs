use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub dataset: ComponentHealth,
    pub inference: ComponentHealth,
    pub workers: WorkerHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct WorkerHealth {
    pub enabled: bool,
    pub connected: usize,
}

impl ComponentHealth {
    fn ok(start: std::time::Instant) -> Self {
        Self {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        }
    }

    fn error() -> Self {
        Self {
            status: "error".to_string(),
            latency_ms: None,
        }
    }
}

/// GET /health - dependency status.
///
/// Only a failing dataset store makes the service unhealthy. An unreachable
/// inference endpoint still leaves workers and the degraded answer.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();
    let dataset_check = match state.dataset.health_check().await {
        Ok(()) => ComponentHealth::ok(start),
        Err(e) => {
            tracing::warn!(error = %e, backend = state.dataset.backend(), "Dataset health check failed");
            ComponentHealth::error()
        }
    };

    let inference_start = std::time::Instant::now();
    let inference_check = if state.inference.is_available().await {
        ComponentHealth::ok(inference_start)
    } else {
        ComponentHealth::error()
    };

    let workers = WorkerHealth {
        enabled: state.broker.is_enabled(),
        connected: state.broker.connection_count().await,
    };

    let healthy = dataset_check.status == "ok";
    let all_ok = healthy && inference_check.status == "ok";
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            dataset: dataset_check,
            inference: inference_check,
            workers,
        },
    };

    (status_code, Json(response))
}
