use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use std::sync::Arc;
use tracing::info;

use crate::observability::metrics_handler;
use crate::state::AppState;

use super::check_health;

/// Health, readiness and Prometheus endpoints
pub fn monitoring_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
        .route("/metrics", get(metrics_handler))
}

/// Health check with dependency probes; 503 when any dependency is down
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let start_time = std::time::Instant::now();
    let health = check_health(&state).await;

    info!(
        overall_status = %health.status,
        check_duration_ms = %start_time.elapsed().as_millis(),
        "Health check completed"
    );

    let status_code = if health.status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(health))
}

async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if check_health(&state).await.status == "healthy" {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not Ready")
    }
}

async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, "Alive")
}
