use axum::{extract::DefaultBodyLimit, middleware as axum_middleware, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod cache_key;
pub mod db;
pub mod middleware;
pub mod models;
pub mod monitoring;
pub mod observability;
pub mod optimization;
pub mod processing;
pub mod services;
pub mod state;
pub mod webhook;

#[cfg(test)]
pub(crate) mod test_support;

use api::create_api_router;
use monitoring::endpoints::monitoring_router;
use observability::metrics_middleware;
use state::AppState;
use webhook::create_webhook_router;

/// Provider payloads are small JSON documents
const MAX_WEBHOOK_BODY_BYTES: usize = 1024 * 1024;

pub fn create_app_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        // Webhooks de WhatsApp (Meta y Evolution)
        .merge(create_webhook_router())
        // Endpoints de monitoreo, incluye /metrics de Prometheus
        .merge(monitoring_router())
        // Admin, protegido por x-admin-secret
        .merge(create_api_router(app_state.clone()))
        .with_state(app_state)
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(DefaultBodyLimit::max(MAX_WEBHOOK_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
