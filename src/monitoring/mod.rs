pub mod endpoints;

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info};

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub services: ServiceHealthStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceHealthStatus {
    pub database: ServiceStatus,
    pub redis: ServiceStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: String,
    pub response_time_ms: Option<u64>,
    pub error: Option<String>,
}

impl ServiceStatus {
    fn healthy(start: Instant) -> Self {
        Self {
            status: "healthy".to_string(),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        }
    }

    fn unhealthy(error: String) -> Self {
        Self {
            status: "unhealthy".to_string(),
            response_time_ms: None,
            error: Some(error),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Probe PostgreSQL and the key-value store.
pub async fn check_health(state: &AppState) -> HealthResponse {
    let database = check_database_health(state).await;
    let redis = check_store_health(state).await;

    let overall_status = if database.is_healthy() && redis.is_healthy() {
        "healthy"
    } else {
        "degraded"
    };

    HealthResponse {
        status: overall_status.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        services: ServiceHealthStatus { database, redis },
    }
}

async fn check_database_health(state: &AppState) -> ServiceStatus {
    let start = Instant::now();
    let Some(pool) = &state.db_pool else {
        // In-memory repositories have nothing to probe.
        return ServiceStatus::healthy(start);
    };

    match sqlx::query("SELECT 1 as health_check").fetch_one(pool).await {
        Ok(_) => ServiceStatus::healthy(start),
        Err(e) => {
            let error_msg = format!("Database connection failed: {}", e);
            error!("❌ Database health check failed: {}", error_msg);
            ServiceStatus::unhealthy(error_msg)
        }
    }
}

async fn check_store_health(state: &AppState) -> ServiceStatus {
    let start = Instant::now();
    match state.kv_store.ping().await {
        Ok(()) => ServiceStatus::healthy(start),
        Err(e) => {
            let error_msg = format!("Redis ping failed: {}", e);
            error!("❌ Redis health check failed: {}", error_msg);
            ServiceStatus::unhealthy(error_msg)
        }
    }
}

pub fn init_monitoring() {
    // Touch the registry so /metrics lists every family from the first scrape.
    lazy_static::initialize(&crate::observability::WEBHOOK_MESSAGES_TOTAL);
    info!("🔍 Monitoring system initialized");
}
