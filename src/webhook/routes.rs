use crate::state::AppState;
use axum::{routing::get, Router};
use std::sync::Arc;

use super::handlers::{get_webhook, post_webhook};
use super::stats::get_webhook_stats;

/// WhatsApp webhook endpoints; `/webhookws` is kept as an alias
pub fn create_webhook_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook/whatsapp", get(get_webhook).post(post_webhook))
        .route("/webhookws", get(get_webhook).post(post_webhook))
        .route("/webhook-stats", get(get_webhook_stats))
}
