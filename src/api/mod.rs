pub mod admin;

use axum::{middleware as axum_middleware, routing::post, Router};
use std::sync::Arc;

use crate::middleware::require_admin_secret;
use crate::state::AppState;

/// Admin routes, all behind the shared-secret header check
pub fn create_api_router(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/conversations/clear", post(admin::clear_conversation))
        .route_layer(axum_middleware::from_fn_with_state(app_state, require_admin_secret))
}
