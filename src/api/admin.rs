// ============================================================================
// ADMIN ENDPOINTS - Conversation maintenance
// ============================================================================
//
// ENDPOINTS:
//   POST /admin/conversations/clear
//     Drops the stored conversation for one contact of one business, so the
//     next message starts a fresh chat.
//     Body: { "business_id": "<tenant user id>", "phone": "+353 87 123 4567" }
//
// SECURITY:
//   - Requires the `x-admin-secret` header (see middleware::admin_auth)
//
// ============================================================================

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use shared::utils::digits_only;
use shared::AppError;
use std::sync::Arc;
use tracing::{error, info};
use validator::Validate;

use crate::cache_key;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ClearConversationRequest {
    #[validate(length(min = 1, max = 64, message = "business_id is required"))]
    pub business_id: String,

    #[validate(length(min = 1, max = 32, message = "phone is required"))]
    pub phone: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearConversationResponse {
    pub status: String,
    pub cleared: bool,
}

/// POST /admin/conversations/clear
pub async fn clear_conversation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClearConversationRequest>,
) -> Result<Json<ClearConversationResponse>, AppError> {
    req.validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let business_id = req.business_id.trim();
    if digits_only(&req.phone).is_empty() {
        return Err(AppError::validation("phone must contain digits"));
    }

    let key = cache_key::conversation(business_id, &req.phone);
    let cleared = state.conversations.clear(&key).await.map_err(|e| {
        error!(business_id = %business_id, error = %e, "❌ Failed to clear conversation");
        AppError::service_unavailable("conversation store")
    })?;

    info!(business_id = %business_id, cleared, "🧹 Conversation cleared by admin");
    Ok(Json(ClearConversationResponse {
        status: "ok".to_string(),
        cleared,
    }))
}

#[cfg(test)]
mod tests {
    use crate::cache_key;
    use crate::create_app_router;
    use crate::models::ConversationTurn;
    use crate::test_support::in_memory_state;
    use axum::{
        body::Body,
        http::{self, Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    fn clear_request(secret: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method(http::Method::POST)
            .uri("/admin/conversations/clear")
            .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref());
        if let Some(secret) = secret {
            builder = builder.header("x-admin-secret", secret);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_clear_requires_admin_secret() {
        let app = create_app_router(Arc::new(in_memory_state()));
        let body = r#"{"business_id":"t1","phone":"353871234567"}"#;

        let response = app.clone().oneshot(clear_request(None, body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.oneshot(clear_request(Some("wrong"), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_clear_removes_stored_conversation() {
        let state = Arc::new(in_memory_state());
        let key = cache_key::conversation("t1", "353871234567");
        state
            .conversations
            .append(&key, vec![ConversationTurn::user("olá")])
            .await
            .unwrap();
        let app = create_app_router(state.clone());

        let body = r#"{"business_id":"t1","phone":"+353 87 123 4567"}"#;
        let response = app.clone().oneshot(clear_request(Some("admin-secret"), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({"status": "ok", "cleared": true}));
        assert!(state.conversations.read(&key).await.unwrap().is_empty());

        // Nothing left to clear the second time.
        let response = app.oneshot(clear_request(Some("admin-secret"), body)).await.unwrap();
        assert_eq!(json_body(response).await["cleared"], false);
    }

    #[tokio::test]
    async fn test_clear_rejects_empty_fields() {
        let app = create_app_router(Arc::new(in_memory_state()));

        let response = app
            .oneshot(clear_request(Some("admin-secret"), r#"{"business_id":"","phone":"abc"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
