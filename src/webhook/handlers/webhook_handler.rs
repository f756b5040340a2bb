use crate::models::whatsapp::WebhookVerification;
use crate::processing::message_processor::process_webhook;
use crate::state::AppState;
use crate::webhook::normalizer::is_meta_shape;
use crate::webhook::signature::{verify_meta_signature, META_SIGNATURE_HEADER};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// GET handshake. Meta expects the challenge echoed back; any other caller gets `OK`.
pub async fn get_webhook(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WebhookVerification>,
) -> Response {
    let verify_token = state.config.whatsapp.verify_token.as_str();

    if params.hub_mode.as_deref() == Some("subscribe")
        && !verify_token.is_empty()
        && params.hub_verify_token.as_deref() == Some(verify_token)
    {
        if let Some(challenge) = params.hub_challenge {
            info!("✅ Webhook verification successful");
            return (StatusCode::OK, challenge).into_response();
        }
    }

    if params.hub_mode.is_some() {
        warn!("⚠️ Webhook verification failed. Parameters did not match.");
    }
    (StatusCode::OK, "OK").into_response()
}

fn acknowledged() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// POST delivery from either provider.
///
/// Always acknowledges with 200 so providers never retry on our errors; the
/// message itself is processed on a spawned task.
pub async fn post_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "📭 Undecodable webhook body acknowledged");
            return acknowledged();
        }
    };

    // Only Meta signs deliveries; Evolution bodies are never checked.
    if let Some(secret) = state.config.whatsapp.app_secret.as_deref() {
        let signature = headers.get(META_SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        if is_meta_shape(&payload) && !verify_meta_signature(secret, &body, signature) {
            warn!("🚫 Invalid webhook signature, ignoring delivery");
            return acknowledged();
        }
    }

    debug!("📥 Webhook received, processing in background...");
    tokio::spawn(async move {
        process_webhook(state, payload).await;
    });

    acknowledged()
}
