use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use shared::AppError;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::state::AppState;

pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

/// Rejects the request with 401 unless `x-admin-secret` equals the configured
/// secret. With no secret configured every admin call is rejected.
pub async fn require_admin_secret(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let authorized: bool = match (
        state.config.app.admin_secret.as_deref(),
        request.headers().get(ADMIN_SECRET_HEADER).and_then(|v| v.to_str().ok()),
    ) {
        (Some(expected), Some(provided)) => expected.as_bytes().ct_eq(provided.as_bytes()).into(),
        _ => false,
    };

    if !authorized {
        warn!(path = %request.uri().path(), "🚫 Admin request rejected");
        return AppError::authentication("invalid admin secret").into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_app_router;
    use crate::test_support::in_memory_state;
    use axum::{
        body::Body,
        http::{self, StatusCode},
    };
    use tower::ServiceExt;

    async fn status_with_secret(secret: &str) -> StatusCode {
        let app = create_app_router(Arc::new(in_memory_state()));
        let request = axum::http::Request::builder()
            .method(http::Method::POST)
            .uri("/admin/conversations/clear")
            .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
            .header(ADMIN_SECRET_HEADER, secret)
            .body(Body::from(r#"{"business_id":"t1","phone":"353871234567"}"#))
            .unwrap();
        app.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_only_exact_secret_is_accepted() {
        assert_eq!(status_with_secret("admin-secret").await, StatusCode::OK);
        assert_eq!(status_with_secret("admin-secreT").await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_with_secret("admin-secre").await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_with_secret("admin-secret!").await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_with_secret("").await, StatusCode::UNAUTHORIZED);
    }
}
