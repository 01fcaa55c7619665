use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Every outcome a caller can observe. Unknown, inactive and unresolvable
/// credentials all collapse into `InvalidApiKey`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("api key required")]
    ApiKeyRequired,

    #[error("invalid api key")]
    InvalidApiKey,

    #[error("quota check failed")]
    QuotaCheckFailed,

    #[error("rate limit exceeded, retry after {retry_after}s")]
    RateLimitExceeded { retry_after: u64 },

    #[error("api key not found")]
    ApiKeyNotFound,

    #[error("invalid admin key")]
    InvalidAdminKey,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::ApiKeyRequired => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "api_key_required",
                "Please provide an API key in the X-API-Key header or Authorization header"
                    .to_string(),
            ),
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid_api_key",
                "The provided API key is invalid or inactive".to_string(),
            ),
            AppError::QuotaCheckFailed => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                "quota_check_failed",
                "Unable to check rate limit".to_string(),
            ),
            AppError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_error",
                "rate_limit_exceeded",
                "You have exceeded your rate limit. Please try again later.".to_string(),
            ),
            AppError::ApiKeyNotFound => (
                StatusCode::NOT_FOUND,
                "not_found_error",
                "api_key_not_found",
                "API key not found".to_string(),
            ),
            AppError::InvalidAdminKey => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid_admin_key",
                "invalid or missing admin key".to_string(),
            ),
            AppError::BadRequest(reason) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "invalid_request",
                reason.clone(),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let mut error = json!({
            "message": msg,
            "type": error_type,
            "code": code,
        });
        if let AppError::RateLimitExceeded { retry_after } = self {
            error["retry_after"] = json!(retry_after);
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();

        if let AppError::RateLimitExceeded { retry_after } = self {
            if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert("retry-after", value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rate_limit_body_carries_retry_after() {
        let response = AppError::RateLimitExceeded { retry_after: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "42");

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "rate_limit_exceeded");
        assert_eq!(body["error"]["retry_after"], 42);
    }

    #[tokio::test]
    async fn test_auth_errors_share_status_and_type() {
        let missing = AppError::ApiKeyRequired.into_response();
        let invalid = AppError::InvalidApiKey.into_response();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(invalid.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(invalid).await;
        assert_eq!(body["error"]["type"], "authentication_error");
        assert_eq!(body["error"]["code"], "invalid_api_key");
        assert!(body["error"].get("retry_after").is_none());
    }

    #[tokio::test]
    async fn test_quota_check_failure_is_service_unavailable() {
        let response = AppError::QuotaCheckFailed.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "quota_check_failed");
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let response = AppError::Internal(anyhow::anyhow!("pool exhausted")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "internal server error");
    }
}
