use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::errors::AppError;
use crate::middleware::metrics::encode_metrics;
use crate::models::CredentialRecord;
use crate::registry::RegistryError;
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    pub rate_limit_requests: Option<i32>,
    pub rate_limit_window_seconds: Option<i32>,
}

#[derive(Serialize)]
pub struct RateLimitInfo {
    pub requests: u64,
    pub window_seconds: u64,
}

#[derive(Serialize)]
pub struct CreateApiKeyResponse {
    pub api_key: String,
    pub id: Uuid,
    pub name: String,
    pub rate_limit: RateLimitInfo,
}

#[derive(Serialize)]
pub struct KeyIdentity {
    pub id: Uuid,
    pub name: String,
}

impl From<&CredentialRecord> for KeyIdentity {
    fn from(record: &CredentialRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
        }
    }
}

#[derive(Deserialize)]
pub struct TestRequest {
    #[serde(default)]
    pub message: String,
}

// ── Health / Metrics ─────────────────────────────────────────

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "keygate",
    }))
}

/// GET /metrics: Prometheus text format
pub async fn metrics() -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}

// ── Key Management ───────────────────────────────────────────

/// POST /admin/api-keys: issue a key; the plaintext is only ever in this response
pub async fn create_api_key(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateApiKeyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateApiKeyResponse>), AppError> {
    let Json(payload) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name is required".into()));
    }

    let issued = state
        .registry
        .provision(
            name,
            payload.rate_limit_requests.unwrap_or(0),
            payload.rate_limit_window_seconds.unwrap_or(0),
        )
        .await
        .map_err(|e| {
            tracing::error!("create_api_key failed: {}", e);
            AppError::Internal(anyhow::anyhow!("failed to create API key"))
        })?;

    let (requests, window) = state.engine.effective_quota(&issued.record);

    Ok((
        StatusCode::CREATED,
        Json(CreateApiKeyResponse {
            api_key: issued.token,
            id: issued.record.id,
            name: issued.record.name,
            rate_limit: RateLimitInfo {
                requests,
                window_seconds: window.as_secs(),
            },
        }),
    ))
}

/// DELETE /admin/api-keys/:key: deactivate a key for good
pub async fn deactivate_api_key(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    match state.registry.revoke(&key).await {
        Ok(()) => Ok(Json(json!({
            "message": "API key deactivated successfully",
        }))),
        Err(RegistryError::NotFound | RegistryError::Inactive) => Err(AppError::ApiKeyNotFound),
        Err(RegistryError::Unavailable(e)) => {
            tracing::error!("deactivate_api_key failed: {}", e);
            Err(AppError::Internal(anyhow::anyhow!("failed to deactivate API key")))
        }
    }
}

// ── Protected Endpoints ──────────────────────────────────────

/// GET /api/status: who am I
pub async fn get_status(Extension(key): Extension<CredentialRecord>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "authenticated",
        "api_key": KeyIdentity::from(&key),
    }))
}

/// GET /api/rate-limit: current quota without spending any
pub async fn get_rate_limit_status(
    State(state): State<Arc<AppState>>,
    Extension(key): Extension<CredentialRecord>,
) -> Json<serde_json::Value> {
    let snapshot = state.engine.peek_status(&key).await;
    Json(json!({
        "rate_limit": {
            "limit": snapshot.limit,
            "remaining": snapshot.remaining,
            "reset_time": snapshot.reset_time,
            "allowed": snapshot.allowed,
        }
    }))
}

/// POST /api/test: echo
pub async fn test_endpoint(
    Extension(key): Extension<CredentialRecord>,
    payload: Result<Json<TestRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(payload) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    Ok(Json(json!({
        "message": "Request processed successfully",
        "echo": payload.message,
        "api_key": KeyIdentity::from(&key),
    })))
}
