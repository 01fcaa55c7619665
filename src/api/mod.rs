use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use subtle::ConstantTimeEq;

use crate::errors::AppError;
use crate::AppState;

pub mod handlers;

/// Build the full application router.
///
/// `/health`, `/metrics` and `/admin/*` pass through the admission layer
/// untouched; `/admin/*` is guarded by the admin key instead.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .nest("/admin", admin_router(state.clone()))
        .nest("/api", api_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::admission,
        ))
        .with_state(state)
}

/// Routes behind the admission middleware.
fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(handlers::get_status))
        .route("/rate-limit", get(handlers::get_rate_limit_status))
        .route("/test", post(handlers::test_endpoint))
}

/// Key management. All routes are relative, mounted under `/admin`.
fn admin_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/api-keys", post(handlers::create_api_key))
        .route("/api-keys/:key", delete(handlers::deactivate_api_key))
        .route_layer(middleware::from_fn_with_state(state, admin_auth))
}

/// Middleware: validates `X-Admin-Key` (or `Authorization: Bearer`) against the configured admin key.
/// Returns 401 if missing/invalid, 500 if no admin key is configured.
async fn admin_auth(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let Some(expected) = state.config.admin_key.as_deref() else {
        tracing::error!("ADMIN_KEY is not set; refusing admin API call");
        return AppError::Internal(anyhow::anyhow!("admin key not configured")).into_response();
    };

    let provided_key = req
        .headers()
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| t.trim())
        });

    match provided_key {
        Some(k) if bool::from(k.as_bytes().ct_eq(expected.as_bytes())) => next.run(req).await,
        Some(_) => {
            // SECURITY: never log the expected or provided key
            tracing::warn!("admin API: invalid admin key");
            AppError::InvalidAdminKey.into_response()
        }
        None => {
            tracing::warn!("admin API: missing X-Admin-Key header");
            AppError::InvalidAdminKey.into_response()
        }
    }
}
