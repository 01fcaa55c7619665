use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};

use super::metrics::{self, Outcome};
use crate::errors::AppError;
use crate::models::QuotaSnapshot;
use crate::registry::RegistryError;
use crate::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Paths that skip admission entirely.
pub fn is_bypassed(path: &str) -> bool {
    matches!(path, "/health" | "/metrics") || path == "/admin" || path.starts_with("/admin/")
}

/// API key from `X-API-Key`, else from `Authorization: Bearer <key>`.
/// Blank values and any other scheme count as no key.
pub fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty());

    from_header
        .or_else(|| {
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|k| !k.is_empty())
        })
        .map(String::from)
}

pub fn apply_quota_headers(headers: &mut HeaderMap, snapshot: &QuotaSnapshot) {
    let reset = snapshot
        .reset_time
        .to_rfc3339_opts(SecondsFormat::Secs, true);
    for (name, value) in [
        (RATE_LIMIT_LIMIT_HEADER, snapshot.limit.to_string()),
        (RATE_LIMIT_REMAINING_HEADER, snapshot.remaining.to_string()),
        (RATE_LIMIT_RESET_HEADER, reset),
    ] {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

/// Middleware: authenticate the API key and charge one request against its quota.
///
/// Unknown, inactive and unresolvable keys all get the same 401. A counter
/// store failure rejects the request with 503. Quota headers are set on
/// every response once the key has resolved, including the 429.
pub async fn admission(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    if is_bypassed(req.uri().path()) {
        metrics::record(Outcome::Bypassed);
        return next.run(req).await;
    }

    let Some(api_key) = extract_api_key(req.headers()) else {
        metrics::record(Outcome::MissingCredential);
        return AppError::ApiKeyRequired.into_response();
    };

    let timeout = state.config.backend_timeout();
    let resolved = tokio::time::timeout(timeout, state.registry.resolve(&api_key)).await;
    let credential = match resolved {
        Ok(Ok(credential)) => credential,
        Ok(Err(e)) => {
            let outcome = match &e {
                RegistryError::NotFound => Outcome::UnknownCredential,
                RegistryError::Inactive => Outcome::InactiveCredential,
                RegistryError::Unavailable(_) => Outcome::RegistryUnavailable,
            };
            if outcome == Outcome::RegistryUnavailable {
                tracing::error!(error = %e, "api key lookup failed");
            } else {
                tracing::debug!(reason = outcome.as_str(), "api key rejected");
            }
            metrics::record(outcome);
            return AppError::InvalidApiKey.into_response();
        }
        Err(_) => {
            tracing::error!(?timeout, "api key lookup timed out");
            metrics::record(Outcome::RegistryUnavailable);
            return AppError::InvalidApiKey.into_response();
        }
    };

    let snapshot = match state.engine.evaluate_and_consume(&credential).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!(key_id = %credential.id, error = %e, "rate limit check failed");
            metrics::record(Outcome::QuotaCheckFailed);
            return AppError::QuotaCheckFailed.into_response();
        }
    };

    let mut response = if snapshot.allowed {
        metrics::record(Outcome::Admitted);
        req.extensions_mut().insert(credential);
        next.run(req).await
    } else {
        let retry_after = snapshot.retry_after_secs(Utc::now());
        tracing::warn!(
            rate_limit = true,
            key_id = %credential.id,
            limit = snapshot.limit,
            retry_after,
            "rate limit exceeded"
        );
        metrics::record(Outcome::QuotaExceeded);
        AppError::RateLimitExceeded { retry_after }.into_response()
    };

    apply_quota_headers(response.headers_mut(), &snapshot);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_bypass_paths() {
        assert!(is_bypassed("/health"));
        assert!(is_bypassed("/metrics"));
        assert!(is_bypassed("/admin"));
        assert!(is_bypassed("/admin/api-keys"));
        assert!(!is_bypassed("/administrator"));
        assert!(!is_bypassed("/api/test"));
        assert!(!is_bypassed("/health/deep"));
    }

    #[test]
    fn test_primary_header_wins() {
        let h = headers(&[("x-api-key", "ak_primary"), ("authorization", "Bearer ak_fallback")]);
        assert_eq!(extract_api_key(&h).as_deref(), Some("ak_primary"));
    }

    #[test]
    fn test_bearer_fallback() {
        let h = headers(&[("authorization", "Bearer  ak_fallback ")]);
        assert_eq!(extract_api_key(&h).as_deref(), Some("ak_fallback"));
    }

    #[test]
    fn test_blank_primary_falls_back_to_bearer() {
        let h = headers(&[("x-api-key", "  "), ("authorization", "Bearer ak_fallback")]);
        assert_eq!(extract_api_key(&h).as_deref(), Some("ak_fallback"));
    }

    #[test]
    fn test_malformed_or_empty_bearer_is_absent() {
        assert_eq!(extract_api_key(&headers(&[])), None);
        assert_eq!(extract_api_key(&headers(&[("authorization", "Basic abc")])), None);
        assert_eq!(extract_api_key(&headers(&[("authorization", "Bearer ")])), None);
        assert_eq!(extract_api_key(&headers(&[("authorization", "Bearer")])), None);
        assert_eq!(extract_api_key(&headers(&[("authorization", "ak_no_scheme")])), None);
    }

    #[test]
    fn test_quota_headers_rendered() {
        let reset_time = chrono::DateTime::parse_from_rfc3339("2026-01-02T03:04:05.678Z")
            .unwrap()
            .with_timezone(&Utc);
        let snapshot = QuotaSnapshot {
            allowed: true,
            remaining: 4,
            limit: 5,
            reset_time,
        };
        let mut h = HeaderMap::new();
        apply_quota_headers(&mut h, &snapshot);
        assert_eq!(h[RATE_LIMIT_LIMIT_HEADER], "5");
        assert_eq!(h[RATE_LIMIT_REMAINING_HEADER], "4");
        assert_eq!(h[RATE_LIMIT_RESET_HEADER], "2026-01-02T03:04:05Z");
    }
}
