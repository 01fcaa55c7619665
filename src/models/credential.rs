use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A provisioned API key. Only the digest of the token is ever held here.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub name: String,
    /// Requests per window. Zero or negative means "use the process default".
    pub rate_limit_requests: i32,
    /// Window length in seconds. Zero or negative means "use the process default".
    pub rate_limit_window_seconds: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// The explicit limit, if one was configured.
    pub fn limit(&self) -> Option<u64> {
        (self.rate_limit_requests > 0).then_some(self.rate_limit_requests as u64)
    }

    /// The explicit window, if one was configured.
    pub fn window(&self) -> Option<Duration> {
        (self.rate_limit_window_seconds > 0)
            .then(|| Duration::from_secs(self.rate_limit_window_seconds as u64))
    }
}

/// Insert payload for a freshly provisioned key.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub key_hash: String,
    pub name: String,
    pub rate_limit_requests: i32,
    pub rate_limit_window_seconds: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(limit: i32, window: i32) -> CredentialRecord {
        let now = Utc::now();
        CredentialRecord {
            id: Uuid::new_v4(),
            key_hash: "abc".into(),
            name: "test".into(),
            rate_limit_requests: limit,
            rate_limit_window_seconds: window,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_non_positive_quota_is_unset() {
        assert_eq!(record(0, 0).limit(), None);
        assert_eq!(record(-5, -1).window(), None);
        assert_eq!(record(10, 60).limit(), Some(10));
        assert_eq!(record(10, 60).window(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_serialization_omits_key_hash() {
        let json = serde_json::to_value(record(1, 1)).unwrap();
        assert!(json.get("key_hash").is_none());
        assert_eq!(json["name"], "test");
    }
}
