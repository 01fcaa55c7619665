use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::{generate_token, hash_token, new_credential, CredentialRegistry, ProvisionedKey, RegistryError};
use crate::models::CredentialRecord;

/// In-process registry keyed by token digest. Same semantics as the
/// Postgres registry; used for local runs and tests.
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    records: Arc<DashMap<String, CredentialRecord>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a caller-chosen token. Lets tests use readable keys.
    pub fn insert_with_token(
        &self,
        token: &str,
        name: &str,
        rate_limit_requests: i32,
        rate_limit_window_seconds: i32,
    ) -> CredentialRecord {
        let cred = new_credential(
            hash_token(token),
            name,
            rate_limit_requests,
            rate_limit_window_seconds,
        );
        let now = Utc::now();
        let record = CredentialRecord {
            id: Uuid::new_v4(),
            key_hash: cred.key_hash,
            name: cred.name,
            rate_limit_requests: cred.rate_limit_requests,
            rate_limit_window_seconds: cred.rate_limit_window_seconds,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.records.insert(record.key_hash.clone(), record.clone());
        record
    }
}

#[async_trait]
impl CredentialRegistry for MemoryRegistry {
    async fn resolve(&self, token: &str) -> Result<CredentialRecord, RegistryError> {
        let record = self
            .records
            .get(&hash_token(token))
            .map(|r| r.clone())
            .ok_or(RegistryError::NotFound)?;
        if !record.is_active {
            return Err(RegistryError::Inactive);
        }
        Ok(record)
    }

    async fn provision(
        &self,
        name: &str,
        rate_limit_requests: i32,
        rate_limit_window_seconds: i32,
    ) -> Result<ProvisionedKey, RegistryError> {
        let token = generate_token();
        let record =
            self.insert_with_token(&token, name, rate_limit_requests, rate_limit_window_seconds);
        Ok(ProvisionedKey { token, record })
    }

    async fn revoke(&self, token: &str) -> Result<(), RegistryError> {
        match self.records.get_mut(&hash_token(token)) {
            Some(mut record) if record.is_active => {
                record.is_active = false;
                record.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(RegistryError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_provision_then_resolve() {
        let registry = MemoryRegistry::new();
        let issued = assert_ok!(registry.provision("ci-bot", 5, 60).await);

        let first = assert_ok!(registry.resolve(&issued.token).await);
        let second = assert_ok!(registry.resolve(&issued.token).await);
        assert_eq!(first.id, issued.record.id);
        assert_eq!(first.id, second.id);
        assert_eq!(first.rate_limit_requests, second.rate_limit_requests);
        assert_eq!(first.rate_limit_window_seconds, 60);
        assert_ne!(first.key_hash, issued.token);
    }

    #[tokio::test]
    async fn test_unknown_token_is_not_found() {
        let registry = MemoryRegistry::new();
        let err = assert_err!(registry.resolve("ak_nope").await);
        assert!(matches!(err, RegistryError::NotFound));
    }

    #[tokio::test]
    async fn test_revoked_token_is_inactive_and_cannot_be_revoked_twice() {
        let registry = MemoryRegistry::new();
        let issued = registry.provision("temp", 0, 0).await.unwrap();

        assert_ok!(registry.revoke(&issued.token).await);
        let err = assert_err!(registry.resolve(&issued.token).await);
        assert!(matches!(err, RegistryError::Inactive));

        let err = assert_err!(registry.revoke(&issued.token).await);
        assert!(matches!(err, RegistryError::NotFound));
    }

    #[tokio::test]
    async fn test_revoke_unknown_token_is_not_found() {
        let registry = MemoryRegistry::new();
        let err = assert_err!(registry.revoke("ak_missing").await);
        assert!(matches!(err, RegistryError::NotFound));
    }
}
