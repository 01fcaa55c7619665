//! Credential Registry: turns an opaque API key into a credential record.
//!
//! Tokens are never stored. Lookups go through [`hash_token`], a SHA-256
//! digest rendered as lowercase hex.

use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::{CredentialRecord, NewCredential};

pub mod memory;
pub mod postgres;

pub use memory::MemoryRegistry;

/// Prefix on every generated key, to make leaked keys easy to grep for.
pub const TOKEN_PREFIX: &str = "ak_";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("api key not found")]
    NotFound,

    #[error("api key is inactive")]
    Inactive,

    #[error("credential registry unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

impl From<sqlx::Error> for RegistryError {
    fn from(e: sqlx::Error) -> Self {
        RegistryError::Unavailable(e.into())
    }
}

/// A newly issued key. `token` is the only copy of the plaintext.
#[derive(Debug, Clone)]
pub struct ProvisionedKey {
    pub token: String,
    pub record: CredentialRecord,
}

#[async_trait]
pub trait CredentialRegistry: Send + Sync {
    /// Resolve a token to its active record.
    async fn resolve(&self, token: &str) -> Result<CredentialRecord, RegistryError>;

    /// Issue a new key. Non-positive quota values are stored as unset.
    async fn provision(
        &self,
        name: &str,
        rate_limit_requests: i32,
        rate_limit_window_seconds: i32,
    ) -> Result<ProvisionedKey, RegistryError>;

    /// Deactivate the active record matching `token`. There is no way back.
    async fn revoke(&self, token: &str) -> Result<(), RegistryError>;
}

/// One-way digest used for storage and lookup.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fresh random key: `ak_` + 32 bytes of OS randomness, hex encoded.
pub fn generate_token() -> String {
    let mut random_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut random_bytes);
    format!("{}{}", TOKEN_PREFIX, hex::encode(random_bytes))
}

pub(crate) fn new_credential(
    key_hash: String,
    name: &str,
    rate_limit_requests: i32,
    rate_limit_window_seconds: i32,
) -> NewCredential {
    NewCredential {
        key_hash,
        name: name.to_string(),
        rate_limit_requests: rate_limit_requests.max(0),
        rate_limit_window_seconds: rate_limit_window_seconds.max(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token_is_deterministic_sha256_hex() {
        let a = hash_token("ak_test");
        let b = hash_token("ak_test");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a, hash_token("ak_test2"));
    }

    #[test]
    fn test_hash_token_known_vector() {
        // sha256("abc")
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_generate_token_shape_and_uniqueness() {
        let a = generate_token();
        let b = generate_token();
        assert!(a.starts_with(TOKEN_PREFIX));
        assert_eq!(a.len(), TOKEN_PREFIX.len() + 64);
        assert_ne!(a, b);
        assert!(!a.contains(&hash_token(&a)));
    }

    #[test]
    fn test_new_credential_clamps_negative_quota_to_unset() {
        let cred = new_credential("h".into(), "label", -3, -60);
        assert_eq!(cred.rate_limit_requests, 0);
        assert_eq!(cred.rate_limit_window_seconds, 0);
    }
}
