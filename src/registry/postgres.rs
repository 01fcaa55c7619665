use async_trait::async_trait;

use super::{generate_token, hash_token, new_credential, CredentialRegistry, ProvisionedKey, RegistryError};
use crate::models::CredentialRecord;
use crate::store::postgres::PgStore;

#[async_trait]
impl CredentialRegistry for PgStore {
    #[tracing::instrument(skip_all)]
    async fn resolve(&self, token: &str) -> Result<CredentialRecord, RegistryError> {
        let record = self
            .get_api_key_by_hash(&hash_token(token))
            .await?
            .ok_or(RegistryError::NotFound)?;
        if !record.is_active {
            return Err(RegistryError::Inactive);
        }
        Ok(record)
    }

    #[tracing::instrument(skip(self))]
    async fn provision(
        &self,
        name: &str,
        rate_limit_requests: i32,
        rate_limit_window_seconds: i32,
    ) -> Result<ProvisionedKey, RegistryError> {
        let token = generate_token();
        let cred = new_credential(
            hash_token(&token),
            name,
            rate_limit_requests,
            rate_limit_window_seconds,
        );
        let record = self.insert_api_key(&cred).await?;
        tracing::info!(id = %record.id, name = %record.name, "api key provisioned");
        Ok(ProvisionedKey { token, record })
    }

    #[tracing::instrument(skip_all)]
    async fn revoke(&self, token: &str) -> Result<(), RegistryError> {
        if self.deactivate_api_key(&hash_token(token)).await? {
            Ok(())
        } else {
            Err(RegistryError::NotFound)
        }
    }
}
