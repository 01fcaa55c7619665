use sqlx::PgPool;

use crate::models::{CredentialRecord, NewCredential};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // ── API Keys ─────────────────────────────────────────────────

    pub async fn insert_api_key(&self, cred: &NewCredential) -> Result<CredentialRecord, sqlx::Error> {
        sqlx::query_as::<_, CredentialRecord>(
            r#"INSERT INTO api_keys (key_hash, name, rate_limit_requests, rate_limit_window_seconds)
               VALUES ($1, $2, $3, $4)
               RETURNING id, key_hash, name, rate_limit_requests, rate_limit_window_seconds,
                         is_active, created_at, updated_at"#,
        )
        .bind(&cred.key_hash)
        .bind(&cred.name)
        .bind(cred.rate_limit_requests)
        .bind(cred.rate_limit_window_seconds)
        .fetch_one(&self.pool)
        .await
    }

    /// Active or not: callers decide what an inactive row means.
    pub async fn get_api_key_by_hash(
        &self,
        key_hash: &str,
    ) -> Result<Option<CredentialRecord>, sqlx::Error> {
        sqlx::query_as::<_, CredentialRecord>(
            r#"SELECT id, key_hash, name, rate_limit_requests, rate_limit_window_seconds,
                      is_active, created_at, updated_at
               FROM api_keys WHERE key_hash = $1"#,
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await
    }

    /// Returns false when no active key had this hash.
    pub async fn deactivate_api_key(&self, key_hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE api_keys SET is_active = false, updated_at = NOW() WHERE key_hash = $1 AND is_active = true",
        )
        .bind(key_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
