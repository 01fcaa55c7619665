use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{CounterError, CounterStore};

/// INCR plus EXPIRE as a single server-side step. The TTL check re-arms
/// expiry on a counter that somehow lost it, so it can never live forever.
const INCREMENT_SCRIPT: &str = r#"
    local current = redis.call("INCR", KEYS[1])
    if current == 1 or redis.call("TTL", KEYS[1]) == -1 then
        redis.call("EXPIRE", KEYS[1], ARGV[1])
    end
    return current
"#;

/// Redis-backed counter store, shared across processes.
#[derive(Clone)]
pub struct RedisCounterStore {
    redis: ConnectionManager,
    script: redis::Script,
}

impl RedisCounterStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            script: redis::Script::new(INCREMENT_SCRIPT),
        }
    }

    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    #[tracing::instrument(skip(self))]
    async fn increment_with_window(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<u64, CounterError> {
        let mut conn = self.redis.clone();
        // EXPIRE takes whole seconds; a sub-second window still needs a live TTL.
        let window_secs = window.as_secs().max(1);
        let count: u64 = self
            .script
            .key(key)
            .arg(window_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(count)
    }

    #[tracing::instrument(skip(self))]
    async fn peek(&self, key: &str) -> Result<Option<u64>, CounterError> {
        let mut conn = self.redis.clone();
        let count: Option<u64> = conn.get(key).await.map_err(anyhow::Error::from)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    //! Need a live Redis at REDIS_URL; skipped when it is unset.
    //! `REDIS_URL=redis://127.0.0.1:6379 cargo test redis_store`

    use super::*;
    use tokio_test::assert_ok;

    async fn store() -> Option<(RedisCounterStore, ConnectionManager)> {
        let url = std::env::var("REDIS_URL").ok()?;
        let store = RedisCounterStore::connect(&url).await.ok()?;
        let conn = store.redis.clone();
        Some((store, conn))
    }

    fn fresh_key() -> String {
        format!("rate_limit:test:{}", uuid::Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_first_increment_arms_ttl() {
        let Some((store, mut conn)) = store().await else {
            return;
        };
        let key = fresh_key();
        let window = Duration::from_secs(60);

        assert_eq!(assert_ok!(store.peek(&key).await), None);
        assert_eq!(assert_ok!(store.increment_with_window(&key, window).await), 1);
        assert_eq!(assert_ok!(store.increment_with_window(&key, window).await), 2);
        assert_eq!(assert_ok!(store.peek(&key).await), Some(2));

        let ttl: i64 = assert_ok!(conn.ttl(&key).await);
        assert!(ttl > 0 && ttl <= 60, "ttl = {}", ttl);

        let _: () = assert_ok!(conn.del(&key).await);
    }

    #[tokio::test]
    async fn test_counter_without_ttl_is_rearmed() {
        let Some((store, mut conn)) = store().await else {
            return;
        };
        let key = fresh_key();
        let window = Duration::from_secs(30);

        let _: () = assert_ok!(conn.set(&key, 7u64).await);
        let ttl: i64 = assert_ok!(conn.ttl(&key).await);
        assert_eq!(ttl, -1);

        assert_eq!(assert_ok!(store.increment_with_window(&key, window).await), 8);
        let ttl: i64 = assert_ok!(conn.ttl(&key).await);
        assert!(ttl > 0 && ttl <= 30, "ttl = {}", ttl);

        let _: () = assert_ok!(conn.del(&key).await);
    }

    #[tokio::test]
    async fn test_sub_second_window_still_expires() {
        let Some((store, mut conn)) = store().await else {
            return;
        };
        let key = fresh_key();

        assert_ok!(store.increment_with_window(&key, Duration::from_millis(200)).await);
        let ttl: i64 = assert_ok!(conn.ttl(&key).await);
        assert_eq!(ttl, 1);

        let _: () = assert_ok!(conn.del(&key).await);
    }
}
