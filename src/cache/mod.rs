//! Counter Store: atomic, TTL-armed per-key counters.
//!
//! The Admission Engine never reads-then-writes a counter itself. All
//! mutation goes through [`CounterStore::increment_with_window`], which
//! implementations must make atomic for concurrent callers on the same key.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod redis_store;

pub use self::memory::MemoryCounterStore;
pub use self::redis_store::RedisCounterStore;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("counter store unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key` and return the new count. When the key had no value,
    /// arm an expiry of `window` in the same atomic step.
    async fn increment_with_window(&self, key: &str, window: Duration)
        -> Result<u64, CounterError>;

    /// Current count for `key` without incrementing. `None` means no usage.
    async fn peek(&self, key: &str) -> Result<Option<u64>, CounterError>;
}

/// Counter key for a credential record. Keyed by record id, not by token.
pub fn counter_key(record_id: &uuid::Uuid) -> String {
    format!("rate_limit:{}", record_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_key_uses_record_id() {
        let id = uuid::Uuid::nil();
        assert_eq!(
            counter_key(&id),
            "rate_limit:00000000-0000-0000-0000-000000000000"
        );
    }
}
