use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{CounterError, CounterStore};

#[derive(Clone, Copy)]
struct CounterEntry {
    count: u64,
    expires_at: Instant,
}

impl CounterEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Single-process counter store.
///
/// Increments hold the DashMap shard lock for the key, so concurrent
/// increments on one key are serialized. Expired entries are treated as
/// absent on read and reset on the next increment; `evict_expired()` bounds memory.
#[derive(Clone, Default)]
pub struct MemoryCounterStore {
    counters: Arc<DashMap<String, CounterEntry>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all expired counters. Returns how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.counters.len();
        self.counters.retain(|_, entry| entry.is_live(now));
        before - self.counters.len()
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment_with_window(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<u64, CounterError> {
        let now = Instant::now();
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert(CounterEntry {
                count: 0,
                expires_at: now + window,
            });

        if !entry.is_live(now) {
            *entry = CounterEntry {
                count: 0,
                expires_at: now + window,
            };
        }
        entry.count += 1;
        Ok(entry.count)
    }

    async fn peek(&self, key: &str) -> Result<Option<u64>, CounterError> {
        let now = Instant::now();
        Ok(self
            .counters
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.count))
    }
}
