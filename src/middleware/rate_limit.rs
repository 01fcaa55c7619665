use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::cache::{counter_key, CounterError, CounterStore};
use crate::config::{QuotaDefaults, MAX_WINDOW_SECS};
use crate::models::{CredentialRecord, QuotaSnapshot};

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("counting unavailable: {0}")]
    CountingUnavailable(#[from] CounterError),

    #[error("counting timed out after {0:?}")]
    TimedOut(Duration),
}

/// Fixed-window admission decisions over a shared [`CounterStore`].
///
/// Holds no mutable state of its own; every cross-request guarantee comes
/// from the store's atomic increment. `reset_time` is `now + window` on
/// every call rather than an anchored window start, so it drifts forward
/// slightly between calls within one window.
#[derive(Clone)]
pub struct AdmissionEngine {
    counters: Arc<dyn CounterStore>,
    defaults: QuotaDefaults,
    timeout: Option<Duration>,
}

impl AdmissionEngine {
    pub fn new(counters: Arc<dyn CounterStore>, defaults: QuotaDefaults) -> Self {
        Self {
            counters,
            defaults,
            timeout: None,
        }
    }

    /// Bound every counter store call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Limit and window for `credential`, falling back to the defaults
    /// for any value the record leaves unset. The window never exceeds
    /// [`MAX_WINDOW_SECS`].
    pub fn effective_quota(&self, credential: &CredentialRecord) -> (u64, Duration) {
        let window = credential
            .window()
            .unwrap_or(self.defaults.window)
            .min(Duration::from_secs(MAX_WINDOW_SECS));
        (credential.limit().unwrap_or(self.defaults.requests), window)
    }

    /// Count this request and decide whether it is admitted.
    ///
    /// The count equal to the limit is still admitted. A store failure is
    /// an error, never an implicit admit.
    #[tracing::instrument(skip_all, fields(key_id = %credential.id))]
    pub async fn evaluate_and_consume(
        &self,
        credential: &CredentialRecord,
    ) -> Result<QuotaSnapshot, QuotaError> {
        let (limit, window) = self.effective_quota(credential);
        let key = counter_key(&credential.id);

        let increment = self.counters.increment_with_window(&key, window);
        let count = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, increment)
                .await
                .map_err(|_| QuotaError::TimedOut(timeout))??,
            None => increment.await?,
        };

        tracing::debug!(count, limit, "quota consumed");
        Ok(snapshot(limit, window, count, count <= limit))
    }

    /// Report quota state without counting.
    ///
    /// Never fails: an absent key, a store error or a timeout all read as
    /// zero usage. At a count equal to the limit this reports not allowed.
    #[tracing::instrument(skip_all, fields(key_id = %credential.id))]
    pub async fn peek_status(&self, credential: &CredentialRecord) -> QuotaSnapshot {
        let (limit, window) = self.effective_quota(credential);
        let key = counter_key(&credential.id);

        let peek = self.counters.peek(&key);
        let observed = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, peek)
                .await
                .unwrap_or_else(|_| Err(CounterError::Unavailable(anyhow::anyhow!("peek timed out")))),
            None => peek.await,
        };

        let count = match observed {
            Ok(count) => count.unwrap_or(0),
            Err(e) => {
                tracing::warn!(error = %e, "quota peek failed, reporting zero usage");
                0
            }
        };

        snapshot(limit, window, count, count < limit)
    }
}

fn snapshot(limit: u64, window: Duration, count: u64, allowed: bool) -> QuotaSnapshot {
    let window = chrono::Duration::from_std(window)
        .unwrap_or_else(|_| chrono::Duration::seconds(MAX_WINDOW_SECS as i64));
    let now = Utc::now();
    QuotaSnapshot {
        allowed,
        remaining: limit.saturating_sub(count),
        limit,
        reset_time: now.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC),
    }
}
