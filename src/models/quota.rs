use chrono::{DateTime, Utc};
use serde::Serialize;

/// Quota state produced by the Admission Engine for a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaSnapshot {
    pub allowed: bool,
    pub remaining: u64,
    pub limit: u64,
    pub reset_time: DateTime<Utc>,
}

impl QuotaSnapshot {
    /// Whole seconds from `now` until `reset_time`, truncated and never negative.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        (self.reset_time - now).num_seconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn snapshot(reset_time: DateTime<Utc>) -> QuotaSnapshot {
        QuotaSnapshot {
            allowed: false,
            remaining: 0,
            limit: 5,
            reset_time,
        }
    }

    #[test]
    fn test_retry_after_truncates() {
        let now = Utc::now();
        let s = snapshot(now + Duration::milliseconds(59_900));
        assert_eq!(s.retry_after_secs(now), 59);
    }

    #[test]
    fn test_retry_after_never_negative() {
        let now = Utc::now();
        let s = snapshot(now - Duration::seconds(10));
        assert_eq!(s.retry_after_secs(now), 0);
    }
}
