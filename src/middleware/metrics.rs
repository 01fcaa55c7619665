//! Prometheus metrics for admission decisions.
//!
//! Exposes a standard `/metrics` endpoint that Prometheus can scrape.
//! This is the one place unknown and inactive keys are told apart; the
//! HTTP response for both is identical.

use once_cell::sync::Lazy;
use prometheus::{opts, register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

/// Why a request was admitted or turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Admitted,
    Bypassed,
    MissingCredential,
    UnknownCredential,
    InactiveCredential,
    RegistryUnavailable,
    QuotaExceeded,
    QuotaCheckFailed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Admitted => "admitted",
            Outcome::Bypassed => "bypassed",
            Outcome::MissingCredential => "missing_credential",
            Outcome::UnknownCredential => "unknown_credential",
            Outcome::InactiveCredential => "inactive_credential",
            Outcome::RegistryUnavailable => "registry_unavailable",
            Outcome::QuotaExceeded => "quota_exceeded",
            Outcome::QuotaCheckFailed => "quota_check_failed",
        }
    }
}

static ADMISSION_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "keygate_admission_decisions_total",
            "Admission decisions by outcome"
        ),
        &["outcome"]
    )
    .expect("failed to register keygate_admission_decisions_total")
});

pub fn record(outcome: Outcome) {
    ADMISSION_DECISIONS
        .with_label_values(&[outcome.as_str()])
        .inc();
}

/// Current count for one outcome.
pub fn count(outcome: Outcome) -> u64 {
    ADMISSION_DECISIONS
        .with_label_values(&[outcome.as_str()])
        .get()
}

/// Encode all registered metrics as Prometheus text format.
/// Called by the `/metrics` HTTP handler.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}

// ── Tests ─────────────────────────────────────────────────────
