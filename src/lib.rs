//! keygate: API key admission and per-key request quotas.
//!
//! The binary wires these modules to Postgres and Redis; integration tests
//! in `tests/` wire them to the in-memory registry and counter store.

use std::sync::Arc;

pub mod api;
pub mod cache;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod registry;
pub mod store;

use cache::CounterStore;
use config::Config;
use middleware::AdmissionEngine;
use registry::CredentialRegistry;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub registry: Arc<dyn CredentialRegistry>,
    pub engine: AdmissionEngine,
    pub config: Config,
}

impl AppState {
    pub fn new(
        registry: Arc<dyn CredentialRegistry>,
        counters: Arc<dyn CounterStore>,
        config: Config,
    ) -> Self {
        let engine = AdmissionEngine::new(counters, config.quota_defaults())
            .with_timeout(config.backend_timeout());
        Self {
            registry,
            engine,
            config,
        }
    }
}
