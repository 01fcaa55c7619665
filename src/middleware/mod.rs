pub mod admission;
pub mod metrics;
pub mod rate_limit;

pub use admission::admission;
pub use rate_limit::{AdmissionEngine, QuotaError};
