pub mod credential;
pub mod quota;

pub use credential::{CredentialRecord, NewCredential};
pub use quota::QuotaSnapshot;
