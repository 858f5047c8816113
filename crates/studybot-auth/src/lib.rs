//! StudyBot credential handling
//!
//! This crate keeps the short-lived bearer credential usable for streaming sessions:
//! - Credential store abstraction with in-memory and JSON-file backends
//! - JWT `exp` claim decoding for tokens issued without an explicit expiry
//! - Refresh endpoint abstraction with an HTTP implementation
//! - Token lifecycle manager that refreshes proactively before expiry

pub mod config;
pub mod jwt;
pub mod manager;
pub mod refresh;
pub mod store;

pub use config::{CredentialKeys, TokenConfig};
pub use manager::TokenManager;
pub use refresh::{HttpRefreshEndpoint, RefreshEndpoint, RefreshedTokens};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};

/// Current time in epoch milliseconds
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
