//! Token lifecycle configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Keys of the three credential store entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialKeys {
    #[serde(default = "default_access_token_key")]
    pub access_token: String,

    #[serde(default = "default_refresh_token_key")]
    pub refresh_token: String,

    /// Access token expiry, stored as epoch milliseconds in a string
    #[serde(default = "default_expires_at_key")]
    pub expires_at: String,
}

impl Default for CredentialKeys {
    fn default() -> Self {
        Self {
            access_token: default_access_token_key(),
            refresh_token: default_refresh_token_key(),
            expires_at: default_expires_at_key(),
        }
    }
}

/// Token lifecycle manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    #[serde(default)]
    pub keys: CredentialKeys,

    /// Refresh when the cached token expires within this many seconds
    #[serde(default = "default_refresh_skew_secs")]
    pub refresh_skew_secs: u64,

    /// Lifetime assumed for a refreshed token when neither the server nor the
    /// token's own `exp` claim says otherwise
    #[serde(default = "default_token_ttl_secs")]
    pub default_ttl_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            keys: CredentialKeys::default(),
            refresh_skew_secs: default_refresh_skew_secs(),
            default_ttl_secs: default_token_ttl_secs(),
        }
    }
}

impl TokenConfig {
    pub fn refresh_skew(&self) -> Duration {
        Duration::from_secs(self.refresh_skew_secs)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

fn default_access_token_key() -> String {
    "accessToken".to_string()
}

fn default_refresh_token_key() -> String {
    "refreshToken".to_string()
}

fn default_expires_at_key() -> String {
    "accessTokenExpiresAt".to_string()
}

fn default_refresh_skew_secs() -> u64 {
    30
}

fn default_token_ttl_secs() -> u64 {
    300
}
