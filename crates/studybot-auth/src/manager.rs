//! Token lifecycle management
//!
//! Resolves a bearer token for one streaming session. The cached access token is
//! used while it is comfortably inside its lifetime; otherwise the refresh token
//! is exchanged for a new one and the rotated record is persisted.

use crate::{
    config::TokenConfig,
    jwt,
    now_ms,
    refresh::RefreshEndpoint,
    store::CredentialStore,
};
use std::sync::Arc;
use studybot_core::{CredentialRecord, Result, StreamError};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

pub struct TokenManager {
    store: Arc<dyn CredentialStore>,
    endpoint: Arc<dyn RefreshEndpoint>,
    config: TokenConfig,
    /// Serializes refreshes so concurrent sessions don't rotate the token twice
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        endpoint: Arc<dyn RefreshEndpoint>,
        config: TokenConfig,
    ) -> Self {
        Self {
            store,
            endpoint,
            config,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Return an access token usable for one session, refreshing if needed
    ///
    /// # Errors
    /// - `StreamError::NoRefreshToken` if a refresh is needed but none is stored
    /// - `StreamError::RefreshRejected` if the refresh endpoint fails
    /// - `StreamError::Store` for credential store failures
    #[instrument(skip(self))]
    pub async fn get_valid_access_token(&self) -> Result<String> {
        if let Some(token) = self.cached_token().await? {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another session may have refreshed while we waited for the lock
        if let Some(token) = self.cached_token().await? {
            debug!("Using token refreshed by a concurrent session");
            return Ok(token);
        }

        self.refresh().await
    }

    /// Exchange the stored refresh token for a new access token
    ///
    /// On any failure the whole credential record is cleared.
    pub async fn refresh(&self) -> Result<String> {
        let keys = &self.config.keys;

        let refresh_token = self
            .store
            .get(&keys.refresh_token)
            .await?
            .filter(|t| !t.is_empty());

        let Some(refresh_token) = refresh_token else {
            warn!("No refresh token stored; clearing credentials");
            self.clear_quietly().await;
            return Err(StreamError::NoRefreshToken);
        };

        let tokens = match self.endpoint.refresh(&refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("Token refresh failed, clearing credentials: {}", e);
                self.clear_quietly().await;
                return Err(match e {
                    StreamError::RefreshRejected(reason) => StreamError::RefreshRejected(reason),
                    other => StreamError::RefreshRejected(other.to_string()),
                });
            }
        };

        let expires_at = tokens
            .expires_at
            .or_else(|| jwt::decode_expiry(&tokens.access_token))
            .unwrap_or_else(|| now_ms() + self.config.default_ttl().as_millis() as i64);

        let record = CredentialRecord {
            access_token: Some(tokens.access_token.clone()),
            refresh_token: Some(tokens.refresh_token.unwrap_or(refresh_token)),
            expires_at: Some(expires_at),
        };
        self.store_credentials(&record).await?;

        info!("Access token refreshed (expires at {})", expires_at);
        Ok(tokens.access_token)
    }

    /// Persist a credential record (e.g. the result of a login)
    ///
    /// Absent fields leave the corresponding entry untouched.
    pub async fn store_credentials(&self, record: &CredentialRecord) -> Result<()> {
        let keys = &self.config.keys;

        if let Some(access_token) = &record.access_token {
            self.store.set(&keys.access_token, access_token).await?;
        }
        if let Some(refresh_token) = &record.refresh_token {
            self.store.set(&keys.refresh_token, refresh_token).await?;
        }
        if let Some(expires_at) = record.expires_at {
            self.store
                .set(&keys.expires_at, &expires_at.to_string())
                .await?;
        }
        Ok(())
    }

    /// Read the persisted credential record
    pub async fn current_record(&self) -> Result<CredentialRecord> {
        let keys = &self.config.keys;

        let access_token = self.store.get(&keys.access_token).await?;
        let refresh_token = self.store.get(&keys.refresh_token).await?;
        let expires_at = match self.store.get(&keys.expires_at).await? {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(ms) => Some(ms),
                Err(_) => {
                    warn!("Ignoring unparseable token expiry '{}'", raw);
                    None
                }
            },
            None => None,
        };

        Ok(CredentialRecord {
            access_token: access_token.filter(|t| !t.is_empty()),
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
            expires_at,
        })
    }

    /// Remove all three credential entries
    pub async fn clear(&self) -> Result<()> {
        let keys = &self.config.keys;
        self.store.clear(&keys.access_token).await?;
        self.store.clear(&keys.refresh_token).await?;
        self.store.clear(&keys.expires_at).await?;
        Ok(())
    }

    async fn clear_quietly(&self) {
        if let Err(e) = self.clear().await {
            warn!("Failed to clear credentials: {}", e);
        }
    }

    /// The cached access token, if it is not inside the refresh skew
    async fn cached_token(&self) -> Result<Option<String>> {
        let record = self.current_record().await?;

        let Some(access_token) = record.access_token else {
            debug!("No cached access token");
            return Ok(None);
        };

        let expires_at = record
            .expires_at
            .or_else(|| jwt::decode_expiry(&access_token));

        match expires_at {
            Some(expires_at) => {
                let skew_ms = self.config.refresh_skew().as_millis() as i64;
                if now_ms() + skew_ms >= expires_at {
                    debug!("Cached access token expires at {}; refreshing", expires_at);
                    Ok(None)
                } else {
                    Ok(Some(access_token))
                }
            }
            None => {
                debug!("Cached access token has no known expiry; using as-is");
                Ok(Some(access_token))
            }
        }
    }
}
