//! Token refresh endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use studybot_core::{Result, StreamError};
use tracing::{debug, instrument, warn};

/// Tokens returned by a successful refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    pub access_token: String,
    /// Rotated refresh token, if the server issued one
    pub refresh_token: Option<String>,
    /// Explicit access token expiry in epoch milliseconds
    pub expires_at: Option<i64>,
}

/// Exchanges a refresh token for a new access token
#[async_trait]
pub trait RefreshEndpoint: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Epoch milliseconds
    #[serde(default)]
    expires_at: Option<i64>,
    /// Seconds from now
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Refresh endpoint reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpRefreshEndpoint {
    client: Client,
    url: String,
}

impl HttpRefreshEndpoint {
    /// Create an endpoint posting to `{base_url}{refresh_path}`
    pub fn new(client: Client, base_url: &str, refresh_path: &str) -> Self {
        Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), refresh_path),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RefreshEndpoint for HttpRefreshEndpoint {
    #[instrument(skip(self, refresh_token), fields(url = %self.url))]
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens> {
        debug!("Sending token refresh request");

        let response = self
            .client
            .post(&self.url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| StreamError::Connect(format!("Token refresh request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            warn!("Token refresh failed with status {}: {}", status, body);
            return Err(StreamError::RefreshRejected(format!(
                "status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: RefreshResponse = response.json().await.map_err(|e| {
            StreamError::RefreshRejected(format!("Failed to parse refresh response: {}", e))
        })?;

        if parsed.access_token.is_empty() {
            return Err(StreamError::RefreshRejected(
                "Refresh response carried an empty access token".to_string(),
            ));
        }

        let expires_at = parsed.expires_at.or_else(|| {
            parsed
                .expires_in
                .map(|secs| crate::now_ms() + secs.saturating_mul(1000))
        });

        debug!(
            "Token refresh succeeded (access token length: {}, rotated: {})",
            parsed.access_token.len(),
            parsed.refresh_token.is_some()
        );

        Ok(RefreshedTokens {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token.filter(|t| !t.is_empty()),
            expires_at,
        })
    }
}
