//! Streaming client configuration

use crate::{client::HttpClientConfig, selector::TransportCapabilities};
use serde::{Deserialize, Serialize};

/// How the request entity is encoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    /// Plain `application/json` body
    #[default]
    Json,
    /// `multipart/form-data` with a single `request` part carrying the JSON
    Multipart,
}

/// Streaming client configuration
#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    /// Backend base URL
    pub base_url: String,

    /// Path of the streaming chat endpoint (default: /chatbot/stream)
    pub stream_path: String,

    /// Header carrying the caller's idempotency key
    pub idempotency_header: String,

    /// Request entity encoding
    pub body_encoding: BodyEncoding,

    /// What the runtime's HTTP stack can do
    pub capabilities: TransportCapabilities,

    /// HTTP client configuration
    pub client_config: HttpClientConfig,
}

impl StreamClientConfig {
    /// Create a new configuration for the given backend
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            stream_path: "/chatbot/stream".to_string(),
            idempotency_header: "Idempotency-Key".to_string(),
            body_encoding: BodyEncoding::default(),
            capabilities: TransportCapabilities::default(),
            client_config: HttpClientConfig::default(),
        }
    }

    /// Set the streaming endpoint path
    pub fn with_stream_path(mut self, path: impl Into<String>) -> Self {
        self.stream_path = path.into();
        self
    }

    /// Set the request entity encoding
    pub fn with_body_encoding(mut self, encoding: BodyEncoding) -> Self {
        self.body_encoding = encoding;
        self
    }

    /// Set the runtime capabilities used for transport selection
    pub fn with_capabilities(mut self, capabilities: TransportCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the HTTP client configuration
    pub fn with_client_config(mut self, client_config: HttpClientConfig) -> Self {
        self.client_config = client_config;
        self
    }

    /// Full URL of the streaming endpoint
    pub fn stream_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.stream_path)
    }
}
