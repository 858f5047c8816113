//! Shared HTTP client utilities

use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use studybot_core::{Result, StreamError};

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    /// Note: This applies to the entire request including the streamed reply.
    pub timeout_secs: u64,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Maximum number of idle connections per host
    pub pool_max_idle_per_host: usize,

    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            // A long answer is streamed over a single request, so the whole-request
            // timeout has to cover generation time, not just time-to-first-byte.
            timeout_secs: 300,
            connect_timeout_secs: 10,
            pool_max_idle_per_host: 8,
            user_agent: format!("StudyBot/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Create a configured HTTP client with connection pooling
pub fn create_client(config: &HttpClientConfig) -> Result<Client> {
    ClientBuilder::new()
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        // Expire idle connections before the backend closes them
        .pool_idle_timeout(Duration::from_secs(90))
        .user_agent(&config.user_agent)
        // Use rustls for TLS (no openssl dependency)
        .use_rustls_tls()
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .map_err(|e| StreamError::Config(format!("Failed to create HTTP client: {}", e)))
}
