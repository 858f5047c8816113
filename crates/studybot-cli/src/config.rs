use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use studybot_auth::{FileCredentialStore, TokenConfig};
use studybot_egress::{
    BodyEncoding, StreamClientConfig, TransportCapabilities, client::HttpClientConfig,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudybotConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub stream: StreamSettings,

    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSettings {
    #[serde(default = "default_stream_path")]
    pub path: String,

    #[serde(default = "default_idempotency_header")]
    pub idempotency_header: String,

    #[serde(default)]
    pub body_encoding: BodyEncoding,

    #[serde(default)]
    pub capabilities: TransportCapabilities,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,

    /// Credential file; defaults to ~/.studybot/credentials.json
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<String>,

    #[serde(default)]
    pub token: TokenConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for StudybotConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            stream: StreamSettings::default(),
            auth: AuthSettings::default(),
            http: HttpSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            path: default_stream_path(),
            idempotency_header: default_idempotency_header(),
            body_encoding: BodyEncoding::default(),
            capabilities: TransportCapabilities::default(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            refresh_path: default_refresh_path(),
            credentials_file: None,
            token: TokenConfig::default(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl StudybotConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?
        } else {
            // Default to YAML
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Invalid YAML in {}", path.display()))?
        };

        Ok(config)
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        self.merge_env_from(|key| std::env::var(key).ok());
    }

    pub fn merge_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("STUDYBOT_BASE_URL") {
            self.base_url = val;
        }

        // Streaming endpoint
        if let Some(val) = lookup("STUDYBOT_STREAM_PATH") {
            self.stream.path = val;
        }

        if let Some(val) = lookup("STUDYBOT_BODY_ENCODING") {
            match val.to_lowercase().as_str() {
                "json" => self.stream.body_encoding = BodyEncoding::Json,
                "multipart" => self.stream.body_encoding = BodyEncoding::Multipart,
                _ => eprintln!(
                    "Warning: Invalid STUDYBOT_BODY_ENCODING '{}', using {:?}",
                    val, self.stream.body_encoding
                ),
            }
        }

        if let Some(val) = lookup("STUDYBOT_INCREMENTAL_BODY") {
            if let Ok(enabled) = val.parse::<bool>() {
                self.stream.capabilities.incremental_body = enabled;
            }
        }

        // Credentials
        if let Some(val) = lookup("STUDYBOT_REFRESH_PATH") {
            self.auth.refresh_path = val;
        }

        if let Some(val) = lookup("STUDYBOT_CREDENTIALS_FILE") {
            self.auth.credentials_file = Some(val);
        }

        if let Some(val) = lookup("STUDYBOT_REFRESH_SKEW_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.auth.token.refresh_skew_secs = secs;
            }
        }

        if let Some(val) = lookup("STUDYBOT_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.http.timeout_secs = secs;
            }
        }

        if let Some(val) = lookup("STUDYBOT_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout_secs: self.http.timeout_secs,
            connect_timeout_secs: self.http.connect_timeout_secs,
            ..HttpClientConfig::default()
        }
    }

    pub fn stream_client_config(&self) -> StreamClientConfig {
        let mut config = StreamClientConfig::new(self.base_url.clone())
            .with_stream_path(self.stream.path.clone())
            .with_body_encoding(self.stream.body_encoding)
            .with_capabilities(self.stream.capabilities)
            .with_client_config(self.http_client_config());
        config.idempotency_header = self.stream.idempotency_header.clone();
        config
    }

    /// Credential store backing file, with `~` expanded
    pub fn credential_store(&self) -> anyhow::Result<FileCredentialStore> {
        match &self.auth.credentials_file {
            Some(path) => {
                let expanded = shellexpand::tilde(path).to_string();
                Ok(FileCredentialStore::new(PathBuf::from(expanded)))
            }
            None => FileCredentialStore::default_location()
                .context("Could not determine the default credentials location"),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_stream_path() -> String {
    "/chatbot/stream".to_string()
}

fn default_idempotency_header() -> String {
    "Idempotency-Key".to_string()
}

fn default_refresh_path() -> String {
    "/auth/refresh".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}
