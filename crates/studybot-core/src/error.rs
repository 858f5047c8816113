//! Error types for StudyBot Core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    // Authentication errors
    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Token refresh rejected: {0}")]
    RefreshRejected(String),

    #[error("Unauthorized: access token was rejected")]
    Unauthorized,

    // Transport errors
    #[error("Failed to open stream: {0}")]
    Connect(String),

    #[error("Server returned status {status_code}: {message}")]
    HttpStatus { status_code: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Stream cancelled")]
    Cancelled,

    // Collaborator errors
    #[error("Credential store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    /// True for failures that require the user to sign in again
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            StreamError::NoRefreshToken | StreamError::RefreshRejected(_) | StreamError::Unauthorized
        )
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
