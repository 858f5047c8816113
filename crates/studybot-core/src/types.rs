//! Credential and request types

use serde::{Deserialize, Serialize};

/// Persisted bearer credential
///
/// Each field maps to one entry of the credential store, so any of them may be
/// missing independently (e.g. after a partial login or a manual wipe).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Access token expiry in epoch milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl CredentialRecord {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.expires_at.is_none()
    }
}

/// One chat message to stream a reply for
///
/// The idempotency key travels as a request header and is never part of the
/// JSON entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    pub prompt: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_type: Option<String>,

    #[serde(skip)]
    pub idempotency_key: String,
}

impl StreamRequest {
    /// Create a request with a freshly generated idempotency key
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            context_id: None,
            context_type: None,
            idempotency_key: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Attach the document/task the prompt refers to
    pub fn with_context(mut self, context_id: impl Into<String>, context_type: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self.context_type = Some(context_type.into());
        self
    }

    /// Reuse a caller-supplied idempotency key (e.g. when resubmitting)
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = key.into();
        self
    }
}
