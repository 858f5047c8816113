//! Outbound streaming request
//!
//! Both transports send the same request, so it is described once here in a
//! transport-neutral form and converted to a reqwest builder at the edge.

use crate::config::{BodyEncoding, StreamClientConfig};
use reqwest::{
    Client, RequestBuilder,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    multipart::{Form, Part},
};
use studybot_core::{Result, StreamError, StreamRequest};
use tracing::debug;

pub const EVENT_STREAM_ACCEPT: &str = "text/event-stream";

/// Name of the single multipart part carrying the JSON entity
pub const MULTIPART_REQUEST_PART: &str = "request";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Json(String),
    Multipart { part_name: &'static str, json: String },
}

/// Fully resolved request for one session
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl OutboundRequest {
    /// Build the request for `request` authenticated with `token`
    pub fn build(config: &StreamClientConfig, token: &str, request: &StreamRequest) -> Result<Self> {
        if request.idempotency_key.trim().is_empty() {
            return Err(StreamError::Config(
                "Stream request is missing an idempotency key".to_string(),
            ));
        }

        let json = serde_json::to_string(request)?;
        let body = match config.body_encoding {
            BodyEncoding::Json => RequestBody::Json(json),
            BodyEncoding::Multipart => RequestBody::Multipart {
                part_name: MULTIPART_REQUEST_PART,
                json,
            },
        };

        let headers = vec![
            (AUTHORIZATION.as_str().to_string(), format!("Bearer {}", token)),
            (
                config.idempotency_header.clone(),
                request.idempotency_key.clone(),
            ),
            (ACCEPT.as_str().to_string(), EVENT_STREAM_ACCEPT.to_string()),
        ];

        Ok(Self {
            url: config.stream_url(),
            headers,
            body,
        })
    }

    /// First header value with the given (case-insensitive) name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Log the request at debug level with the bearer token redacted
    pub fn log_headers(&self, label: &str) {
        debug!("┌─────────────────────────────────────────────────────────");
        debug!("│ {} Request Headers", label);
        debug!("├─────────────────────────────────────────────────────────");
        debug!("│ POST {}", self.url);
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case(AUTHORIZATION.as_str()) {
                debug!("│ {}: Bearer <token>", name);
            } else {
                debug!("│ {}: {}", name, value);
            }
        }
        match &self.body {
            RequestBody::Json(_) => debug!("│ Content-Type: application/json"),
            RequestBody::Multipart { part_name, .. } => {
                debug!("│ Content-Type: multipart/form-data (part: {})", part_name)
            }
        }
        debug!("└─────────────────────────────────────────────────────────");
    }

    /// Convert into a reqwest request builder
    pub fn into_reqwest(self, client: &Client) -> Result<RequestBuilder> {
        let mut builder = client.post(&self.url);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let builder = match self.body {
            RequestBody::Json(json) => builder.header(CONTENT_TYPE, "application/json").body(json),
            RequestBody::Multipart { part_name, json } => {
                let part = Part::text(json)
                    .mime_str("application/json")
                    .map_err(|e| StreamError::Config(format!("Invalid multipart part: {}", e)))?;
                builder.multipart(Form::new().part(part_name, part))
            }
        };

        Ok(builder)
    }
}
