//! JWT payload decoding
//!
//! Only the `exp` claim is read; signatures are not verified. The server remains
//! the authority on whether a token is valid, this is just a hint for when to
//! refresh.

use base64::prelude::*;
use serde_json::Value;
use tracing::debug;

/// Decode the `exp` claim of a JWT, returned as epoch milliseconds
///
/// # Returns
/// * `Some(ms)` - Token has a numeric `exp` claim
/// * `None` - Token is not a JWT, payload is not JSON, or `exp` is absent
pub fn decode_expiry(token: &str) -> Option<i64> {
    let payload = decode_payload(token)?;

    let exp = payload.get("exp")?;
    let exp_secs = exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64))?;

    Some(exp_secs.saturating_mul(1000))
}

/// Decode the payload (second segment) of a JWT into JSON
pub fn decode_payload(token: &str) -> Option<Value> {
    // JWT format: header.payload.signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 || parts[1].is_empty() {
        debug!("Token is not a JWT ({} segments)", parts.len());
        return None;
    }

    let payload_b64 = parts[1].trim_end_matches('=');
    let payload_bytes = match BASE64_URL_SAFE_NO_PAD.decode(payload_b64) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("Failed to decode JWT payload: {}", e);
            return None;
        }
    };

    match serde_json::from_slice::<Value>(&payload_bytes) {
        Ok(json) => Some(json),
        Err(e) => {
            debug!("Failed to parse JWT payload JSON: {}", e);
            None
        }
    }
}
