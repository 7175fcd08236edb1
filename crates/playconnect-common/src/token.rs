//! Client-side inspection of bearer tokens.
//!
//! The payload is decoded only to read `exp`. The signature is never checked
//! here; that is the backend's job.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

/// Tokens are treated as expired this many milliseconds before `exp`.
pub const EXPIRY_SKEW_MS: i64 = 5_000;

/// Decodes the payload segment of a three-part JWT.
///
/// Returns `None` for anything that is not `header.payload.signature` with a
/// base64url JSON object in the middle.
pub fn decode_claims(token: &str) -> Option<JsonValue> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    // Some issuers keep the padding
    let payload = parts[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: JsonValue = serde_json::from_slice(&bytes).ok()?;
    claims.is_object().then_some(claims)
}

/// The `exp` claim in seconds since the epoch, if present and numeric.
pub fn expiry_secs(token: &str) -> Option<f64> {
    decode_claims(token)?.get("exp")?.as_f64()
}

/// Expiry check against an explicit clock.
///
/// Malformed tokens and tokens without `exp` count as expired.
pub fn is_token_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    match expiry_secs(token) {
        Some(exp) => {
            let expires_at_ms = exp * 1000.0;
            now.timestamp_millis() as f64 >= expires_at_ms - EXPIRY_SKEW_MS as f64
        }
        None => true,
    }
}

/// Expiry check against the wall clock.
pub fn is_token_expired(token: &str) -> bool {
    is_token_expired_at(token, Utc::now())
}
