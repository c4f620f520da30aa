//! Access token inspection.
//!
//! Access tokens are JWTs issued by the backend. The console never verifies
//! them; it only reads the `exp` claim from the payload to decide when a
//! refresh is due.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Token is not a three-part JWT")]
    Malformed,

    #[error("Token payload is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Token payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Token expiry {0} is out of range")]
    InvalidExpiry(i64),
}

#[derive(Debug, Deserialize)]
struct Claims {
    exp: i64,
}

/// Read the expiry timestamp of an access token without verifying it
pub fn decode_expiry(token: &str) -> Result<DateTime<Utc>, TokenError> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) if !payload.is_empty() => payload,
        _ => return Err(TokenError::Malformed),
    };

    // Some issuers keep the base64 padding
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    let claims: Claims = serde_json::from_slice(&bytes)?;

    DateTime::from_timestamp(claims.exp, 0).ok_or(TokenError::InvalidExpiry(claims.exp))
}

/// Where an access token stands relative to its expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// Valid for longer than the refresh lookahead
    Fresh,
    /// Still valid, but inside the lookahead window
    ExpiringSoon,
    Expired,
}

impl TokenStatus {
    pub fn classify(expires_at: DateTime<Utc>, now: DateTime<Utc>, lookahead: Duration) -> Self {
        if expires_at <= now {
            TokenStatus::Expired
        } else if expires_at - now < lookahead {
            TokenStatus::ExpiringSoon
        } else {
            TokenStatus::Fresh
        }
    }
}

/// True when the token decodes and has not expired yet
pub fn is_unexpired(token: &str) -> bool {
    decode_expiry(token)
        .map(|exp| exp > Utc::now())
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) fn mint(expires_at: DateTime<Utc>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({ "exp": expires_at.timestamp(), "user_id": 7 }).to_string(),
    );
    format!("{}.{}.signature", header, payload)
}
