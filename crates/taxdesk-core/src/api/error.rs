use serde::Deserialize;
use thiserror::Error;

/// Structured error body returned by the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl std::fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "API error {}", self.code)
        } else {
            write!(f, "{} ({})", self.message, self.code)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{body}")]
    Api { status: u16, body: ApiErrorBody },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Session expired - please sign in again")]
    SessionExpired,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Decode a non-success response. The error envelope wins over the
    /// status code whenever the body carries one.
    pub fn from_response(status: reqwest::StatusCode, body: &str) -> Self {
        if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
            return ApiError::Api {
                status: status.as_u16(),
                body: envelope.error,
            };
        }
        Self::from_status(status, body)
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            400 | 422 => ApiError::BadRequest(truncated),
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Machine-readable error code from the envelope
    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::Api { body, .. } => Some(&body.code),
            _ => None,
        }
    }

    /// Field-level details from the envelope
    pub fn details(&self) -> Option<&serde_json::Value> {
        match self {
            ApiError::Api { body, .. } => Some(&body.details),
            _ => None,
        }
    }

    /// Backend correlation id to quote in support requests
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            ApiError::Api { body, .. } => body.correlation_id.as_deref(),
            _ => None,
        }
    }

    /// HTTP status when the error came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Api { status, .. } => Some(*status),
            ApiError::BadRequest(_) => Some(400),
            ApiError::Unauthorized | ApiError::SessionExpired => Some(401),
            ApiError::AccessDenied(_) => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::RateLimited => Some(429),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            ApiError::ServerError(_) | ApiError::InvalidResponse(_) | ApiError::InvalidRequest(_) => None,
        }
    }

    /// Short message suitable for a status bar or login form
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Api { body, .. } if !body.message.is_empty() => body.message.clone(),
            ApiError::Api { body, .. } => body.code.clone(),
            ApiError::Network(e) if e.is_timeout() => {
                "Connection timed out. Please try again.".to_string()
            }
            ApiError::Network(e) if e.is_connect() => {
                "Unable to connect to server. Check your network connection.".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_envelope_is_decoded() {
        let body = r#"{"error": {"code": "validation_error", "message": "Invalid CNPJ",
            "details": {"cnpj": ["must have 14 digits"]}, "correlation_id": "c0ffee"}}"#;
        let err = ApiError::from_response(StatusCode::BAD_REQUEST, body);

        assert_eq!(err.code(), Some("validation_error"));
        assert_eq!(err.correlation_id(), Some("c0ffee"));
        assert_eq!(err.status(), Some(400));
        assert_eq!(
            err.details().and_then(|d| d["cnpj"][0].as_str()),
            Some("must have 14 digits")
        );
        assert_eq!(err.user_message(), "Invalid CNPJ");
    }

    #[test]
    fn test_envelope_with_missing_optional_fields() {
        let body = r#"{"error": {"code": "conflict"}}"#;
        let err = ApiError::from_response(StatusCode::CONFLICT, body);
        assert_eq!(err.code(), Some("conflict"));
        assert_eq!(err.correlation_id(), None);
        assert_eq!(err.user_message(), "conflict");
    }

    #[test]
    fn test_plain_bodies_fall_back_to_status() {
        assert!(matches!(
            ApiError::from_response(StatusCode::NOT_FOUND, "<html>nope</html>"),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from_response(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from_response(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited
        ));
        assert!(matches!(
            ApiError::from_response(StatusCode::BAD_GATEWAY, "upstream"),
            ApiError::ServerError(_)
        ));
        // JSON that is not an envelope is not mistaken for one
        assert!(matches!(
            ApiError::from_response(StatusCode::FORBIDDEN, r#"{"detail": "no"}"#),
            ApiError::AccessDenied(_)
        ));
    }

    #[test]
    fn test_truncate_body() {
        let long = "é".repeat(400);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.contains("truncated, 800 total bytes"));
        assert_eq!(ApiError::truncate_body("short"), "short");
    }
}
