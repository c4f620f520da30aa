use thiserror::Error;

use crate::api::ApiError;

use super::credentials::StoreError;

/// Failure of a sign-in or token refresh.
///
/// Clone so that every caller waiting on a shared refresh receives the
/// same outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Credentials were rejected: {0}")]
    Rejected(String),

    #[error("Session ended while the refresh was in flight")]
    SessionEnded,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Credential store error: {0}")]
    Storage(String),
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Network(e) => AuthError::Network(e.to_string()),
            ApiError::Api { .. }
            | ApiError::Unauthorized
            | ApiError::SessionExpired
            | ApiError::AccessDenied(_)
            | ApiError::BadRequest(_) => AuthError::Rejected(err.user_message()),
            other => AuthError::InvalidResponse(other.to_string()),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::Storage(err.to_string())
    }
}
