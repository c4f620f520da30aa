use crate::models::UserSummary;

use super::credentials::StoredTokens;
use super::token;

/// Lifecycle state of the console session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Uninitialized,
    Initializing,
    Authenticated,
    Unauthenticated,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated)
    }

    /// True once `initialize()` has settled on a stable state
    pub fn is_settled(&self) -> bool {
        matches!(self, AuthState::Authenticated | AuthState::Unauthenticated)
    }

    pub fn label(&self) -> &'static str {
        match self {
            AuthState::Uninitialized => "not started",
            AuthState::Initializing => "checking session",
            AuthState::Authenticated => "signed in",
            AuthState::Unauthenticated => "signed out",
        }
    }
}

/// The in-memory session: tokens mirrored from the credential store plus
/// the user they belong to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<UserSummary>,
}

impl Session {
    pub fn from_stored(tokens: StoredTokens) -> Self {
        Self {
            access_token: tokens.access,
            refresh_token: tokens.refresh,
            user: None,
        }
    }

    /// A non-expired access token or a usable refresh token is present
    pub fn is_authenticated(&self) -> bool {
        self.refresh_token.is_some()
            || self
                .access_token
                .as_deref()
                .map(token::is_unexpired)
                .unwrap_or(false)
    }

    pub fn has_credentials(&self) -> bool {
        self.access_token.is_some() || self.refresh_token.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().map(|u| u.is_admin()).unwrap_or(false)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_empty_session_is_not_authenticated() {
        let session = Session::default();
        assert!(!session.is_authenticated());
        assert!(!session.has_credentials());
    }

    #[test]
    fn test_fresh_access_token_authenticates() {
        let session = Session {
            access_token: Some(token::mint(Utc::now() + Duration::minutes(10))),
            ..Session::default()
        };
        assert!(session.is_authenticated());
    }

    #[test]
    fn test_expired_access_without_refresh_is_not_authenticated() {
        let session = Session {
            access_token: Some(token::mint(Utc::now() - Duration::minutes(1))),
            ..Session::default()
        };
        assert!(session.has_credentials());
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_refresh_token_alone_authenticates() {
        let session = Session::from_stored(StoredTokens {
            access: None,
            refresh: Some("refresh-1".to_string()),
        });
        assert!(session.is_authenticated());
    }

    #[test]
    fn test_clear() {
        let mut session = Session::from_stored(StoredTokens {
            access: Some("a".to_string()),
            refresh: Some("r".to_string()),
        });
        session.clear();
        assert_eq!(session, Session::default());
    }
}
