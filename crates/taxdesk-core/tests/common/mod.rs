//! Shared fixtures for the session integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use taxdesk_core::api::{build_http_client, ApiClient, AuthApi};
use taxdesk_core::auth::{MemoryCredentialStore, SessionManager, StoredToken};
use taxdesk_core::config::SessionTimings;
use wiremock::MockServer;

/// An unsigned JWT whose `exp` claim lies `expires_in` from now
pub fn access_token(expires_in: Duration, jti: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({
            "exp": (Utc::now() + expires_in).timestamp(),
            "jti": jti,
            "user_id": 7,
        })
        .to_string(),
    );
    format!("{}.{}.signature", header, payload)
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

pub struct Harness {
    pub server: MockServer,
    pub store: Arc<MemoryCredentialStore>,
    pub session: SessionManager,
    pub api: ApiClient,
}

/// Backend mock plus a session whose store holds the given tokens.
/// The session is not initialized yet.
pub async fn harness(access: Option<&str>, refresh: Option<&str>) -> Harness {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryCredentialStore::with_tokens(
        access.map(|a| StoredToken::new(a, Duration::minutes(15))),
        refresh.map(|r| StoredToken::new(r, Duration::days(14))),
    ));

    let client = build_http_client(std::time::Duration::from_secs(5)).expect("http client");
    let auth = AuthApi::new(client.clone(), server.uri());
    let session = SessionManager::new(auth, store.clone(), SessionTimings::default());
    let api = ApiClient::new(client, server.uri(), session.clone());

    Harness {
        server,
        store,
        session,
        api,
    }
}
