//! Integration tests for the session lifecycle against a mocked backend

mod common;

use std::time::Duration as StdDuration;

use chrono::Duration;
use common::{access_token, harness};
use serde_json::json;
use taxdesk_core::auth::{AuthError, AuthState, CredentialStore, StoredTokens, TokenCheck};
use taxdesk_core::models::UserRole;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

fn refresh_ok(access: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "access": access }))
}

#[tokio::test]
async fn test_initialize_without_tokens() {
    let h = harness(None, None).await;
    assert_eq!(h.session.state(), AuthState::Uninitialized);
    assert_eq!(h.session.initialize().await, AuthState::Unauthenticated);
    assert!(!h.session.is_authenticated());
}

#[tokio::test]
async fn test_initialize_restores_session_and_profile() {
    let old = access_token(Duration::minutes(10), "a1");
    let h = harness(Some(&old), Some("refresh-1")).await;

    Mock::given(method("GET"))
        .and(path("/auth/me/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7, "email": "ana@escritorio.com.br", "name": "Ana Souza", "role": "user"
        })))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh/"))
        .respond_with(refresh_ok("unused"))
        .expect(0)
        .mount(&h.server)
        .await;

    assert_eq!(h.session.initialize().await, AuthState::Authenticated);
    let user = h.session.user().expect("profile loaded");
    assert_eq!(user.display_name(), "Ana Souza");
    assert_eq!(user.role, UserRole::User);
}

#[tokio::test]
async fn test_initialize_with_expired_access_token_refreshes() {
    let expired = access_token(Duration::minutes(-5), "a1");
    let new = access_token(Duration::minutes(15), "a2");
    let h = harness(Some(&expired), Some("refresh-1")).await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh/"))
        .and(body_json(json!({"refresh": "refresh-1"})))
        .respond_with(refresh_ok(&new))
        .expect(1)
        .mount(&h.server)
        .await;

    assert_eq!(h.session.initialize().await, AuthState::Authenticated);
    assert_eq!(h.session.access_token().as_deref(), Some(new.as_str()));
}

#[tokio::test]
async fn test_initialize_with_refresh_token_only() {
    let new = access_token(Duration::minutes(15), "a2");
    let h = harness(None, Some("refresh-1")).await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh/"))
        .respond_with(refresh_ok(&new))
        .expect(1)
        .mount(&h.server)
        .await;

    assert_eq!(h.session.initialize().await, AuthState::Authenticated);
    assert_eq!(
        h.store.load().expect("load").access.as_deref(),
        Some(new.as_str())
    );
}

#[tokio::test]
async fn test_initialize_with_rejected_refresh_signs_out() {
    let expired = access_token(Duration::minutes(-5), "a1");
    let h = harness(Some(&expired), Some("refresh-1")).await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;

    assert_eq!(h.session.initialize().await, AuthState::Unauthenticated);
    assert_eq!(h.store.load().expect("load"), StoredTokens::default());
}

#[tokio::test]
async fn test_token_expiring_within_lookahead_is_refreshed() {
    let soon = access_token(Duration::seconds(90), "a1");
    let new = access_token(Duration::minutes(15), "a2");
    let h = harness(Some(&soon), Some("refresh-1")).await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh/"))
        .respond_with(refresh_ok(&new))
        .expect(1)
        .mount(&h.server)
        .await;

    assert_eq!(h.session.initialize().await, AuthState::Authenticated);
    assert_eq!(h.session.check_token_validity().await, TokenCheck::Valid);
    assert_eq!(h.session.access_token().as_deref(), Some(new.as_str()));
}

#[tokio::test]
async fn test_token_with_ten_minutes_left_is_not_refreshed() {
    let fresh = access_token(Duration::minutes(10), "a1");
    let h = harness(Some(&fresh), Some("refresh-1")).await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh/"))
        .respond_with(refresh_ok("unused"))
        .expect(0)
        .mount(&h.server)
        .await;

    h.session.initialize().await;
    assert_eq!(h.session.check_token_validity().await, TokenCheck::Valid);
    assert_eq!(h.session.access_token().as_deref(), Some(fresh.as_str()));
}

#[tokio::test]
async fn test_concurrent_refreshes_share_one_exchange() {
    let fresh = access_token(Duration::minutes(10), "a1");
    let new = access_token(Duration::minutes(15), "a2");
    let h = harness(Some(&fresh), Some("refresh-1")).await;
    h.session.initialize().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh/"))
        .respond_with(refresh_ok(&new).set_delay(StdDuration::from_millis(200)))
        .expect(1)
        .mount(&h.server)
        .await;

    let (a, b, c) = tokio::join!(h.session.refresh(), h.session.refresh(), h.session.refresh());
    assert_eq!(a.as_deref(), Ok(new.as_str()));
    assert_eq!(b, a);
    assert_eq!(c, a);
}

#[tokio::test]
async fn test_refresh_completing_after_sign_out_is_discarded() {
    let fresh = access_token(Duration::minutes(10), "a1");
    let new = access_token(Duration::minutes(15), "a2");
    let h = harness(Some(&fresh), Some("refresh-1")).await;
    h.session.initialize().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh/"))
        .respond_with(refresh_ok(&new).set_delay(StdDuration::from_millis(300)))
        .mount(&h.server)
        .await;

    let (result, ()) = tokio::join!(h.session.refresh(), async {
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        h.session.sign_out();
    });

    assert_eq!(result, Err(AuthError::SessionEnded));
    assert_eq!(h.session.state(), AuthState::Unauthenticated);
    assert_eq!(h.session.access_token(), None);
    assert_eq!(h.store.load().expect("load"), StoredTokens::default());
}

fn login_ok(access: &str, refresh: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access": access,
        "refresh": refresh,
        "user": {"id": 8, "email": "bruno@escritorio.com.br", "role": "user"}
    }))
}

#[tokio::test]
async fn test_new_session_does_not_join_stale_refresh() {
    let fresh = access_token(Duration::minutes(10), "a1");
    let stale = access_token(Duration::minutes(15), "a2");
    let signed_in = access_token(Duration::minutes(15), "b1");
    let refreshed = access_token(Duration::minutes(15), "b2");
    let h = harness(Some(&fresh), Some("refresh-1")).await;
    h.session.initialize().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh/"))
        .and(body_json(json!({"refresh": "refresh-1"})))
        .respond_with(refresh_ok(&stale).set_delay(StdDuration::from_millis(400)))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh/"))
        .and(body_json(json!({"refresh": "refresh-2"})))
        .respond_with(refresh_ok(&refreshed))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/login/"))
        .respond_with(login_ok(&signed_in, "refresh-2"))
        .mount(&h.server)
        .await;

    let (old_result, new_result) = tokio::join!(h.session.refresh(), async {
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        h.session.sign_out();
        h.session
            .sign_in("bruno@escritorio.com.br", "s3nha")
            .await
            .expect("sign in");
        h.session.refresh().await
    });

    assert_eq!(old_result, Err(AuthError::SessionEnded));
    assert_eq!(new_result.as_deref(), Ok(refreshed.as_str()));
    assert_eq!(h.session.state(), AuthState::Authenticated);
    let stored = h.store.load().expect("load");
    assert_eq!(stored.access.as_deref(), Some(refreshed.as_str()));
    assert_eq!(stored.refresh.as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn test_startup_check_spanning_sign_in_keeps_new_session() {
    let soon = access_token(Duration::seconds(90), "a1");
    let stale = access_token(Duration::minutes(15), "a2");
    let signed_in = access_token(Duration::minutes(15), "b1");
    let h = harness(Some(&soon), Some("refresh-1")).await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh/"))
        .respond_with(refresh_ok(&stale).set_delay(StdDuration::from_millis(400)))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/login/"))
        .respond_with(login_ok(&signed_in, "refresh-2"))
        .expect(1)
        .mount(&h.server)
        .await;

    // initialize() starts a lookahead refresh for the restored token; the
    // sign-in lands while that refresh is still in flight
    let (state, ()) = tokio::join!(h.session.initialize(), async {
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        h.session
            .sign_in("bruno@escritorio.com.br", "s3nha")
            .await
            .expect("sign in");
    });

    assert_eq!(state, AuthState::Authenticated);
    assert_eq!(h.session.access_token().as_deref(), Some(signed_in.as_str()));
    assert_eq!(h.session.check_token_validity().await, TokenCheck::Valid);
    let stored = h.store.load().expect("load");
    assert_eq!(stored.access.as_deref(), Some(signed_in.as_str()));
    assert_eq!(stored.refresh.as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn test_sign_in_persists_tokens_and_loads_profile() {
    let h = harness(None, None).await;
    h.session.initialize().await;
    let access = access_token(Duration::minutes(15), "a1");

    Mock::given(method("POST"))
        .and(path("/auth/login/"))
        .and(body_json(json!({"email": "ana@escritorio.com.br", "password": "s3nha"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access": access, "refresh": "refresh-1"})),
        )
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/me/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7, "email": "ana@escritorio.com.br", "role": "admin"
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let user = h
        .session
        .sign_in("ana@escritorio.com.br", "s3nha")
        .await
        .expect("sign in")
        .expect("profile");

    assert!(user.is_admin());
    assert_eq!(h.session.state(), AuthState::Authenticated);
    let stored = h.store.load().expect("load");
    assert_eq!(stored.access.as_deref(), Some(access.as_str()));
    assert_eq!(stored.refresh.as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn test_rejected_sign_in() {
    let h = harness(None, None).await;
    h.session.initialize().await;

    Mock::given(method("POST"))
        .and(path("/auth/login/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": "invalid_credentials", "message": "E-mail ou senha incorretos"}
        })))
        .mount(&h.server)
        .await;

    let result = h.session.sign_in("ana@escritorio.com.br", "errada").await;
    assert_eq!(
        result,
        Err(AuthError::Rejected("E-mail ou senha incorretos".to_string()))
    );
    assert_eq!(h.session.state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_logout_revokes_and_clears() {
    let fresh = access_token(Duration::minutes(10), "a1");
    let h = harness(Some(&fresh), Some("refresh-1")).await;
    h.session.initialize().await;

    Mock::given(method("POST"))
        .and(path("/auth/logout/"))
        .and(body_json(json!({"refresh": "refresh-1"})))
        .respond_with(ResponseTemplate::new(205))
        .expect(1)
        .mount(&h.server)
        .await;

    h.session.logout().await;
    assert_eq!(h.session.state(), AuthState::Unauthenticated);
    assert_eq!(h.store.load().expect("load"), StoredTokens::default());
}

#[tokio::test]
async fn test_logout_survives_backend_failure() {
    let fresh = access_token(Duration::minutes(10), "a1");
    let h = harness(Some(&fresh), Some("refresh-1")).await;
    h.session.initialize().await;

    Mock::given(method("POST"))
        .and(path("/auth/logout/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;

    h.session.logout().await;
    assert_eq!(h.session.state(), AuthState::Unauthenticated);
    assert!(!h.session.has_session());
}
