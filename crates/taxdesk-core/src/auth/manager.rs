//! Session lifecycle management.
//!
//! `SessionManager` owns the console session: it restores persisted tokens
//! at startup, decides when the access token needs refreshing, performs the
//! refresh exchange (one at a time, shared by every concurrent caller) and
//! ends the session when credentials are missing, corrupt or rejected.
//!
//! State changes are published on a `tokio::sync::watch` channel so the
//! frontend can re-run its route guard whenever the session starts or ends.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::AuthApi;
use crate::config::SessionTimings;
use crate::models::UserSummary;

use super::credentials::{
    CredentialStore, StoredToken, StoredTokens, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
};
use super::token::{self, TokenStatus};
use super::watchdog::{self, WatchdogHandle};
use super::{AuthError, AuthState, Session};

type RefreshFuture = Shared<BoxFuture<'static, Result<String, AuthError>>>;

/// Outcome of `SessionManager::check_token_validity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCheck {
    /// The access token is good for longer than the refresh lookahead
    Valid,
    /// A new access token was obtained
    Refreshed,
    /// The session could not be kept and has been ended
    SignedOut,
}

/// Handle to the console session.
/// Clone is cheap - all clones share the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    auth: AuthApi,
    store: Arc<dyn CredentialStore>,
    timings: SessionTimings,
    session: RwLock<Session>,
    state: watch::Sender<AuthState>,
    // Keyed by the generation the exchange was started for
    in_flight: Mutex<Option<(u64, RefreshFuture)>>,
    // Bumped under the session write lock whenever the session is replaced
    // or ended, so a refresh that started for an older session can neither
    // write its tokens back nor be joined by the new session.
    generation: AtomicU64,
}

impl Inner {
    fn session(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn session_mut(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a new state; returns false when nothing changed
    fn publish(&self, state: AuthState) -> bool {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                debug!(from = ?*current, to = ?state, "Auth state changed");
                *current = state;
                true
            }
        })
    }

    fn persist(&self, key: &str, value: &str, ttl: chrono::Duration) {
        if let Err(e) = self.store.set(key, &StoredToken::new(value, ttl)) {
            warn!(error = %e, key, "Failed to persist token");
        }
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Start a new session generation. Takes the session write guard so
    /// the bump cannot interleave with a refresh writing its result; state
    /// changes are published under the same guard to keep them in order.
    fn next_generation(&self, _session: &mut Session) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn forget_in_flight(&self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    async fn exchange(self: Arc<Self>, generation: u64) -> Result<String, AuthError> {
        let refresh_token = {
            let session = self.session();
            if self.current_generation() != generation {
                return Err(AuthError::SessionEnded);
            }
            session
                .refresh_token
                .clone()
                .ok_or(AuthError::MissingRefreshToken)?
        };

        let refreshed = self.auth.refresh(&refresh_token).await?;

        {
            let mut session = self.session_mut();
            if self.current_generation() != generation {
                debug!("Discarding refresh result for an ended session");
                return Err(AuthError::SessionEnded);
            }

            self.persist(ACCESS_TOKEN_KEY, &refreshed.access, self.timings.access_token_ttl());
            if let Some(ref rotated) = refreshed.refresh {
                self.persist(REFRESH_TOKEN_KEY, rotated, self.timings.refresh_token_ttl());
            }

            session.access_token = Some(refreshed.access.clone());
            if let Some(rotated) = refreshed.refresh {
                session.refresh_token = Some(rotated);
            }
            self.publish(AuthState::Authenticated);
        }

        info!("Access token refreshed");
        Ok(refreshed.access)
    }
}

impl SessionManager {
    pub fn new(auth: AuthApi, store: Arc<dyn CredentialStore>, timings: SessionTimings) -> Self {
        let (state, _) = watch::channel(AuthState::Uninitialized);
        Self {
            inner: Arc::new(Inner {
                auth,
                store,
                timings,
                session: RwLock::new(Session::default()),
                state,
                in_flight: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> AuthState {
        *self.inner.state.borrow()
    }

    /// Receive every auth state transition
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    pub fn timings(&self) -> &SessionTimings {
        &self.inner.timings
    }

    /// Snapshot of the current session
    pub fn session(&self) -> Session {
        self.inner.session().clone()
    }

    pub fn has_session(&self) -> bool {
        self.inner.session().has_credentials()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.session().access_token.clone()
    }

    pub fn user(&self) -> Option<UserSummary> {
        self.inner.session().user.clone()
    }

    pub fn is_admin(&self) -> bool {
        self.inner.session().is_admin()
    }

    pub fn set_user(&self, user: UserSummary) {
        self.inner.session_mut().user = Some(user);
    }

    /// Restore the persisted session and settle on a stable state.
    ///
    /// Runs once; later calls return the current state.
    pub async fn initialize(&self) -> AuthState {
        if self.state() != AuthState::Uninitialized {
            debug!(state = ?self.state(), "Session already initialized");
            return self.state();
        }
        self.inner.publish(AuthState::Initializing);

        let tokens = match self.inner.store.load() {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "Failed to read stored credentials");
                StoredTokens::default()
            }
        };
        *self.inner.session_mut() = Session::from_stored(tokens);

        if !self.has_session() {
            info!("No stored session");
            self.inner.publish(AuthState::Unauthenticated);
            return self.state();
        }

        if self.check_token_validity().await != TokenCheck::SignedOut {
            // A sign-out racing the check wins
            let restored = {
                let session = self.inner.session();
                if session.has_credentials() {
                    self.inner.publish(AuthState::Authenticated);
                }
                session.has_credentials()
            };
            if restored {
                self.load_user().await;
                info!("Session restored");
            }
        }
        self.state()
    }

    async fn load_user(&self) {
        let Some(access) = self.access_token() else {
            return;
        };
        match self.inner.auth.current_user(&access).await {
            Ok(user) => {
                debug!(user_id = user.id, "Loaded user profile");
                self.set_user(user);
            }
            Err(e) => warn!(error = %e, "Failed to load user profile"),
        }
    }

    /// Decide from the token expiry alone whether the session needs a
    /// refresh, and perform it. Failures end the session; they are never
    /// returned to the caller.
    pub async fn check_token_validity(&self) -> TokenCheck {
        let (access, has_refresh) = {
            let session = self.inner.session();
            (session.access_token.clone(), session.refresh_token.is_some())
        };

        let Some(access) = access else {
            if !has_refresh {
                debug!("No credentials present");
                self.sign_out();
                return TokenCheck::SignedOut;
            }
            return self.refresh_or_sign_out("access token missing").await;
        };

        match token::decode_expiry(&access) {
            Err(e) => {
                warn!(error = %e, "Access token is corrupt");
                self.sign_out();
                TokenCheck::SignedOut
            }
            Ok(expires_at) => {
                let lookahead = self.inner.timings.refresh_lookahead();
                match TokenStatus::classify(expires_at, Utc::now(), lookahead) {
                    TokenStatus::Fresh => TokenCheck::Valid,
                    TokenStatus::ExpiringSoon => {
                        self.refresh_or_sign_out("access token expiring soon").await
                    }
                    TokenStatus::Expired => self.refresh_or_sign_out("access token expired").await,
                }
            }
        }
    }

    async fn refresh_or_sign_out(&self, reason: &'static str) -> TokenCheck {
        debug!(reason, "Refreshing session");
        match self.refresh().await {
            Ok(_) => TokenCheck::Refreshed,
            // The session this refresh was for is gone; whatever replaced it
            // is left alone
            Err(AuthError::SessionEnded) => {
                debug!(reason, "Refresh outlived its session");
                if self.has_session() {
                    TokenCheck::Valid
                } else {
                    TokenCheck::SignedOut
                }
            }
            Err(e) => {
                warn!(error = %e, reason, "Token refresh failed");
                self.sign_out();
                TokenCheck::SignedOut
            }
        }
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Concurrent callers of the same session share a single exchange and
    /// all receive its result. An exchange started before a sign-out or
    /// sign-in is never joined by the session that follows; it resolves to
    /// `AuthError::SessionEnded`. The caller decides what a failure means.
    pub async fn refresh(&self) -> Result<String, AuthError> {
        let flight = {
            let mut slot = self.inner.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            let generation = self.inner.current_generation();
            match slot.as_ref() {
                Some((started_for, flight)) if *started_for == generation => {
                    debug!("Joining in-flight token refresh");
                    flight.clone()
                }
                _ => {
                    let flight = self.inner.clone().exchange(generation).boxed().shared();
                    *slot = Some((generation, flight.clone()));
                    flight
                }
            }
        };

        let result = flight.clone().await;

        let mut slot = self.inner.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|(_, current)| current.ptr_eq(&flight)) {
            *slot = None;
        }
        result
    }

    /// Sign in with email and password, replacing any existing session
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Option<UserSummary>, AuthError> {
        let login = self.inner.auth.login(email, password).await?;

        let has_user = login.user.is_some();
        {
            let mut session = self.inner.session_mut();
            self.inner.next_generation(&mut session);
            self.inner
                .persist(ACCESS_TOKEN_KEY, &login.access, self.inner.timings.access_token_ttl());
            self.inner
                .persist(REFRESH_TOKEN_KEY, &login.refresh, self.inner.timings.refresh_token_ttl());
            *session = Session {
                access_token: Some(login.access),
                refresh_token: Some(login.refresh),
                user: login.user,
            };
            self.inner.publish(AuthState::Authenticated);
        }
        self.inner.forget_in_flight();
        info!("Signed in");

        if !has_user {
            self.load_user().await;
        }
        Ok(self.user())
    }

    /// End the session and forget the persisted tokens. Safe to call when
    /// already signed out.
    pub fn sign_out(&self) {
        let (had_session, changed) = {
            let mut session = self.inner.session_mut();
            self.inner.next_generation(&mut session);
            let had_session = session.has_credentials() || session.user.is_some();
            session.clear();
            if let Err(e) = self.inner.store.clear() {
                warn!(error = %e, "Failed to clear stored credentials");
            }
            (had_session, self.inner.publish(AuthState::Unauthenticated))
        };
        self.inner.forget_in_flight();

        if changed || had_session {
            info!("Signed out");
        }
    }

    /// Revoke the refresh token on the backend (best effort), then sign out
    pub async fn logout(&self) {
        let refresh = self.inner.session().refresh_token.clone();
        if let Some(refresh) = refresh {
            if let Err(e) = self.inner.auth.logout(&refresh).await {
                warn!(error = %e, "Backend logout failed");
            }
        }
        self.sign_out();
    }

    /// Start the background task that re-validates the session. The task
    /// runs until the returned handle is disposed or dropped.
    pub fn start_watchdog(&self) -> WatchdogHandle {
        watchdog::spawn(self.clone())
    }

    #[cfg(test)]
    pub(crate) fn seed(&self, session: Session, state: AuthState) {
        *self.inner.session_mut() = session;
        self.inner.publish(state);
    }
}
