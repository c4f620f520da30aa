//! Application state management for the taxdesk console.
//!
//! This module contains the core `App` struct that owns the session manager,
//! the authenticated API client, navigation state with its route guard, and
//! the background task plumbing.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use taxdesk_core::api::{build_http_client, ApiClient, AuthApi};
use taxdesk_core::auth::{open_store, ActivityEvent, AuthError, AuthState, SessionManager, WatchdogHandle};
use taxdesk_core::guard::{self, guard_admin_route, guard_route, GuardDecision};
use taxdesk_core::models::UserSummary;
use taxdesk_core::Config;

use crate::ui::boundary::{ErrorBoundary, RecoveryAction};

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the background task message channel.
const CHANNEL_BUFFER_SIZE: usize = 8;

/// Maximum length for email input.
/// 254 is the longest address SMTP allows.
const MAX_EMAIL_LENGTH: usize = 254;

/// Maximum length for password input.
/// 128 chars accommodates password managers and passphrases.
const MAX_PASSWORD_LENGTH: usize = 128;

/// Maximum length for the go-to-path prompt.
const MAX_PATH_LENGTH: usize = 200;

/// Depth of the back-navigation history.
const MAX_HISTORY: usize = 32;

// ============================================================================
// UI State Types
// ============================================================================

/// A screen of the console, addressed by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    Register,
    ForgotPassword,
    Terms,
    Privacy,
    Home,
    Admin,
    NotFound(String),
}

impl Route {
    pub fn from_path(path: &str) -> Self {
        match guard::normalize_path(path) {
            "/" | guard::HOME => Route::Home,
            guard::LOGIN => Route::Login,
            guard::REGISTER => Route::Register,
            guard::FORGOT_PASSWORD => Route::ForgotPassword,
            guard::TERMS => Route::Terms,
            guard::PRIVACY => Route::Privacy,
            guard::ADMIN => Route::Admin,
            other => Route::NotFound(other.to_string()),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Route::Login => guard::LOGIN,
            Route::Register => guard::REGISTER,
            Route::ForgotPassword => guard::FORGOT_PASSWORD,
            Route::Terms => guard::TERMS,
            Route::Privacy => guard::PRIVACY,
            Route::Home => guard::HOME,
            Route::Admin => guard::ADMIN,
            Route::NotFound(path) => path,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Route::Login => "Sign in",
            Route::Register => "Create account",
            Route::ForgotPassword => "Password recovery",
            Route::Terms => "Terms of use",
            Route::Privacy => "Privacy policy",
            Route::Home => "Home",
            Route::Admin => "Administration",
            Route::NotFound(_) => "Not found",
        }
    }

    /// Screens drawn inside the error boundary
    pub fn is_protected(&self) -> bool {
        !guard::is_public_route(self.path())
    }
}

/// Overall application state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Normal,
    EnteringPath,
    ShowingHelp,
    ConfirmingQuit,
    Quitting,
}

/// Login form focus state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoginFocus {
    Email,
    Password,
    Button,
}

// ============================================================================
// Background Task Results
// ============================================================================

/// Results sent back from background tasks.
#[derive(Debug)]
pub enum BackgroundResult {
    Profile(Result<UserSummary, String>),
}

// ============================================================================
// Main Application Struct
// ============================================================================

/// Main application state container
pub struct App {
    // Core services
    pub config: Config,
    pub session: SessionManager,
    pub api: ApiClient,
    watchdog: Option<WatchdogHandle>,
    auth_rx: watch::Receiver<AuthState>,

    // Navigation
    pub state: AppState,
    pub route: Route,
    history: Vec<Route>,
    pub path_input: String,

    // Login form
    pub login_email: String,
    pub login_password: String,
    pub login_focus: LoginFocus,
    pub login_error: Option<String>,

    // Rendering
    pub boundary: ErrorBoundary,
    pub status_message: Option<String>,

    // Background tasks
    background_tx: mpsc::Sender<BackgroundResult>,
    background_rx: mpsc::Receiver<BackgroundResult>,
}

impl App {
    /// Create a new application instance. Nothing touches the network
    /// until `start` is called.
    pub fn new(config: Config) -> Result<Self> {
        let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));
        debug!(?cache_dir, backend = ?config.credential_backend, "Opening credential store");
        let store = open_store(config.credential_backend, cache_dir);

        let http = build_http_client(config.request_timeout()).context("Failed to build HTTP client")?;
        let auth = AuthApi::new(http.clone(), config.api_base_url());
        let session = SessionManager::new(auth, store, config.session.clone());
        let api = ApiClient::new(http, config.api_base_url(), session.clone());
        let auth_rx = session.subscribe();
        let (background_tx, background_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);

        let login_email = config.last_username.clone().unwrap_or_default();
        let login_focus = if login_email.is_empty() {
            LoginFocus::Email
        } else {
            LoginFocus::Password
        };

        Ok(Self {
            config,
            session,
            api,
            watchdog: None,
            auth_rx,
            state: AppState::Normal,
            route: Route::Home,
            history: Vec::new(),
            path_input: String::new(),
            login_email,
            login_password: String::new(),
            login_focus,
            login_error: None,
            boundary: ErrorBoundary::new(),
            status_message: None,
            background_tx,
            background_rx,
        })
    }

    /// Restore the session, start the watchdog and route to the first screen
    pub async fn start(&mut self) {
        let state = self.session.initialize().await;
        info!(state = state.label(), "Session initialized");
        self.auth_rx.borrow_and_update();
        self.watchdog = Some(self.session.start_watchdog());
        self.apply_guard();
    }

    /// Stop background work before exit
    pub async fn shutdown(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.dispose().await;
        }
    }

    pub fn notify_activity(&self, event: ActivityEvent) {
        if let Some(ref watchdog) = self.watchdog {
            watchdog.notify(event);
        }
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Open `path`, keeping the current screen in the history
    pub fn navigate(&mut self, path: &str) {
        let route = Route::from_path(path);
        if route == self.route {
            return;
        }
        self.history.push(std::mem::replace(&mut self.route, route));
        if self.history.len() > MAX_HISTORY {
            self.history.remove(0);
        }
        self.apply_guard();
    }

    /// Open `path` in place of the current screen
    pub fn replace(&mut self, path: &str) {
        self.route = Route::from_path(path);
        self.apply_guard();
    }

    /// Return to the previous screen. Returns false when there is none.
    pub fn go_back(&mut self) -> bool {
        match self.history.pop() {
            Some(route) => {
                self.route = route;
                self.apply_guard();
                true
            }
            None => false,
        }
    }

    pub fn can_go_back(&self) -> bool {
        !self.history.is_empty()
    }

    /// Run the route guard for the current screen and follow its redirect
    pub fn apply_guard(&mut self) {
        let authenticated = self.session.is_authenticated();
        let decision = match guard_route(authenticated, self.route.path()) {
            GuardDecision::Render if self.route == Route::Admin => {
                guard_admin_route(authenticated, self.session.user().as_ref())
            }
            decision => decision,
        };

        if let GuardDecision::Redirect { to, replace } = decision {
            debug!(from = self.route.path(), to, "Route guard redirect");
            let target = Route::from_path(to);
            let previous = std::mem::replace(&mut self.route, target);
            if !replace {
                self.history.push(previous);
            }
            if self.route == Route::Login {
                self.start_login();
            }
        }
    }

    /// Whether the current screen may be drawn right now. The watchdog can
    /// end the session between the guard running and the frame being drawn.
    pub fn can_render_route(&self) -> bool {
        !self.route.is_protected() || self.session.is_authenticated()
    }

    /// React to session changes published by the session manager
    pub fn check_auth_changes(&mut self) {
        if !self.auth_rx.has_changed().unwrap_or(false) {
            return;
        }
        let state = *self.auth_rx.borrow_and_update();
        debug!(state = state.label(), "Auth state observed");

        if state == AuthState::Unauthenticated {
            self.history.clear();
            if self.route.is_protected() {
                self.status_message = Some("Session ended. Please sign in again.".to_string());
            }
        }
        self.apply_guard();
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Reset the login form for a fresh attempt
    pub fn start_login(&mut self) {
        self.login_password.clear();
        self.login_focus = if self.login_email.is_empty() {
            LoginFocus::Email
        } else {
            LoginFocus::Password
        };
    }

    /// Attempt login with the credentials from the login form
    pub async fn attempt_login(&mut self) -> Result<()> {
        let email = self.login_email.trim().to_string();
        let password = self.login_password.clone();

        if email.is_empty() || password.is_empty() {
            self.login_error = Some("Email and password required".to_string());
            return Err(anyhow::anyhow!("Email and password required"));
        }

        self.login_error = None;

        match self.session.sign_in(&email, &password).await {
            Ok(user) => {
                self.config.last_username = Some(email.clone());
                if let Err(e) = self.config.save() {
                    warn!(error = %e, "Failed to save config");
                }

                self.login_password.clear();
                let who = user.as_ref().map(|u| u.display_name().to_string()).unwrap_or(email);
                self.status_message = Some(format!("Signed in as {}", who));
                info!("Login successful");
                self.apply_guard();
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                self.login_error = Some(login_error_message(&e));
                self.login_password.clear();
                Err(e.into())
            }
        }
    }

    /// Sign out, revoking the refresh token on the backend
    pub async fn logout(&mut self) {
        self.session.logout().await;
        self.history.clear();
        self.status_message = Some("Signed out".to_string());
        self.apply_guard();
    }

    /// Reload the user profile without blocking the UI
    pub fn reload_profile_background(&mut self) {
        let api = self.api.clone();
        let tx = self.background_tx.clone();
        self.status_message = Some("Reloading profile...".to_string());

        tokio::spawn(async move {
            let result = api.current_user().await.map_err(|e| e.user_message());
            if tx.send(BackgroundResult::Profile(result)).await.is_err() {
                debug!("App closed before profile reload finished");
            }
        });
    }

    /// Check for completed background tasks and process results
    pub fn check_background_tasks(&mut self) {
        while let Ok(result) = self.background_rx.try_recv() {
            match result {
                BackgroundResult::Profile(Ok(user)) => {
                    debug!(user_id = user.id, "Profile reloaded");
                    self.status_message = Some(format!("Profile loaded for {}", user.display_name()));
                    self.apply_guard();
                }
                BackgroundResult::Profile(Err(message)) => {
                    warn!(error = %message, "Profile reload failed");
                    self.status_message = Some(format!("Profile reload failed: {}", message));
                }
            }
        }
    }

    // =========================================================================
    // Error boundary
    // =========================================================================

    pub fn recover(&mut self, action: RecoveryAction) {
        self.boundary.reset();
        match action {
            RecoveryAction::Reload => {
                info!(path = self.route.path(), "Reloading screen after render failure");
                self.reload_profile_background();
            }
            RecoveryAction::GoToLogin => {
                info!(path = self.route.path(), "Leaving failed screen for login");
                self.session.sign_out();
                self.history.clear();
                self.replace(guard::LOGIN);
            }
        }
    }
}

fn login_error_message(err: &AuthError) -> String {
    match err {
        AuthError::Rejected(message) => message.clone(),
        AuthError::Network(_) => {
            "Unable to connect to server. Check your network connection.".to_string()
        }
        other => format!("Login failed: {}", other),
    }
}

// ============================================================================
// Input validation helpers (exported for use in input.rs)
// ============================================================================

/// Check if a character is valid for input (no control characters)
fn is_valid_input_char(c: char) -> bool {
    !c.is_control()
}

/// Check if an email character should be accepted
pub fn can_add_email_char(current_len: usize, c: char) -> bool {
    current_len < MAX_EMAIL_LENGTH && is_valid_input_char(c) && !c.is_whitespace()
}

/// Check if a password character should be accepted
pub fn can_add_password_char(current_len: usize, c: char) -> bool {
    current_len < MAX_PASSWORD_LENGTH && is_valid_input_char(c)
}

/// Check if a path character should be accepted
pub fn can_add_path_char(current_len: usize, c: char) -> bool {
    current_len < MAX_PATH_LENGTH && is_valid_input_char(c) && !c.is_whitespace()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use taxdesk_core::config::CredentialBackend;

    fn test_app() -> App {
        let config = Config {
            credential_backend: CredentialBackend::Memory,
            ..Config::default()
        };
        App::new(config).expect("app")
    }

    // -------------------------------------------------------------------------
    // Route Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_route_from_path() {
        assert_eq!(Route::from_path("/"), Route::Home);
        assert_eq!(Route::from_path("/home/"), Route::Home);
        assert_eq!(Route::from_path("/login?next=/admin"), Route::Login);
        assert_eq!(Route::from_path("/forgot-password"), Route::ForgotPassword);
        assert_eq!(
            Route::from_path("/clients/9"),
            Route::NotFound("/clients/9".to_string())
        );
    }

    #[test]
    fn test_route_paths_round_trip() {
        for route in [
            Route::Login,
            Route::Register,
            Route::ForgotPassword,
            Route::Terms,
            Route::Privacy,
            Route::Home,
            Route::Admin,
        ] {
            assert_eq!(Route::from_path(route.path()), route);
        }
    }

    #[test]
    fn test_protected_routes() {
        assert!(Route::Home.is_protected());
        assert!(Route::Admin.is_protected());
        assert!(Route::NotFound("/x".to_string()).is_protected());
        assert!(!Route::Login.is_protected());
        assert!(!Route::Privacy.is_protected());
    }

    // -------------------------------------------------------------------------
    // Navigation Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_signed_out_navigation_is_redirected_to_login() {
        let mut app = test_app();
        app.apply_guard();
        assert_eq!(app.route, Route::Login);

        app.navigate("/admin");
        assert_eq!(app.route, Route::Login);

        app.navigate("/per-dcomp/12");
        assert_eq!(app.route, Route::Login);
    }

    #[test]
    fn test_protected_screen_needs_live_session() {
        let mut app = test_app();
        // Guard has not run yet, as when the session ends mid-frame
        assert_eq!(app.route, Route::Home);
        assert!(!app.can_render_route());

        app.route = Route::Terms;
        assert!(app.can_render_route());
    }

    #[test]
    fn test_public_pages_and_back_navigation() {
        let mut app = test_app();
        app.replace(guard::LOGIN);
        assert!(!app.can_go_back());

        app.navigate("/terms");
        assert_eq!(app.route, Route::Terms);
        app.navigate("/privacy");
        assert_eq!(app.route, Route::Privacy);

        assert!(app.go_back());
        assert_eq!(app.route, Route::Terms);
        assert!(app.go_back());
        assert_eq!(app.route, Route::Login);
        assert!(!app.go_back());
    }

    #[test]
    fn test_recover_to_login_clears_history() {
        let mut app = test_app();
        app.replace(guard::LOGIN);
        app.navigate("/register");
        app.recover(RecoveryAction::GoToLogin);

        assert_eq!(app.route, Route::Login);
        assert!(!app.can_go_back());
        assert_eq!(app.session.state(), AuthState::Unauthenticated);
    }

    #[test]
    fn test_last_username_prefills_login() {
        let config = Config {
            credential_backend: CredentialBackend::Memory,
            last_username: Some("ana@escritorio.com.br".to_string()),
            ..Config::default()
        };
        let app = App::new(config).expect("app");
        assert_eq!(app.login_email, "ana@escritorio.com.br");
        assert_eq!(app.login_focus, LoginFocus::Password);
    }

    #[tokio::test]
    async fn test_empty_login_is_rejected_locally() {
        let mut app = test_app();
        assert!(app.attempt_login().await.is_err());
        assert_eq!(app.login_error.as_deref(), Some("Email and password required"));
    }

    // -------------------------------------------------------------------------
    // Input Validation Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_can_add_email_char() {
        assert!(can_add_email_char(0, 'a'));
        assert!(can_add_email_char(253, '@'));
        assert!(!can_add_email_char(254, 'a'));
        assert!(!can_add_email_char(0, ' '));
        assert!(!can_add_email_char(0, '\x00'));
        assert!(!can_add_email_char(0, '\n'));
    }

    #[test]
    fn test_can_add_password_char() {
        assert!(can_add_password_char(0, 'a'));
        assert!(can_add_password_char(127, '!'));
        assert!(can_add_password_char(3, ' '));
        assert!(!can_add_password_char(128, 'a'));
        assert!(!can_add_password_char(0, '\x00'));
        assert!(!can_add_password_char(0, '\r'));
    }

    #[test]
    fn test_can_add_path_char() {
        assert!(can_add_path_char(0, '/'));
        assert!(!can_add_path_char(0, ' '));
        assert!(!can_add_path_char(200, 'a'));
    }
}
