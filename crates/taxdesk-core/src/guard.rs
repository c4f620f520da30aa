//! Route guards.
//!
//! Decides whether a screen may be shown for the current session. Public
//! screens (login, registration, password recovery, legal pages) render
//! for everyone; every other screen requires a session. A signed-in user
//! opening the login or registration screen is sent home instead.

use crate::models::UserSummary;

pub const LOGIN: &str = "/login";
pub const REGISTER: &str = "/register";
pub const FORGOT_PASSWORD: &str = "/forgot-password";
pub const TERMS: &str = "/terms";
pub const PRIVACY: &str = "/privacy";
pub const HOME: &str = "/home";
pub const ADMIN: &str = "/admin";

/// Screens reachable without a session
pub const PUBLIC_ROUTES: [&str; 5] = [LOGIN, REGISTER, FORGOT_PASSWORD, TERMS, PRIVACY];

/// Entry points a signed-in user has no business on
const SIGNED_OUT_ENTRY_POINTS: [&str; 2] = [LOGIN, REGISTER];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Show the requested screen
    Render,
    /// Navigate elsewhere. `replace` means the requested screen must not
    /// stay in the navigation history.
    Redirect { to: &'static str, replace: bool },
}

impl GuardDecision {
    fn redirect(to: &'static str) -> Self {
        GuardDecision::Redirect { to, replace: true }
    }
}

/// Strip query string, fragment and trailing slash
pub fn normalize_path(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

pub fn is_public_route(path: &str) -> bool {
    PUBLIC_ROUTES.contains(&normalize_path(path))
}

/// Guard for every screen.
pub fn guard_route(is_authenticated: bool, path: &str) -> GuardDecision {
    let path = normalize_path(path);
    if is_authenticated {
        if SIGNED_OUT_ENTRY_POINTS.contains(&path) {
            return GuardDecision::redirect(HOME);
        }
    } else if !PUBLIC_ROUTES.contains(&path) {
        return GuardDecision::redirect(LOGIN);
    }
    GuardDecision::Render
}

/// Guard for administrator screens, applied on top of `guard_route`.
/// An unknown profile is treated as not an administrator.
pub fn guard_admin_route(is_authenticated: bool, user: Option<&UserSummary>) -> GuardDecision {
    if !is_authenticated {
        return GuardDecision::redirect(LOGIN);
    }
    if user.is_some_and(UserSummary::is_admin) {
        GuardDecision::Render
    } else {
        GuardDecision::redirect(HOME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;

    fn user(role: UserRole) -> UserSummary {
        UserSummary {
            id: 7,
            email: "ana@escritorio.com.br".to_string(),
            name: None,
            role,
        }
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/login/"), "/login");
        assert_eq!(normalize_path("/login?next=/home"), "/login");
        assert_eq!(normalize_path("/terms#section-2"), "/terms");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn test_public_routes() {
        for route in PUBLIC_ROUTES {
            assert!(is_public_route(route), "{} should be public", route);
        }
        assert!(is_public_route("/register/"));
        assert!(!is_public_route(HOME));
        assert!(!is_public_route("/clients/12"));
        assert!(!is_public_route("/login-help"));
    }

    #[test]
    fn test_signed_out_user_is_sent_to_login() {
        assert_eq!(
            guard_route(false, "/clients"),
            GuardDecision::Redirect { to: LOGIN, replace: true }
        );
        assert_eq!(guard_route(false, LOGIN), GuardDecision::Render);
        assert_eq!(guard_route(false, PRIVACY), GuardDecision::Render);
    }

    #[test]
    fn test_signed_in_user_is_sent_home_from_entry_points() {
        assert_eq!(
            guard_route(true, "/login?next=/clients"),
            GuardDecision::Redirect { to: HOME, replace: true }
        );
        assert_eq!(
            guard_route(true, REGISTER),
            GuardDecision::Redirect { to: HOME, replace: true }
        );
        assert_eq!(guard_route(true, TERMS), GuardDecision::Render);
        assert_eq!(guard_route(true, FORGOT_PASSWORD), GuardDecision::Render);
        assert_eq!(guard_route(true, "/per-dcomp"), GuardDecision::Render);
        assert_eq!(guard_route(true, HOME), GuardDecision::Render);
    }

    #[test]
    fn test_admin_guard() {
        let admin = user(UserRole::Admin);
        let staff = user(UserRole::User);

        assert_eq!(guard_admin_route(true, Some(&admin)), GuardDecision::Render);
        assert_eq!(
            guard_admin_route(true, Some(&staff)),
            GuardDecision::Redirect { to: HOME, replace: true }
        );
        assert_eq!(
            guard_admin_route(true, None),
            GuardDecision::Redirect { to: HOME, replace: true }
        );
        assert_eq!(
            guard_admin_route(false, Some(&admin)),
            GuardDecision::Redirect { to: LOGIN, replace: true }
        );
    }
}
