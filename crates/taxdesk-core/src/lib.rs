//! Core library for taxdesk.
//!
//! Taxdesk is an administration console for a client/company registry and
//! PER/DCOMP tax-compensation request tracking. This crate holds everything
//! the console needs to stay signed in against the REST backend:
//!
//! - `auth`: credential store, token decoding, and the `SessionManager`
//!   state machine with its refresh watchdog
//! - `api`: the authenticated `ApiClient` and the raw auth endpoints
//! - `guard`: route guards deciding which screens may be shown
//! - `config`: application configuration and session timings
//! - `models`: data shared with the frontends

pub mod api;
pub mod auth;
pub mod config;
pub mod guard;
pub mod models;
pub mod utils;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthState, SessionManager};
pub use config::Config;
