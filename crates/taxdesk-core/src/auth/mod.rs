//! Authentication module for managing the console session.
//!
//! This module provides:
//! - `CredentialStore`: persistence of the access/refresh token pair
//!   (OS keychain, cache file, or memory)
//! - `Session`, `AuthState`: the session entity and its lifecycle states
//! - `SessionManager`: sign-in, single-flight refresh, validity checks and
//!   sign-out
//! - `watchdog`: the background task that re-validates the session on a
//!   timer and after focus/visibility changes
//!
//! Access tokens are refreshed two minutes before they expire.

pub mod credentials;
pub mod error;
pub mod manager;
pub mod session;
pub mod token;
pub mod watchdog;

pub use credentials::{
    open_store, CredentialStore, FileCredentialStore, KeyringCredentialStore,
    MemoryCredentialStore, StoreError, StoredToken, StoredTokens,
};
pub use error::AuthError;
pub use manager::{SessionManager, TokenCheck};
pub use session::{AuthState, Session};
pub use watchdog::{ActivityEvent, ActivitySender, ActivityTracker, WatchdogHandle};
