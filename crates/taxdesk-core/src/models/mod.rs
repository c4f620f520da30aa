//! Data models shared between the core library and the frontends.
//!
//! Business records (clients, PER/DCOMP requests) are served by the backend
//! and fetched as JSON through `ApiClient`; only the signed-in user's summary
//! is modelled here.

pub mod user;

pub use user::{UserRole, UserSummary};
