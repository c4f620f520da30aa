//! REST API client module for the taxdesk backend.
//!
//! This module provides the `ApiClient` for authenticated requests against
//! the backend (client registry, PER/DCOMP requests) and `AuthApi` for the
//! login/refresh/logout endpoints that the session manager drives.
//!
//! The API uses JWT bearer tokens; error responses may carry a structured
//! envelope that is decoded into `ApiError::Api`.

pub mod auth;
pub mod client;
pub mod error;

pub use auth::{AuthApi, LoginResponse, RefreshResponse};
pub use client::{build_http_client, ApiClient, ApiRequest, REQUEST_ID_HEADER};
pub use error::{ApiError, ApiErrorBody};
