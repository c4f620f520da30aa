//! Raw calls to the backend's auth endpoints.
//!
//! These requests bypass the 401 refresh-and-retry of `ApiClient`: a
//! rejected refresh must end the session, not trigger another refresh.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::UserSummary;

use super::client::{check_response, new_request_id, REQUEST_ID_HEADER};
use super::ApiError;

const LOGIN_PATH: &str = "/auth/login/";
const REFRESH_PATH: &str = "/auth/refresh/";
const LOGOUT_PATH: &str = "/auth/logout/";
pub(crate) const ME_PATH: &str = "/auth/me/";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Tokens and profile returned by a successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    #[serde(default)]
    pub user: Option<UserSummary>,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// Result of a refresh exchange. `refresh` is present when the backend
/// rotated the refresh token.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Client for the auth endpoints.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct AuthApi {
    client: Client,
    base_url: String,
}

impl AuthApi {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .header(REQUEST_ID_HEADER, new_request_id())
            .json(&LoginRequest { email, password })
            .send()
            .await?;
        let response = check_response(response).await?;
        parse_json(response, LOGIN_PATH).await
    }

    /// Exchange a refresh token for a new access token
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        let response = self
            .client
            .post(self.url(REFRESH_PATH))
            .header(REQUEST_ID_HEADER, new_request_id())
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .send()
            .await?;
        let response = check_response(response).await?;
        let refreshed: RefreshResponse = parse_json(response, REFRESH_PATH).await?;
        debug!(rotated = refreshed.refresh.is_some(), "Token refresh exchanged");
        Ok(refreshed)
    }

    /// Ask the backend to revoke a refresh token
    pub async fn logout(&self, refresh_token: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(LOGOUT_PATH))
            .header(REQUEST_ID_HEADER, new_request_id())
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }

    /// Profile of the user owning `access_token`
    pub async fn current_user(&self, access_token: &str) -> Result<UserSummary, ApiError> {
        let response = self
            .client
            .get(self.url(ME_PATH))
            .bearer_auth(access_token)
            .header(REQUEST_ID_HEADER, new_request_id())
            .send()
            .await?;
        let response = check_response(response).await?;
        parse_json(response, ME_PATH).await
    }
}

pub(crate) async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    path: &str,
) -> Result<T, ApiError> {
    let text = response.text().await?;
    serde_json::from_str(&text)
        .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", path, e)))
}
