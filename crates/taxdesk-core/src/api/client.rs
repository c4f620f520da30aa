//! API client for communicating with the taxdesk REST backend.
//!
//! Every request carries the session's bearer token and an `X-Request-Id`
//! correlation header. A 401 triggers exactly one token refresh followed by
//! exactly one retry; if the refresh fails the session is ended and the
//! caller receives `ApiError::SessionExpired`.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::{AuthError, SessionManager};
use crate::models::UserSummary;

use super::auth::{parse_json, ME_PATH};
use super::ApiError;

/// Correlation header sent with every request
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the shared HTTP client
pub fn build_http_client(timeout: Duration) -> Result<Client, ApiError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

pub(crate) fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Check if response is successful, returning a decoded error if not.
pub(crate) async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_response(status, &body))
    }
}

/// A request to the backend, kept in a form that can be re-issued after a
/// token refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    headers: HeaderMap,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The correlation id, once one has been set or generated
    pub fn request_id(&self) -> Option<&str> {
        self.headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
    }

    /// True after this request has been re-issued following a refresh
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    fn ensure_request_id(&mut self) -> Result<(), ApiError> {
        if !self.headers.contains_key(REQUEST_ID_HEADER) {
            let value = HeaderValue::from_str(&new_request_id())
                .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
            self.headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
        Ok(())
    }
}

/// API client for the taxdesk backend.
/// Clone is cheap - reqwest::Client and SessionManager share their state.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: SessionManager,
}

impl ApiClient {
    pub fn new(client: Client, base_url: impl Into<String>, session: SessionManager) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    async fn dispatch(&self, request: &ApiRequest) -> Result<reqwest::Response, ApiError> {
        let mut builder = self
            .client
            .request(request.method.clone(), self.url(&request.path))
            .headers(request.headers.clone());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = self.session.access_token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        Ok(builder.send().await?)
    }

    /// Send a request, refreshing the session and retrying once on 401.
    pub async fn send(&self, mut request: ApiRequest) -> Result<reqwest::Response, ApiError> {
        request.ensure_request_id()?;

        loop {
            let response = self.dispatch(&request).await?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return check_response(response).await;
            }
            if request.retried {
                warn!(
                    path = %request.path,
                    request_id = request.request_id().unwrap_or_default(),
                    "Request rejected again after token refresh"
                );
                return Err(ApiError::Unauthorized);
            }

            request.retried = true;
            debug!(
                path = %request.path,
                request_id = request.request_id().unwrap_or_default(),
                "Access token rejected, refreshing"
            );

            match self.session.refresh().await {
                Ok(_) => {}
                // Signed out or signed in again while refreshing. The request
                // belonged to the old session and is not replayed under the
                // new one.
                Err(AuthError::SessionEnded) => {
                    debug!(path = %request.path, "Session replaced during refresh, dropping request");
                    return Err(ApiError::SessionExpired);
                }
                Err(e) => {
                    warn!(error = %e, path = %request.path, "Token refresh failed, ending session");
                    self.session.sign_out();
                    return Err(ApiError::SessionExpired);
                }
            }
        }
    }

    /// Send a request and decode its JSON body
    pub async fn fetch_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let path = request.path.clone();
        let response = self.send(request).await?;
        parse_json(response, &path).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.fetch_json(ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.fetch_json(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.fetch_json(ApiRequest::put(path).json(body)?).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.fetch_json(ApiRequest::patch(path).json(body)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(path)).await?;
        Ok(())
    }

    /// Fetch the signed-in user's profile and remember it on the session
    pub async fn current_user(&self) -> Result<UserSummary, ApiError> {
        let user: UserSummary = self.get(ME_PATH).await?;
        self.session.set_user(user.clone());
        Ok(user)
    }
}
