//! Authenticated request gateway for the AI Orchestrator REST API.
//!
//! Every verb resolves a bearer token through the `SessionStore`, sends the
//! request, and on a 401 refreshes once and retries once. Credentials are
//! never written here; the session store owns them.

use reqwest::{header, Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::session::TokenCheck;
use crate::auth::{RefreshResult, SessionStorage, SessionStore};
use crate::config::Config;

/// Whether a request carries the session's bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Auth {
    #[default]
    Required,
    /// Content-type header only; no token, no refresh, no retry.
    Public,
}

/// A successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Json { status: u16, body: Value },
    /// 204, or any success with an empty body.
    NoContent { status: u16 },
}

impl ApiResponse {
    pub fn status(&self) -> u16 {
        match self {
            ApiResponse::Json { status, .. } | ApiResponse::NoContent { status } => *status,
        }
    }

    pub fn is_no_content(&self) -> bool {
        matches!(self, ApiResponse::NoContent { .. })
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            ApiResponse::Json { body, .. } => Some(body),
            ApiResponse::NoContent { .. } => None,
        }
    }

    /// Decode the body into `T`. A missing or mismatched body is an HTTP error.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        match self {
            ApiResponse::Json { status, body } => serde_json::from_value(body).map_err(|e| {
                warn!(error = %e, "Unexpected response body shape");
                ApiError::generic_http(status)
            }),
            ApiResponse::NoContent { status } => Err(ApiError::Http {
                status,
                message: format!("HTTP error, status {}: expected a response body", status),
            }),
        }
    }
}

/// API client for the orchestrator backend.
/// Clone is cheap - the HTTP client and session store are shared handles.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: SessionStore,
}

impl ApiClient {
    /// Create a client and session store from configuration.
    pub fn new(config: &Config, storage: Box<dyn SessionStorage>) -> anyhow::Result<Self> {
        let session = SessionStore::new(config, storage)?;
        Ok(Self::with_session(session))
    }

    /// Wrap an existing session store, sharing its connection pool.
    pub fn with_session(session: SessionStore) -> Self {
        Self {
            client: session.http_client().clone(),
            base_url: session.base_url().to_string(),
            session,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ===== Verbs =====

    pub async fn get(&self, path: &str, auth: Auth) -> Result<ApiResponse, ApiError> {
        self.request(Method::GET, path, None, auth).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        auth: Auth,
    ) -> Result<ApiResponse, ApiError> {
        let body = Self::encode(body)?;
        self.request(Method::POST, path, Some(body), auth).await
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        auth: Auth,
    ) -> Result<ApiResponse, ApiError> {
        let body = Self::encode(body)?;
        self.request(Method::PUT, path, Some(body), auth).await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        auth: Auth,
    ) -> Result<ApiResponse, ApiError> {
        let body = Self::encode(body)?;
        self.request(Method::PATCH, path, Some(body), auth).await
    }

    pub async fn delete(&self, path: &str, auth: Auth) -> Result<ApiResponse, ApiError> {
        self.request(Method::DELETE, path, None, auth).await
    }

    /// Authenticated GET decoded into `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get(path, Auth::Required).await?.json()
    }

    /// Authenticated POST decoded into `T`.
    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.post(path, body, Auth::Required).await?.json()
    }

    /// Authenticated PATCH decoded into `T`.
    pub async fn patch_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.patch(path, body, Auth::Required).await?.json()
    }

    /// Send one logical request: resolve token, send, refresh-and-retry once on 401.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        auth: Auth,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.url(path);

        if auth == Auth::Public {
            let response = self.send(&method, &url, body.as_ref(), None).await?;
            return Self::read_response(response).await;
        }

        let token = self.resolve_token().await?;
        let response = self
            .send(&method, &url, body.as_ref(), token.as_deref())
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::read_response(response).await;
        }

        debug!(%method, url = %url, "Request unauthorized, refreshing token");
        let fresh = match self.session.refresh_replacing(token.as_deref()).await {
            RefreshResult::Success { access_token } => access_token,
            RefreshResult::Failure { reason } => {
                warn!(%reason, "Token refresh failed after 401");
                return Err(ApiError::SessionExpired);
            }
        };

        let retry = self.send(&method, &url, body.as_ref(), Some(&fresh)).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            warn!(%method, url = %url, "Still unauthorized after token refresh");
            return Err(ApiError::SessionExpired);
        }
        Self::read_response(retry).await
    }

    // ===== Internals =====

    /// Pick the bearer token for an authenticated request.
    ///
    /// `Ok(None)` means send without credentials; the endpoint may be public.
    async fn resolve_token(&self) -> Result<Option<String>, ApiError> {
        let Some(token) = self.session.access_token() else {
            debug!("No access token, sending without credentials");
            return Ok(None);
        };

        match self.session.check_access_token(&token).await {
            TokenCheck::Valid => Ok(Some(token)),
            TokenCheck::Unreachable => Err(ApiError::Network(
                "could not reach the backend to verify the session".to_string(),
            )),
            TokenCheck::Invalid => match self.session.refresh_replacing(Some(&token)).await {
                RefreshResult::Success { access_token } => Ok(Some(access_token)),
                RefreshResult::Failure { reason } => {
                    debug!(%reason, "No usable token after refresh");
                    Ok(None)
                }
            },
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
        serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))
    }

    async fn send(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = self
            .client
            .request(method.clone(), url)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(%method, url, authenticated = token.is_some(), "Sending request");
        request.send().await.map_err(|e| {
            warn!(error = %e, url, "Request failed");
            ApiError::from(e)
        })
    }

    async fn read_response(response: reqwest::Response) -> Result<ApiResponse, ApiError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!(status = %status, "Request returned error status");
            return Err(ApiError::from_status(status, &body));
        }
        if status == StatusCode::NO_CONTENT || body.trim().is_empty() {
            return Ok(ApiResponse::NoContent {
                status: status.as_u16(),
            });
        }

        serde_json::from_str(&body)
            .map(|body| ApiResponse::Json {
                status: status.as_u16(),
                body,
            })
            .map_err(|e| {
                warn!(error = %e, status = %status, "Response body is not valid JSON");
                ApiError::generic_http(status.as_u16())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryStorage;
    use serde_json::json;

    fn client(base: &str) -> ApiClient {
        let config = Config {
            api_url: base.to_string(),
            ..Config::default()
        };
        ApiClient::new(&config, Box::new(MemoryStorage::new())).unwrap()
    }

    #[test]
    fn test_url_joining() {
        let api = client("http://localhost:8000/api/");
        assert_eq!(api.url("/jobs/"), "http://localhost:8000/api/jobs/");
        assert_eq!(api.url("jobs/"), "http://localhost:8000/api/jobs/");
        assert_eq!(
            api.url("http://localhost:8000/api/jobs/?page=2"),
            "http://localhost:8000/api/jobs/?page=2"
        );
    }

    #[test]
    fn test_response_json_decoding() {
        let response = ApiResponse::Json {
            status: 200,
            body: json!({"id": 1}),
        };
        let value: Value = response.clone().json().unwrap();
        assert_eq!(value["id"], 1);
        assert_eq!(response.status(), 200);

        let err = response.json::<Vec<i32>>().unwrap_err();
        assert_eq!(err, ApiError::generic_http(200));
    }

    #[test]
    fn test_no_content_is_explicit() {
        let response = ApiResponse::NoContent { status: 204 };
        assert!(response.is_no_content());
        assert_eq!(response.clone().into_value(), None);
        assert!(matches!(
            response.json::<Value>(),
            Err(ApiError::Http { status: 204, .. })
        ));
    }
}
