//! Session store: the credential bundle and its token lifecycle.
//!
//! `SessionStore` is the only component that reads or writes persisted
//! credentials. It is a cheap `Arc` handle; clones share one bundle and one
//! in-flight refresh.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::storage::SessionStorage;
use crate::api::ApiError;
use crate::config::Config;
use crate::models::UserProfile;

const TOKEN_PATH: &str = "/token/";
const REFRESH_PATH: &str = "/token/refresh/";
const VERIFY_PATH: &str = "/token/verify/";

/// Access token, refresh token and the signed-in user, persisted as one unit.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialBundle {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshFailure {
    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("{0}")]
    Rejected(String),

    #[error("Failed to refresh token: {0}")]
    Network(String),

    #[error("Session was cleared while refreshing")]
    SessionCleared,

    #[error("Failed to persist refreshed token: {0}")]
    Storage(String),
}

#[derive(Clone, PartialEq, Eq)]
pub enum RefreshResult {
    Success { access_token: String },
    Failure { reason: RefreshFailure },
}

impl RefreshResult {
    fn failure(reason: RefreshFailure) -> Self {
        RefreshResult::Failure { reason }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RefreshResult::Success { .. })
    }

    pub fn access_token(&self) -> Option<&str> {
        match self {
            RefreshResult::Success { access_token } => Some(access_token),
            RefreshResult::Failure { .. } => None,
        }
    }
}

impl fmt::Debug for RefreshResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshResult::Success { .. } => f.write_str("Success { access_token: <redacted> }"),
            RefreshResult::Failure { reason } => {
                f.debug_struct("Failure").field("reason", reason).finish()
            }
        }
    }
}

/// Session validity as observed from outside the store.
///
/// `Expired` is only entered lazily, when the backend reports the access
/// token invalid; there is no expiry timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    Active,
    Expired,
    Refreshing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::NoSession => write!(f, "Not logged in"),
            SessionState::Active => write!(f, "Active"),
            SessionState::Expired => write!(f, "Expired"),
            SessionState::Refreshing => write!(f, "Refreshing"),
        }
    }
}

/// Outcome of checking one access token against the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenCheck {
    Valid,
    Invalid,
    /// The backend could not be reached; says nothing about the token.
    Unreachable,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    access: String,
    refresh: String,
    #[serde(default)]
    user: Option<UserProfile>,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
    /// Present when the backend rotates refresh tokens.
    #[serde(default)]
    refresh: Option<String>,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
}

type SharedRefresh = Shared<BoxFuture<'static, RefreshResult>>;

/// The in-flight slot only holds a weak handle: once every caller awaiting the
/// refresh is gone, the request is dropped and the slot reads as empty.
type WeakRefresh = WeakShared<BoxFuture<'static, RefreshResult>>;

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    http: Client,
    base_url: String,
    storage: Box<dyn SessionStorage>,
    bundle: RwLock<Option<CredentialBundle>>,
    expired: AtomicBool,
    verify_cache: Option<Duration>,
    /// Last access token the backend confirmed, and when.
    verified: Mutex<Option<(String, Instant)>>,
    in_flight: Mutex<Option<WeakRefresh>>,
}

impl SessionStore {
    /// Create a store with its own HTTP client and load any persisted bundle.
    pub fn new(config: &Config, storage: Box<dyn SessionStorage>) -> Result<Self> {
        let http = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self::with_client(http, config, storage))
    }

    /// Create a store sharing an existing connection pool.
    pub fn with_client(http: Client, config: &Config, storage: Box<dyn SessionStorage>) -> Self {
        let bundle = match storage.load() {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable persisted session");
                None
            }
        };
        debug!(has_session = bundle.is_some(), "Session loaded");

        Self {
            inner: Arc::new(Inner {
                http,
                base_url: config.api_url.trim_end_matches('/').to_string(),
                storage,
                bundle: RwLock::new(bundle),
                expired: AtomicBool::new(false),
                verify_cache: config.verify_cache(),
                verified: Mutex::new(None),
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn http_client(&self) -> &Client {
        &self.inner.http
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    // ===== Credential bundle =====

    /// Replace the credential bundle. Storage failures are returned to the caller.
    pub fn store_credentials(
        &self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        user: Option<UserProfile>,
    ) -> Result<()> {
        self.inner.store(CredentialBundle {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            user,
        })
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner
            .read_bundle()
            .as_ref()
            .map(|b| b.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner
            .read_bundle()
            .as_ref()
            .map(|b| b.refresh_token.clone())
    }

    pub fn user_profile(&self) -> Option<UserProfile> {
        self.inner
            .read_bundle()
            .as_ref()
            .and_then(|b| b.user.clone())
    }

    /// Presence check only; an expired token still counts.
    pub fn has_session(&self) -> bool {
        self.inner.read_bundle().is_some()
    }

    /// Drop the whole bundle. Clearing an empty store is a no-op.
    pub fn clear_session(&self) -> Result<()> {
        self.inner.clear()
    }

    pub fn state(&self) -> SessionState {
        if self.inner.current_refresh().is_some() {
            return SessionState::Refreshing;
        }
        if !self.has_session() {
            SessionState::NoSession
        } else if self.inner.expired.load(Ordering::SeqCst) {
            SessionState::Expired
        } else {
            SessionState::Active
        }
    }

    // ===== Login / logout =====

    /// Exchange a username (or e-mail) and password for a new session.
    pub async fn login(&self, username: &str, password: &str) -> Result<Option<UserProfile>, ApiError> {
        let url = self.inner.endpoint(TOKEN_PATH);
        let response = self
            .inner
            .http
            .post(&url)
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            info!(username, "Login rejected");
            return Err(ApiError::InvalidCredentials);
        }

        let body = response.text().await?;
        if !status.is_success() {
            warn!(status = %status, "Login failed");
            return Err(ApiError::from_status(status, &body));
        }

        let tokens: LoginResponse = serde_json::from_str(&body).map_err(|e| {
            warn!(error = %e, "Failed to parse login response");
            ApiError::generic_http(status.as_u16())
        })?;

        self.store_credentials(tokens.access, tokens.refresh, tokens.user.clone())
            .map_err(|e| ApiError::Storage(e.to_string()))?;
        info!(username, "Logged in");
        Ok(tokens.user)
    }

    pub fn logout(&self) -> Result<()> {
        info!("Logging out");
        self.clear_session()
    }

    // ===== Token lifecycle =====

    /// Ask the backend whether the stored access token is still valid.
    ///
    /// No token short-circuits to invalid without a request; an unreachable
    /// backend also reads as invalid.
    pub async fn verify_access_token(&self) -> Verification {
        let Some(token) = self.access_token() else {
            return Verification { valid: false };
        };
        Verification {
            valid: self.inner.check_token(&token).await == TokenCheck::Valid,
        }
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Concurrent callers share one request. A rejected refresh token or a
    /// transport failure clears the whole session.
    pub async fn refresh_access_token(&self) -> RefreshResult {
        self.refresh_replacing(None).await
    }

    pub(crate) async fn check_access_token(&self, token: &str) -> TokenCheck {
        self.inner.check_token(token).await
    }

    /// Refresh on behalf of a caller that found `stale` unusable.
    ///
    /// If `stale` has already been replaced since the caller read it, the
    /// replacement is returned without another request.
    pub(crate) async fn refresh_replacing(&self, stale: Option<&str>) -> RefreshResult {
        let pending = {
            let mut slot = self.inner.lock_in_flight();
            match slot.as_ref().and_then(WeakShared::upgrade) {
                Some(pending) => {
                    debug!("Joining in-flight token refresh");
                    pending
                }
                None => {
                    if let (Some(stale), Some(current)) = (stale, self.access_token()) {
                        if current != stale {
                            debug!("Access token already refreshed");
                            return RefreshResult::Success {
                                access_token: current,
                            };
                        }
                    }
                    let inner = Arc::clone(&self.inner);
                    let pending = async move {
                        let result = inner.exchange_refresh_token().await;
                        inner.lock_in_flight().take();
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = pending.downgrade();
                    pending
                }
            }
        };
        pending.await
    }
}

impl Inner {
    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn read_bundle(&self) -> RwLockReadGuard<'_, Option<CredentialBundle>> {
        self.bundle.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_bundle(&self) -> RwLockWriteGuard<'_, Option<CredentialBundle>> {
        self.bundle.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<WeakRefresh>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The refresh still being awaited by someone, if any.
    fn current_refresh(&self) -> Option<SharedRefresh> {
        self.lock_in_flight().as_ref().and_then(WeakShared::upgrade)
    }

    fn lock_verified(&self) -> MutexGuard<'_, Option<(String, Instant)>> {
        self.verified.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reset_validity(&self) {
        self.expired.store(false, Ordering::SeqCst);
        self.lock_verified().take();
    }

    fn store(&self, bundle: CredentialBundle) -> Result<()> {
        let mut guard = self.write_bundle();
        self.storage.save(&bundle)?;
        *guard = Some(bundle);
        self.reset_validity();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut guard = self.write_bundle();
        let had_session = guard.take().is_some();
        self.reset_validity();
        if had_session {
            debug!("Session cleared");
        }
        self.storage.clear()
    }

    /// Clear the session unless a newer login has replaced the refresh token
    /// that just failed.
    fn discard_refresh_token(&self, failed: &str) {
        let still_current = self
            .read_bundle()
            .as_ref()
            .is_some_and(|b| b.refresh_token == failed);
        if still_current {
            if let Err(e) = self.clear() {
                error!(error = %e, "Failed to clear session after refresh failure");
            }
        }
    }

    fn is_recently_verified(&self, token: &str) -> bool {
        let Some(window) = self.verify_cache else {
            return false;
        };
        self.lock_verified()
            .as_ref()
            .is_some_and(|(verified, at)| verified == token && at.elapsed() < window)
    }

    async fn check_token(&self, token: &str) -> TokenCheck {
        if self.is_recently_verified(token) {
            debug!("Using cached token verification");
            return TokenCheck::Valid;
        }

        let result = self
            .http
            .post(self.endpoint(VERIFY_PATH))
            .json(&VerifyRequest { token })
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                if self.verify_cache.is_some() {
                    *self.lock_verified() = Some((token.to_string(), Instant::now()));
                }
                TokenCheck::Valid
            }
            Ok(response) => {
                debug!(status = %response.status(), "Access token rejected by verify");
                let is_current = self
                    .read_bundle()
                    .as_ref()
                    .is_some_and(|b| b.access_token == token);
                if is_current {
                    self.expired.store(true, Ordering::SeqCst);
                }
                TokenCheck::Invalid
            }
            Err(e) => {
                warn!(error = %e, "Token verification failed");
                TokenCheck::Unreachable
            }
        }
    }

    async fn exchange_refresh_token(&self) -> RefreshResult {
        let refresh = match self.read_bundle().as_ref() {
            Some(bundle) => bundle.refresh_token.clone(),
            None => {
                debug!("No refresh token available");
                return RefreshResult::failure(RefreshFailure::NoRefreshToken);
            }
        };

        info!("Refreshing access token");
        let sent = self
            .http
            .post(self.endpoint(REFRESH_PATH))
            .json(&RefreshRequest { refresh: &refresh })
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Token refresh request failed");
                self.discard_refresh_token(&refresh);
                return RefreshResult::failure(RefreshFailure::Network(ApiError::from(e).to_string()));
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to read token refresh response");
                self.discard_refresh_token(&refresh);
                return RefreshResult::failure(RefreshFailure::Network(ApiError::from(e).to_string()));
            }
        };

        if !status.is_success() {
            warn!(status = %status, "Refresh token rejected");
            self.discard_refresh_token(&refresh);
            let reason = ApiError::extract_message(&body)
                .unwrap_or_else(|| "Session expired. Please log in again.".to_string());
            return RefreshResult::failure(RefreshFailure::Rejected(reason));
        }

        let tokens: RefreshResponse = match serde_json::from_str(&body) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "Failed to parse token refresh response");
                self.discard_refresh_token(&refresh);
                return RefreshResult::failure(RefreshFailure::Rejected(
                    "Unexpected token refresh response".to_string(),
                ));
            }
        };

        self.apply_refresh(&refresh, tokens)
    }

    /// Write the new access token into the bundle that was refreshed.
    fn apply_refresh(&self, used_refresh: &str, tokens: RefreshResponse) -> RefreshResult {
        let mut guard = self.write_bundle();
        let next = match guard.as_ref() {
            None => {
                info!("Session cleared during refresh, discarding new token");
                return RefreshResult::failure(RefreshFailure::SessionCleared);
            }
            Some(current) if current.refresh_token != used_refresh => {
                debug!("Session replaced during refresh, keeping newer credentials");
                return RefreshResult::Success {
                    access_token: current.access_token.clone(),
                };
            }
            Some(current) => CredentialBundle {
                access_token: tokens.access,
                refresh_token: tokens.refresh.unwrap_or_else(|| current.refresh_token.clone()),
                user: current.user.clone(),
            },
        };

        if let Err(e) = self.storage.save(&next) {
            error!(error = %e, "Failed to persist refreshed token");
            guard.take();
            self.reset_validity();
            if let Err(e) = self.storage.clear() {
                error!(error = %e, "Failed to clear session storage");
            }
            return RefreshResult::failure(RefreshFailure::Storage(e.to_string()));
        }

        let access_token = next.access_token.clone();
        *guard = Some(next);
        self.reset_validity();
        info!("Access token refreshed");
        RefreshResult::Success { access_token }
    }
}
