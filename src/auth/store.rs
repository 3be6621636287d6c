use super::{CredentialPair, TokenStorage};
use crate::http::unwrap_envelope;
use crate::types::{ApiError, ApiResult, DEFAULT_TIMEOUT, ErrorKind, StorageError};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use url::Url;

const AUTH_EVENT_CAPACITY: usize = 16;

/// Session-level signals broadcast by the [`TokenStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// Credentials stored by a login
    SignedIn,
    /// Credentials removed by a logout
    SignedOut,
    /// A refresh failed and the credentials were cleared; the user must sign in again
    SessionExpired,
}

type RefreshFuture = Shared<BoxFuture<'static, ApiResult<String>>>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    refresh_token: Option<String>,
}

/// Owner of the credential pair and the single in-flight refresh.
///
/// Construct one per session and hand clones to every consumer; clones share
/// storage and the refresh handle, so concurrent callers of
/// [`refresh_access_token`](Self::refresh_access_token) trigger exactly one
/// request to the refresh endpoint.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Box<dyn TokenStorage>,
    http: reqwest::Client,
    refresh_url: Url,
    timeout: RwLock<Duration>,
    pending: Mutex<Option<RefreshFuture>>,
    events: broadcast::Sender<AuthEvent>,
}

impl TokenStore {
    pub fn new(storage: impl TokenStorage, refresh_url: Url) -> Self {
        Self::with_client(storage, refresh_url, reqwest::Client::new())
    }

    /// Uses a caller-provided HTTP client for the refresh call
    pub fn with_client(
        storage: impl TokenStorage,
        refresh_url: Url,
        http: reqwest::Client,
    ) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                storage: Box::new(storage),
                http,
                refresh_url,
                timeout: RwLock::new(Duration::from_millis(DEFAULT_TIMEOUT)),
                pending: Mutex::new(None),
                events,
            }),
        }
    }

    /// Timeout applied to each refresh request
    pub fn timeout(&self) -> Duration {
        *self.inner.timeout.read()
    }

    pub fn set_timeout(&self, timeout: Duration) {
        *self.inner.timeout.write() = timeout;
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.load().map(|pair| pair.access_token)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.load().map(|pair| pair.refresh_token)
    }

    pub fn credentials(&self) -> Option<CredentialPair> {
        self.inner.load()
    }

    /// Stores a freshly issued pair (login)
    pub fn set_credentials(&self, pair: CredentialPair) -> Result<(), StorageError> {
        self.inner.storage.save(&pair)?;
        tracing::info!("Credentials stored");
        let _ = self.inner.events.send(AuthEvent::SignedIn);
        Ok(())
    }

    /// Removes the pair (logout)
    pub fn clear(&self) -> Result<(), StorageError> {
        self.inner.storage.clear()?;
        tracing::info!("Credentials cleared");
        let _ = self.inner.events.send(AuthEvent::SignedOut);
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    /// True while a refresh request is outstanding
    pub fn is_refreshing(&self) -> bool {
        self.inner.pending.lock().is_some()
    }

    /// Exchanges the refresh token for a new access token.
    ///
    /// If a refresh is already in flight this awaits that one instead of
    /// starting another. The refresh runs on its own task, so it completes even
    /// if every caller is dropped. On failure the stored pair is cleared and
    /// [`AuthEvent::SessionExpired`] is broadcast; the failure is never retried.
    pub async fn refresh_access_token(&self) -> ApiResult<String> {
        let refresh = {
            let mut pending = self.inner.pending.lock();
            match pending.as_ref() {
                Some(in_flight) => {
                    tracing::debug!("Joining in-flight token refresh");
                    in_flight.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let path = inner.refresh_url.path().to_string();
                    let task = tokio::spawn(async move {
                        let result = inner.perform_refresh().await;
                        inner.pending.lock().take();
                        result
                    });

                    let refresh = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(ApiError::new(
                                ErrorKind::Auth,
                                format!("Token refresh task failed: {e}"),
                                path,
                            ))
                        })
                    }
                    .boxed()
                    .shared();

                    *pending = Some(refresh.clone());
                    refresh
                }
            }
        };

        refresh.await
    }
}

impl Inner {
    fn load(&self) -> Option<CredentialPair> {
        match self.storage.load() {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!("Failed to read stored credentials: {}", e);
                None
            }
        }
    }

    async fn perform_refresh(&self) -> ApiResult<String> {
        let path = self.refresh_url.path().to_string();

        let Some(refresh_token) = self.load().map(|pair| pair.refresh_token) else {
            tracing::warn!("No refresh token available");
            self.expire_session();
            return Err(ApiError::new(
                ErrorKind::Auth,
                "No refresh token available",
                path,
            ));
        };

        tracing::info!("Refreshing access token");
        match self.request_refresh(&refresh_token, &path).await {
            Ok(pair) => {
                if let Err(e) = self.storage.save(&pair) {
                    tracing::warn!("Failed to persist refreshed credentials: {}", e);
                }
                tracing::info!("Access token refreshed");
                Ok(pair.access_token)
            }
            Err(e) => {
                tracing::error!("Token refresh failed: {}", e);
                self.expire_session();
                Err(e)
            }
        }
    }

    async fn request_refresh(&self, refresh_token: &str, path: &str) -> ApiResult<CredentialPair> {
        let timeout = *self.timeout.read();
        let response = self
            .http
            .post(self.refresh_url.clone())
            .timeout(timeout)
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .map_err(|e| {
                ApiError::new(ErrorKind::Auth, format!("Refresh request failed: {e}"), path)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::new(
                ErrorKind::Auth,
                format!("Refresh rejected with status {status}"),
                path,
            )
            .with_status(status.as_u16()));
        }

        let auth_error = |message: String| {
            ApiError::new(ErrorKind::Auth, message, path).with_status(status.as_u16())
        };
        let body: Value = response
            .json()
            .await
            .map_err(|e| auth_error(format!("Invalid refresh response: {e}")))?;
        let body = unwrap_envelope(body, path).map_err(|e| auth_error(e.message))?;
        let refreshed: RefreshResponse = serde_json::from_value(body)
            .map_err(|e| auth_error(format!("Invalid refresh response: {e}")))?;

        Ok(CredentialPair {
            access_token: refreshed.access_token,
            refresh_token: refreshed
                .refresh_token
                .unwrap_or_else(|| refresh_token.to_string()),
        })
    }

    fn expire_session(&self) {
        if let Err(e) = self.storage.clear() {
            tracing::warn!("Failed to clear credentials: {}", e);
        }
        let _ = self.events.send(AuthEvent::SessionExpired);
    }
}
