use super::envelope::unwrap_envelope;
use super::retry::{ResponseClass, RetryPolicy, parse_retry_after};
use crate::auth::{TokenStore, is_expired};
use crate::infrastructure::{Clock, TokioClock};
use crate::types::constants::headers;
use crate::types::{ApiError, ApiResult, DEFAULT_TIMEOUT, ErrorKind};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;
use uuid::Uuid;

/// Bookkeeping for one outbound call, across its retries
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub id: Uuid,
    pub retry_count: u32,
    pub started_at: Instant,
    /// Set once the single 401 refresh-and-retry has been spent
    pub retried_401: bool,
}

impl PendingRequest {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            retry_count: 0,
            started_at: Instant::now(),
            retried_401: false,
        }
    }
}

impl Default for PendingRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-call overrides
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    /// Replaces the client-wide timeout for this call
    pub timeout: Option<Duration>,
    /// Skip the session token and API key
    pub anonymous: bool,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }
}

/// A file sent as `multipart/form-data`, with optional text fields
#[derive(Debug, Clone)]
pub struct Upload {
    pub field_name: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub fields: Vec<(String, String)>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            field_name: "file".to_string(),
            file_name: file_name.into(),
            content_type: None,
            bytes: bytes.into(),
            fields: Vec::new(),
        }
    }

    pub fn field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = name.into();
        self
    }

    pub fn content_type(mut self, mime: impl Into<String>) -> Self {
        self.content_type = Some(mime.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Forms are single-use, so every attempt builds a new one
    fn to_form(&self) -> reqwest::Result<Form> {
        let mut part = Part::bytes(self.bytes.clone()).file_name(self.file_name.clone());
        if let Some(mime) = &self.content_type {
            part = part.mime_str(mime)?;
        }

        let mut form = Form::new();
        for (name, value) in &self.fields {
            form = form.text(name.clone(), value.clone());
        }
        Ok(form.part(self.field_name.clone(), part))
    }
}

enum Body {
    Empty,
    Json(Value),
    Multipart(Upload),
}

/// Authenticated JSON client with single-flight refresh and classified retries.
///
/// Every call gets an `X-Request-ID`, a bearer token (refreshed first when
/// expired) or the API key, and the retry policy below:
///
/// - 401: refresh once and retry once; a second 401 is an [`ErrorKind::Auth`]
/// - 429: wait `Retry-After` seconds (capped) while the retry budget lasts
/// - 5xx and network failures: exponential backoff while the budget lasts
/// - other 4xx: fail immediately
///
/// Failures reach the caller as [`ApiError`].
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    tokens: Option<TokenStore>,
    retry: RetryPolicy,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

/// Builder for [`ApiClient`]
pub struct ApiClientBuilder {
    base_url: Url,
    api_key: Option<String>,
    tokens: Option<TokenStore>,
    retry: RetryPolicy,
    timeout: Duration,
    clock: Arc<dyn Clock>,
    http: Option<reqwest::Client>,
}

impl ApiClientBuilder {
    pub fn new(base_url: impl AsRef<str>) -> ApiResult<Self> {
        let base_url = Url::parse(base_url.as_ref()).map_err(|e| {
            ApiError::new(ErrorKind::Config, format!("Invalid base URL: {e}"), base_url.as_ref())
        })?;

        Ok(Self {
            base_url,
            api_key: None,
            tokens: None,
            retry: RetryPolicy::default(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT),
            clock: Arc::new(TokioClock),
            http: None,
        })
    }

    /// Sent as `X-API-Key` when there is no session token
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn token_store(mut self, tokens: TokenStore) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the clock used for retry backoff
    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> ApiClient {
        ApiClient {
            inner: Arc::new(ApiClientInner {
                http: self.http.unwrap_or_default(),
                base_url: self.base_url,
                api_key: self.api_key,
                tokens: self.tokens,
                retry: self.retry,
                timeout: self.timeout,
                clock: self.clock,
            }),
        }
    }
}

impl ApiClient {
    pub fn builder(base_url: impl AsRef<str>) -> ApiResult<ApiClientBuilder> {
        ApiClientBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.execute(Method::GET, path, Body::Empty, RequestConfig::default())
            .await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = json_body(body, path)?;
        self.execute(Method::POST, path, body, RequestConfig::default())
            .await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = json_body(body, path)?;
        self.execute(Method::PUT, path, body, RequestConfig::default())
            .await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = json_body(body, path)?;
        self.execute(Method::PATCH, path, body, RequestConfig::default())
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.execute(Method::DELETE, path, Body::Empty, RequestConfig::default())
            .await
    }

    /// POSTs a multipart upload
    pub async fn upload<T: DeserializeOwned>(&self, path: &str, upload: Upload) -> ApiResult<T> {
        self.execute(
            Method::POST,
            path,
            Body::Multipart(upload),
            RequestConfig::default(),
        )
        .await
    }

    /// Fully general call; `body` is sent as JSON when present
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        config: RequestConfig,
    ) -> ApiResult<T> {
        let body = body.map_or(Body::Empty, Body::Json);
        self.execute(method, path, body, config).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Body,
        config: RequestConfig,
    ) -> ApiResult<T> {
        let url = self.endpoint(path, &config.query)?;
        let mut pending = PendingRequest::new();
        let retry = &self.inner.retry;

        loop {
            let token = if config.anonymous {
                None
            } else {
                self.resolve_token().await
            };

            tracing::debug!(
                request_id = %pending.id,
                attempt = pending.retry_count,
                "{} {}",
                method,
                path
            );
            let request = self.build_request(
                &method,
                &url,
                &body,
                &config,
                &pending,
                token.as_deref(),
                path,
            )?;

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) if e.is_builder() => {
                    return Err(ApiError::new(
                        ErrorKind::Config,
                        format!("Invalid request: {e}"),
                        path,
                    ));
                }
                Err(e) => {
                    if retry.can_retry(pending.retry_count) {
                        pending.retry_count += 1;
                        let delay = retry.backoff_delay(pending.retry_count);
                        tracing::warn!(
                            request_id = %pending.id,
                            "Network error on {}: {}; retry {}/{} in {}ms",
                            path,
                            e,
                            pending.retry_count,
                            retry.max_retries,
                            delay.as_millis()
                        );
                        self.inner.clock.sleep(delay).await;
                        continue;
                    }
                    tracing::error!(request_id = %pending.id, "Request to {} failed: {}", path, e);
                    return Err(ApiError::new(
                        ErrorKind::Network,
                        format!("Network error: {e}"),
                        path,
                    ));
                }
            };

            let status = response.status();
            match ResponseClass::of(status) {
                ResponseClass::Success => {
                    tracing::debug!(
                        request_id = %pending.id,
                        elapsed_ms = pending.started_at.elapsed().as_millis() as u64,
                        "{} {} -> {}",
                        method,
                        path,
                        status
                    );
                    return decode(response, path).await;
                }
                ResponseClass::Unauthorized => {
                    let tokens = match &self.inner.tokens {
                        Some(tokens) if !pending.retried_401 && !config.anonymous => tokens,
                        _ => return Err(error_from(response, ErrorKind::Auth, path).await),
                    };

                    pending.retried_401 = true;
                    tracing::info!(request_id = %pending.id, "401 on {}, refreshing token", path);
                    if let Err(e) = tokens.refresh_access_token().await {
                        return Err(ApiError::new(
                            ErrorKind::Auth,
                            format!("Session expired: {}", e.message),
                            path,
                        )
                        .with_status(StatusCode::UNAUTHORIZED.as_u16()));
                    }
                }
                ResponseClass::RateLimited => {
                    let retry_after =
                        parse_retry_after(response.headers().get(headers::RETRY_AFTER));
                    if !retry.can_retry(pending.retry_count) {
                        return Err(
                            error_from(response, ErrorKind::RateLimit { retry_after }, path).await,
                        );
                    }

                    pending.retry_count += 1;
                    let delay = retry.rate_limit_delay(retry_after);
                    tracing::warn!(
                        request_id = %pending.id,
                        "Rate limited on {}; retry {}/{} in {}ms",
                        path,
                        pending.retry_count,
                        retry.max_retries,
                        delay.as_millis()
                    );
                    self.inner.clock.sleep(delay).await;
                }
                ResponseClass::Retryable => {
                    if !retry.can_retry(pending.retry_count) {
                        return Err(error_from(response, ErrorKind::Server, path).await);
                    }

                    pending.retry_count += 1;
                    let delay = retry.backoff_delay(pending.retry_count);
                    tracing::warn!(
                        request_id = %pending.id,
                        "{} on {}; retry {}/{} in {}ms",
                        status,
                        path,
                        pending.retry_count,
                        retry.max_retries,
                        delay.as_millis()
                    );
                    self.inner.clock.sleep(delay).await;
                }
                ResponseClass::Fatal => {
                    return Err(error_from(response, ErrorKind::Client, path).await);
                }
            }
        }
    }

    /// Current access token, refreshed first if expired. A failed refresh
    /// yields no token and leaves recovery to the 401 path.
    async fn resolve_token(&self) -> Option<String> {
        let tokens = self.inner.tokens.as_ref()?;
        let token = tokens.access_token()?;
        if !is_expired(&token) {
            return Some(token);
        }

        tracing::debug!("Access token expired, refreshing before dispatch");
        match tokens.refresh_access_token().await {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!("Pre-request refresh failed: {}", e.message);
                None
            }
        }
    }

    fn endpoint(&self, path: &str, query: &[(String, String)]) -> ApiResult<Url> {
        let joined = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!(
                "{}/{}",
                self.inner.base_url.as_str().trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        };

        let mut url = Url::parse(&joined).map_err(|e| {
            ApiError::new(ErrorKind::Config, format!("Invalid request URL: {e}"), path)
        })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_request(
        &self,
        method: &Method,
        url: &Url,
        body: &Body,
        config: &RequestConfig,
        pending: &PendingRequest,
        token: Option<&str>,
        path: &str,
    ) -> ApiResult<reqwest::RequestBuilder> {
        let mut request = self
            .inner
            .http
            .request(method.clone(), url.clone())
            .timeout(config.timeout.unwrap_or(self.inner.timeout))
            .header(headers::REQUEST_ID, pending.id.to_string());

        match (token, &self.inner.api_key) {
            (Some(token), _) => request = request.bearer_auth(token),
            (None, Some(key)) if !config.anonymous => {
                request = request.header(headers::API_KEY, key);
            }
            _ => {}
        }

        for (name, value) in &config.headers {
            request = request.header(name, value);
        }

        let request = match body {
            Body::Empty => request,
            Body::Json(value) => request.json(value),
            Body::Multipart(upload) => {
                let form = upload.to_form().map_err(|e| {
                    ApiError::new(ErrorKind::Config, format!("Invalid upload: {e}"), path)
                })?;
                request.multipart(form)
            }
        };
        Ok(request)
    }
}

fn json_body<B: Serialize + ?Sized>(body: &B, path: &str) -> ApiResult<Body> {
    serde_json::to_value(body).map(Body::Json).map_err(|e| {
        ApiError::new(ErrorKind::Config, format!("Failed to serialize body: {e}"), path)
    })
}

/// Decodes a 2xx body. Empty bodies decode as `null`, non-JSON bodies as a string.
async fn decode<T: DeserializeOwned>(response: Response, path: &str) -> ApiResult<T> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(|e| {
        ApiError::new(ErrorKind::Network, format!("Failed to read body: {e}"), path)
            .with_status(status.as_u16())
    })?;

    let body = if bytes.is_empty() || status == StatusCode::NO_CONTENT {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };

    let data = unwrap_envelope(body, path).map_err(|e| e.with_status(status.as_u16()))?;
    serde_json::from_value(data).map_err(|e| {
        ApiError::new(
            ErrorKind::Decode,
            format!("Unexpected response shape: {e}"),
            path,
        )
        .with_status(status.as_u16())
    })
}

/// Normalizes an error response, picking `message` and `code` out of a JSON body
async fn error_from(response: Response, kind: ErrorKind, path: &str) -> ApiError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let body: Option<Value> = serde_json::from_str(&text).ok();

    let message = body
        .as_ref()
        .and_then(|b| b.get("message").or_else(|| b.get("error")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });

    let mut err = ApiError::new(kind, message, path).with_status(status.as_u16());
    if let Some(code) = body.as_ref().and_then(|b| b.get("code")).and_then(Value::as_str) {
        err = err.with_code(code);
    }
    if let Some(body) = body {
        err = err.with_details(body);
    }

    tracing::debug!("{} on {}: {}", status, path, err.message);
    err
}
