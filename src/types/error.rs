use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Failure classes surfaced by the HTTP pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// 401 after the single refresh-and-retry, or a failed refresh.
    Auth,
    /// 429 with retries exhausted. `retry_after` is the server-advertised wait in seconds.
    RateLimit { retry_after: u64 },
    /// 5xx with retries exhausted.
    Server,
    /// No response reached us (connect failure, reset, timeout).
    Network,
    /// Any other 4xx; never retried.
    Client,
    /// The request could not be built (bad URL, bad body, bad multipart part).
    Config,
    /// The backend answered 2xx with an envelope whose `success` is `false`.
    Rejected,
    /// A 2xx body that does not match the type the caller asked for.
    Decode,
}

impl ErrorKind {
    /// Default machine-readable code for this kind
    pub fn default_code(&self) -> &'static str {
        match self {
            Self::Auth => "AUTH_ERROR",
            Self::RateLimit { .. } => "RATE_LIMITED",
            Self::Server => "SERVER_ERROR",
            Self::Network => "NETWORK_ERROR",
            Self::Client => "CLIENT_ERROR",
            Self::Config => "CONFIG_ERROR",
            Self::Rejected => "REQUEST_REJECTED",
            Self::Decode => "DECODE_ERROR",
        }
    }
}

/// The normalized error every terminal HTTP failure is converted into.
///
/// `status` is `0` when no response was received.
#[derive(Error, Debug, Clone, Serialize)]
#[error("{message} ({code}, status {status}, path {path})")]
pub struct ApiError {
    #[serde(flatten)]
    pub kind: ErrorKind,
    pub message: String,
    pub status: u16,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<Value>>,
    pub timestamp: DateTime<Utc>,
    pub path: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, path: impl Into<String>) -> Self {
        let code = kind.default_code().to_string();
        Self {
            kind,
            message: message.into(),
            status: 0,
            code,
            details: None,
            timestamp: Utc::now(),
            path: path.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(Box::new(details));
        self
    }

    pub fn is_auth(&self) -> bool {
        self.kind == ErrorKind::Auth
    }

    /// Server-advertised wait for rate-limit failures
    pub fn retry_after(&self) -> Option<u64> {
        match self.kind {
            ErrorKind::RateLimit { retry_after } => Some(retry_after),
            _ => None,
        }
    }
}

/// Convenience type alias for HTTP pipeline results.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Errors raised by the real-time connection layer.
///
/// Transport failures after `connect` are reported as events, so most of these only
/// appear at the transport seam and in setup.
#[derive(Error, Debug)]
pub enum RealtimeError {
    /// WebSocket protocol error (connection failed, invalid frame, etc.)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// General connection error with descriptive message
    #[error("Connection error: {0}")]
    Connection(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing error (malformed endpoint URL)
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Convenience type alias for `Result<T, RealtimeError>`.
pub type Result<T> = std::result::Result<T, RealtimeError>;

/// Errors from durable credential storage.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored credentials are corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Errors loading [`NetworkConfig`](crate::config::NetworkConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid environment configuration: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid URL in configuration: {0}")]
    UrlParse(#[from] url::ParseError),
}
