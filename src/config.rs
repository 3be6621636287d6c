//! Environment-driven configuration.
//!
//! Variables use the `DASHBOARD_` prefix, e.g. `DASHBOARD_API_BASE_URL`,
//! `DASHBOARD_WS_URL`, `DASHBOARD_MAX_RETRIES`. A `.env` file in the working
//! directory is loaded first when present.

use crate::auth::{FileTokenStorage, MemoryTokenStorage, TokenStore};
use crate::client::RealtimeClientOptions;
use crate::http::RetryPolicy;
use crate::types::{
    ConfigError, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_MAX_RETRIES, DEFAULT_REFRESH_PATH,
    DEFAULT_RETRY_BASE_DELAY, DEFAULT_TIMEOUT, HEARTBEAT_INTERVAL, MAX_OUTBOUND_QUEUE_SIZE,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const ENV_PREFIX: &str = "DASHBOARD_";

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub api_base_url: String,
    pub ws_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    /// Credentials are kept in memory only when unset
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_base_delay_ms() -> u64 {
    DEFAULT_RETRY_BASE_DELAY
}

fn default_heartbeat_interval_ms() -> u64 {
    HEARTBEAT_INTERVAL
}

fn default_max_reconnect_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}

fn default_max_queue_size() -> usize {
    MAX_OUTBOUND_QUEUE_SIZE
}

impl NetworkConfig {
    /// Loads `.env` (if any) and then the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        Self::from_vars(std::env::vars())
    }

    /// Loads from explicit key/value pairs, prefix included
    pub fn from_vars(
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, ConfigError> {
        let config: Self = envy::prefixed(ENV_PREFIX).from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.api_base_url)?;
        Url::parse(&self.ws_url)?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    /// Connection manager options; identity fields are left for the caller
    pub fn realtime_options(&self) -> RealtimeClientOptions {
        RealtimeClientOptions {
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            max_reconnect_attempts: self.max_reconnect_attempts,
            max_queue_size: self.max_queue_size,
            ..Default::default()
        }
    }

    /// Refresh endpoint: `refresh_path` under the API base URL
    pub fn refresh_url(&self) -> Result<Url, ConfigError> {
        let joined = format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            self.refresh_path.trim_start_matches('/')
        );
        Ok(Url::parse(&joined)?)
    }

    /// Token store backed by `token_file`, or by memory when it is unset.
    /// Refresh calls use `request_timeout_ms`.
    pub fn token_store(&self) -> Result<TokenStore, ConfigError> {
        let refresh_url = self.refresh_url()?;
        let store = match &self.token_file {
            Some(path) => TokenStore::new(FileTokenStorage::new(path), refresh_url),
            None => TokenStore::new(MemoryTokenStorage::new(), refresh_url),
        };
        store.set_timeout(self.request_timeout());
        Ok(store)
    }
}
