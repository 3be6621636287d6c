//! # Dashboard Net
//!
//! Resilient network layer for the content dashboard: an authenticated HTTP
//! request pipeline with classified retries, a token store with single-flight
//! refresh, and a real-time WebSocket connection that reconnects, queues and
//! replays subscriptions on its own.
//!
//! ## Example
//!
//! ```no_run
//! use dashboard_net::{ApiClient, NetworkConfig, RealtimeClient};
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NetworkConfig::from_env()?;
//!     let tokens = config.token_store()?;
//!
//!     let api = ApiClient::builder(&config.api_base_url)?
//!         .token_store(tokens.clone())
//!         .retry_policy(config.retry_policy())
//!         .timeout(config.request_timeout())
//!         .build();
//!     let drafts: Value = api.get("content").await?;
//!     println!("{drafts}");
//!
//!     let realtime = RealtimeClient::new(&config.ws_url, config.realtime_options())?;
//!     realtime.connect(tokens.access_token().unwrap_or_default()).await?;
//!     realtime.subscribe("workspace:42").await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod channel;
pub mod client;
pub mod config;
pub mod http;
pub mod infrastructure;
pub mod messaging;
pub mod types;
pub mod websocket;

pub use auth::{AuthEvent, CredentialPair, TokenStore};
pub use channel::{ActivityFeed, AnalyticsStream, PresenceChannel, TypingIndicator};
pub use client::{ConnectionState, Delivery, RealtimeClient, RealtimeClientOptions};
pub use config::NetworkConfig;
pub use http::{ApiClient, RequestConfig, RetryPolicy, Upload};
pub use messaging::{ClientEvent, EventFilter, InboundEvent, MessageKind};
pub use types::{ApiError, ApiResult, ConfigError, RealtimeError, RealtimeMessage};
