use super::{ClientState, ConnectionManager, ConnectionState, RealtimeClient};
use crate::infrastructure::{Clock, TokioClock};
use crate::types::{
    DEFAULT_MAX_RECONNECT_ATTEMPTS, HEARTBEAT_INTERVAL, MAX_OUTBOUND_QUEUE_SIZE, Result,
};
use crate::websocket::{Connector, WebSocketFactory};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use url::Url;

#[derive(Debug, Clone)]
pub struct RealtimeClientOptions {
    pub heartbeat_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub max_queue_size: usize,
    /// Stamped on outbound frames that do not carry one
    pub user_id: Option<String>,
    /// Stamped on outbound frames that do not carry one
    pub workspace_id: Option<String>,
}

impl Default for RealtimeClientOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(HEARTBEAT_INTERVAL),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            max_queue_size: MAX_OUTBOUND_QUEUE_SIZE,
            user_id: None,
            workspace_id: None,
        }
    }
}

/// Builder for RealtimeClient that handles initialization
pub struct RealtimeClientBuilder {
    endpoint: Url,
    options: RealtimeClientOptions,
    connector: Arc<dyn Connector>,
    clock: Arc<dyn Clock>,
}

impl RealtimeClientBuilder {
    /// Create a new builder
    pub fn new(endpoint: impl AsRef<str>, options: RealtimeClientOptions) -> Result<Self> {
        let endpoint = Url::parse(endpoint.as_ref())?;

        Ok(Self {
            endpoint,
            options,
            connector: Arc::new(WebSocketFactory),
            clock: Arc::new(TokioClock),
        })
    }

    /// Replace the transport (tests, proxies)
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Replace the clock used for reconnect backoff
    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Build the client and spawn background tasks
    pub fn build(self) -> RealtimeClient {
        let client = RealtimeClient {
            endpoint: self.endpoint,
            connection: Arc::new(ConnectionManager::new(self.options.max_queue_size)),
            state: Arc::new(RwLock::new(ClientState::new(
                self.options.max_reconnect_attempts,
            ))),
            options: self.options,
            connector: self.connector,
            clock: self.clock,
            shutdown: Arc::new(Notify::new()),
        };

        // Spawn reconnection watcher task
        let client_for_watcher = client.clone();
        let mut rx = client.connection.watch();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = *rx.borrow_and_update();

                if state == ConnectionState::Reconnecting {
                    tracing::info!("State watcher detected lost connection, reconnecting...");
                    client_for_watcher.reconnect_loop().await;
                }
            }
            tracing::info!("Reconnection watcher task finished");
        });

        client
    }
}
