use super::{
    ClientState, ConnectionManager, ConnectionState, Delivery, EventBinding,
    RealtimeClientBuilder, RealtimeClientOptions,
};
use crate::infrastructure::{Clock, HeartbeatManager};
use crate::messaging::{ClientEvent, DisconnectReason, EventFilter, MessageRouter, dispatch};
use crate::types::constants::message_types;
use crate::types::{
    HANDSHAKE_TOKEN_PARAM, LISTENER_CHANNEL_CAPACITY, RealtimeError, RealtimeMessage, Result,
    WS_CLOSE_NORMAL,
};
use crate::websocket::{Connector, Frame, FrameStream};
use futures::stream::StreamExt;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock, mpsc, watch};
use url::Url;

/// The connection manager for the dashboard's real-time channel.
///
/// `RealtimeClient` owns one WebSocket: it connects with the session token,
/// keeps the link alive with heartbeats, reconnects with exponential backoff
/// after an unclean close, queues outbound messages while the link is down and
/// replays subscriptions on every reconnect.
///
/// # Example
///
/// ```no_run
/// use dashboard_net::{RealtimeClient, RealtimeClientOptions};
/// use dashboard_net::messaging::{EventFilter, MessageKind};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RealtimeClient::new(
///     "wss://dashboard.example.com/ws",
///     RealtimeClientOptions::default(),
/// )?;
/// let mut updates = client.on(EventFilter::Kind(MessageKind::ContentUpdate)).await;
///
/// client.connect("session-token").await?;
/// client.subscribe("content:42").await?;
///
/// while let Some(event) = updates.recv().await {
///     println!("{event:?}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RealtimeClient {
    pub(crate) endpoint: Url,
    pub(crate) options: RealtimeClientOptions,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) clock: Arc<dyn Clock>,

    // Connection manager
    pub(crate) connection: Arc<ConnectionManager>,

    // Consolidated mutable state
    pub(crate) state: Arc<RwLock<ClientState>>,

    // Wakes a reconnect backoff so `disconnect` takes effect immediately
    pub(crate) shutdown: Arc<Notify>,
}

impl RealtimeClient {
    /// Creates a new client with the default WebSocket transport.
    ///
    /// Does not connect; call [`connect()`](Self::connect).
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::UrlParse`] if the endpoint URL cannot be parsed.
    pub fn new(endpoint: impl AsRef<str>, options: RealtimeClientOptions) -> Result<Self> {
        RealtimeClientBuilder::new(endpoint, options).map(|builder| builder.build())
    }

    pub fn builder(
        endpoint: impl AsRef<str>,
        options: RealtimeClientOptions,
    ) -> Result<RealtimeClientBuilder> {
        RealtimeClientBuilder::new(endpoint, options)
    }

    /// Establishes the real-time connection using `token` for the handshake.
    ///
    /// Transport failures are not returned: they are reported as
    /// [`ClientEvent::ConnectError`] and the client moves to
    /// [`ConnectionState::Reconnecting`]. If the client is already connected,
    /// connecting or reconnecting, this returns immediately.
    ///
    /// The returned `Result` is reserved for setup failures; transport errors
    /// never surface here.
    pub async fn connect(&self, token: impl Into<String>) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.token = Some(token.into());

            match self.connection.state() {
                ConnectionState::Connected
                | ConnectionState::Connecting
                | ConnectionState::Reconnecting => return Ok(()),
                ConnectionState::Disconnected => {}
            }
            state.was_manual_disconnect = false;
            state.timer.reset();
        }

        if let Err(e) = self.open_connection().await {
            tracing::error!("Initial connection failed: {}", e);
            dispatch(&self.state, ClientEvent::ConnectError(e.to_string())).await;
            if self.state.read().await.was_manual_disconnect {
                return Ok(());
            }
            self.connection.set_state(ConnectionState::Reconnecting);
        }
        Ok(())
    }

    /// Opens the transport, replays subscriptions, flushes the queue and starts
    /// the session tasks.
    pub(crate) async fn open_connection(&self) -> Result<()> {
        self.connection.set_state(ConnectionState::Connecting);

        let url = self.build_endpoint_url().await;
        tracing::info!(
            "Connecting to {}",
            url.host_str().unwrap_or(self.endpoint.as_str())
        );

        let (writer, stream) = self.connector.connect(&url).await?;

        // The registry stays read-locked until the link is open, so a concurrent
        // subscribe lands either in the preamble or on the open link.
        let registry = self.state.read().await;
        if registry.was_manual_disconnect {
            return Err(RealtimeError::Connection(
                "disconnect requested while connecting".to_string(),
            ));
        }
        let preamble = registry
            .subscriptions
            .iter()
            .map(|channel| subscription_message(message_types::SUBSCRIBE, channel))
            .collect::<Vec<_>>();
        let replayed = preamble.len();

        self.connection.open(writer, preamble).await?;
        drop(registry);
        if replayed > 0 {
            tracing::info!("Replayed {} channel subscriptions", replayed);
        }

        {
            let mut state = self.state.write().await;
            if state.was_manual_disconnect {
                drop(state);
                self.connection.close().await;
                return Err(RealtimeError::Connection(
                    "disconnect requested while connecting".to_string(),
                ));
            }
            state.timer.reset();
            state.session_tasks.abort_all();

            let router =
                MessageRouter::new(Arc::clone(&self.connection), Arc::clone(&self.state));
            let client = self.clone();
            state
                .session_tasks
                .spawn(async move { client.read_loop(stream, router).await });

            let heartbeat = HeartbeatManager::new(Arc::downgrade(&self.connection))
                .with_interval(self.options.heartbeat_interval);
            state.session_tasks.spawn(heartbeat.run());

            // Published under the state lock so a concurrent disconnect lands after it
            self.connection.set_state(ConnectionState::Connected);
        }

        tracing::info!("Connected to real-time server");
        dispatch(&self.state, ClientEvent::Connected).await;
        Ok(())
    }

    /// Reads frames one at a time and routes them; ends when the transport does
    async fn read_loop(&self, mut stream: FrameStream, router: MessageRouter) {
        tracing::info!("Starting read task");
        let reason = loop {
            match stream.next().await {
                Some(Ok(Frame::Text(text))) => {
                    match serde_json::from_str::<RealtimeMessage>(&text) {
                        Ok(message) => router.route(message).await,
                        Err(e) => {
                            tracing::error!("Failed to parse message: {} - Raw: {}", e, text);
                        }
                    }
                }
                Some(Ok(Frame::Close { code, reason })) => {
                    if code == Some(WS_CLOSE_NORMAL) {
                        tracing::info!("Server closed connection normally");
                        break DisconnectReason::ServerClosed;
                    }
                    tracing::error!(
                        "Server closed connection: code={:?}, reason='{}'",
                        code,
                        reason
                    );
                    break DisconnectReason::ConnectionLost(format!(
                        "closed with code {code:?}: {reason}"
                    ));
                }
                Some(Err(e)) => {
                    tracing::error!("WebSocket read error: {}", e);
                    break DisconnectReason::ConnectionLost(e.to_string());
                }
                None => {
                    tracing::warn!("Server closed connection without close frame");
                    break DisconnectReason::ConnectionLost("stream ended".to_string());
                }
            }
        };
        tracing::info!("Read task finished");
        self.handle_close(reason).await;
    }

    async fn handle_close(&self, reason: DisconnectReason) {
        if self.state.read().await.was_manual_disconnect {
            return;
        }

        self.connection.detach().await;
        let reconnect = matches!(reason, DisconnectReason::ConnectionLost(_));
        dispatch(&self.state, ClientEvent::Disconnected(reason)).await;

        if reconnect {
            self.connection.set_state(ConnectionState::Reconnecting);
        } else {
            self.connection.set_state(ConnectionState::Disconnected);
        }
    }

    /// Retries the connection with backoff until it opens, the attempt budget
    /// runs out, or `disconnect` is called.
    pub(crate) async fn reconnect_loop(&self) {
        loop {
            let (attempt, delay) = {
                let mut state = self.state.write().await;
                if state.was_manual_disconnect {
                    tracing::info!("Manual disconnect detected, will not attempt to reconnect");
                    return;
                }
                let attempt = state.timer.attempts();
                (attempt, state.timer.next_delay())
            };

            let Some(delay) = delay else {
                tracing::warn!("Giving up after {} reconnection attempts", attempt);
                self.connection.set_state(ConnectionState::Disconnected);
                dispatch(&self.state, ClientEvent::ReconnectFailed { attempts: attempt }).await;
                return;
            };

            tracing::info!(
                "Reconnection attempt {} in {}ms",
                attempt + 1,
                delay.as_millis()
            );
            dispatch(
                &self.state,
                ClientEvent::Reconnecting {
                    attempt: attempt + 1,
                    delay_ms: delay.as_millis() as u64,
                },
            )
            .await;

            tokio::select! {
                _ = self.clock.sleep(delay) => {}
                _ = self.shutdown.notified() => {
                    tracing::info!("Reconnection cancelled");
                    return;
                }
            }

            if self.state.read().await.was_manual_disconnect {
                return;
            }

            match self.open_connection().await {
                Ok(()) => {
                    tracing::info!("Reconnected successfully");
                    return;
                }
                Err(e) => {
                    tracing::error!("Reconnection attempt failed: {}", e);
                    dispatch(&self.state, ClientEvent::ConnectError(e.to_string())).await;
                    if self.state.read().await.was_manual_disconnect {
                        return;
                    }
                    self.connection.set_state(ConnectionState::Reconnecting);
                }
            }
        }
    }

    /// Closes the connection. No automatic reconnection follows; call
    /// [`connect()`](Self::connect) to start again. Queued messages are kept.
    pub async fn disconnect(&self) -> Result<()> {
        let previous = self.connection.state();
        {
            let mut state = self.state.write().await;
            state.was_manual_disconnect = true;
            state.session_tasks.abort_all();
        }
        self.shutdown.notify_waiters();

        if previous == ConnectionState::Disconnected {
            return Ok(());
        }

        tracing::info!("Disconnecting from real-time server");
        self.connection.close().await;
        self.connection.set_state(ConnectionState::Disconnected);
        dispatch(
            &self.state,
            ClientEvent::Disconnected(DisconnectReason::ClientDisconnect),
        )
        .await;

        tracing::info!("Disconnected from real-time server");
        Ok(())
    }

    /// Sends a typed message, stamping its timestamp.
    ///
    /// Transmitted at once when connected, otherwise queued and flushed in
    /// order on the next successful connect.
    pub async fn send(
        &self,
        kind: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<Delivery> {
        self.send_message(RealtimeMessage::new(kind, payload)).await
    }

    /// Sends a pre-built message; see [`send()`](Self::send)
    pub async fn send_message(&self, message: RealtimeMessage) -> Result<Delivery> {
        let mut message = message.stamped();
        if message.user_id.is_none() {
            message.user_id = self.options.user_id.clone();
        }
        if message.workspace_id.is_none() {
            message.workspace_id = self.options.workspace_id.clone();
        }

        let delivery = self.connection.send_message(message).await?;
        if delivery == Delivery::Queued {
            tracing::debug!("Not connected, message queued");
        }
        Ok(delivery)
    }

    /// Adds `channel` to the subscription registry and tells the server if connected.
    ///
    /// While disconnected nothing is queued: every connect replays the registry.
    pub async fn subscribe(&self, channel: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.add_subscription(channel) {
            return Ok(());
        }

        // Held across the transmit so an opening link cannot miss this channel
        let message = subscription_message(message_types::SUBSCRIBE, channel);
        let sent = self.connection.transmit_now(&message).await?;
        drop(state);
        if sent {
            tracing::info!("Subscribed to channel: {}", channel);
        } else {
            tracing::debug!("Subscription to {} will be sent on connect", channel);
        }
        Ok(())
    }

    /// Removes `channel` from the registry and tells the server if connected
    pub async fn unsubscribe(&self, channel: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.remove_subscription(channel) {
            return Ok(());
        }

        let message = subscription_message(message_types::UNSUBSCRIBE, channel);
        let sent = self.connection.transmit_now(&message).await?;
        drop(state);
        if sent {
            tracing::info!("Unsubscribed from channel: {}", channel);
        }
        Ok(())
    }

    /// Registers a listener. Events arrive in dispatch order.
    pub async fn on(&self, filter: impl Into<EventFilter>) -> mpsc::Receiver<ClientEvent> {
        let (tx, rx) = mpsc::channel(LISTENER_CHANNEL_CAPACITY);
        let binding = EventBinding {
            filter: filter.into(),
            sender: tx,
        };

        self.state.write().await.bindings.push(binding);

        rx
    }

    /// Replaces the handshake token used by future (re)connects
    pub async fn set_token(&self, token: impl Into<String>) {
        self.state.write().await.token = Some(token.into());
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Channels in the subscription registry
    pub async fn subscriptions(&self) -> Vec<String> {
        self.state.read().await.subscriptions.clone()
    }

    /// Messages waiting for a connection
    pub async fn queued_messages(&self) -> usize {
        self.connection.queued_len().await
    }

    /// Queued messages evicted by overflow since the client was built
    pub async fn dropped_messages(&self) -> u64 {
        self.connection.dropped_count().await
    }

    /// Build the WebSocket endpoint URL with the handshake token
    async fn build_endpoint_url(&self) -> Url {
        let mut url = self.endpoint.clone();

        if let Some(token) = self.state.read().await.token.as_deref() {
            url.query_pairs_mut()
                .append_pair(HANDSHAKE_TOKEN_PARAM, token);
        }

        url
    }
}

fn subscription_message(kind: &str, channel: &str) -> RealtimeMessage {
    RealtimeMessage::new(kind, serde_json::json!({ "channel": channel })).stamped()
}
