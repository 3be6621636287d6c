use crate::client::{ConnectionManager, ConnectionState};
use crate::types::HEARTBEAT_INTERVAL;
use crate::types::constants::message_types;
use crate::types::message::RealtimeMessage;
use std::sync::Weak;
use std::time::Duration;
use tokio::time;

/// Periodic keep-alive for one open connection.
///
/// Liveness is left to the transport's close/error events; a missing reply is
/// not treated as a failure.
pub struct HeartbeatManager {
    interval: Duration,
    connection: Weak<ConnectionManager>,
}

impl HeartbeatManager {
    pub fn new(connection: Weak<ConnectionManager>) -> Self {
        Self {
            interval: Duration::from_millis(HEARTBEAT_INTERVAL),
            connection,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Heartbeat loop; spawn it on the client's session task manager
    pub async fn run(self) {
        let start = time::Instant::now() + self.interval;
        let mut interval_timer = time::interval_at(start, self.interval);
        interval_timer.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            interval_timer.tick().await;

            // Check if connection is still valid
            let Some(connection) = self.connection.upgrade() else {
                // Client dropped, exit heartbeat task
                break;
            };

            match connection.state() {
                ConnectionState::Connected => {}
                ConnectionState::Disconnected => break,
                ConnectionState::Connecting | ConnectionState::Reconnecting => continue,
            }

            let heartbeat_msg =
                RealtimeMessage::new(message_types::HEARTBEAT, serde_json::json!({})).stamped();

            match connection.transmit_now(&heartbeat_msg).await {
                Ok(true) => tracing::debug!("Sent heartbeat"),
                Ok(false) => tracing::debug!("Skipped heartbeat, link not open"),
                Err(e) => tracing::error!("[Heartbeat] Failed to send: {}", e),
            }
        }
        tracing::debug!("Heartbeat task finished");
    }
}
