use super::{ClientEvent, InboundEvent};
use crate::client::{ClientState, ConnectionManager};
use crate::types::constants::message_types;
use crate::types::message::RealtimeMessage;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Routes incoming messages to appropriate handlers
pub struct MessageRouter {
    connection: Arc<ConnectionManager>,
    state: Arc<RwLock<ClientState>>,
}

impl MessageRouter {
    pub fn new(connection: Arc<ConnectionManager>, state: Arc<RwLock<ClientState>>) -> Self {
        Self { connection, state }
    }

    /// Routes a message to the appropriate handler(s).
    ///
    /// Called from the single read task, so handlers never run concurrently
    /// for one connection.
    pub async fn route(&self, message: RealtimeMessage) {
        let event = InboundEvent::from_message(message);

        match &event {
            InboundEvent::Heartbeat => self.handle_heartbeat().await,
            InboundEvent::HeartbeatAck => {
                tracing::trace!("Received heartbeat ack");
            }
            InboundEvent::Unrecognized { kind, .. } => {
                tracing::debug!(
                    "Routing unrecognized '{}' message to fallback listeners",
                    kind
                );
            }
            InboundEvent::ContentUpdate(_)
            | InboundEvent::PresenceUpdate(_)
            | InboundEvent::Notification(_)
            | InboundEvent::AnalyticsUpdate(_)
            | InboundEvent::PublishingUpdate(_)
            | InboundEvent::CollaborationUpdate(_) => {}
        }

        dispatch(&self.state, ClientEvent::Message(event)).await;
    }

    /// Answers a server heartbeat immediately
    async fn handle_heartbeat(&self) {
        let ack =
            RealtimeMessage::new(message_types::HEARTBEAT_ACK, serde_json::json!({})).stamped();
        match self.connection.transmit_now(&ack).await {
            Ok(true) => tracing::debug!("Acknowledged server heartbeat"),
            Ok(false) => tracing::debug!("Heartbeat received while link closed, not acking"),
            Err(e) => tracing::warn!("Failed to ack heartbeat: {}", e),
        }
    }
}

/// Delivers an event to every listener whose filter accepts it, in registration order
pub(crate) async fn dispatch(state: &RwLock<ClientState>, event: ClientEvent) {
    let listeners = state.read().await.listeners_for(&event);
    let mut saw_closed = false;

    for sender in listeners {
        if let Err(e) = sender.send(event.clone()).await {
            tracing::debug!("Listener dropped, discarding event: {:?}", e.0);
            saw_closed = true;
        }
    }

    if saw_closed {
        state.write().await.prune_closed_listeners();
    }
}
