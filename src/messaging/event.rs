use crate::types::constants::message_types;
use crate::types::message::RealtimeMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type-safe message kinds, one per reserved frame type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Heartbeat,
    HeartbeatAck,
    ContentUpdate,
    PresenceUpdate,
    Notification,
    AnalyticsUpdate,
    PublishingUpdate,
    CollaborationUpdate,
    /// Any type string this client does not know
    Unrecognized,
}

impl MessageKind {
    /// Parse a wire `type` string
    pub fn parse(s: &str) -> Self {
        match s {
            message_types::HEARTBEAT => Self::Heartbeat,
            message_types::HEARTBEAT_ACK => Self::HeartbeatAck,
            message_types::CONTENT_UPDATE => Self::ContentUpdate,
            message_types::PRESENCE_UPDATE => Self::PresenceUpdate,
            message_types::NOTIFICATION => Self::Notification,
            message_types::ANALYTICS_UPDATE => Self::AnalyticsUpdate,
            message_types::PUBLISHING_UPDATE => Self::PublishingUpdate,
            message_types::COLLABORATION_UPDATE => Self::CollaborationUpdate,
            _ => Self::Unrecognized,
        }
    }

    /// Wire string, `None` for [`MessageKind::Unrecognized`]
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            Self::Heartbeat => Some(message_types::HEARTBEAT),
            Self::HeartbeatAck => Some(message_types::HEARTBEAT_ACK),
            Self::ContentUpdate => Some(message_types::CONTENT_UPDATE),
            Self::PresenceUpdate => Some(message_types::PRESENCE_UPDATE),
            Self::Notification => Some(message_types::NOTIFICATION),
            Self::AnalyticsUpdate => Some(message_types::ANALYTICS_UPDATE),
            Self::PublishingUpdate => Some(message_types::PUBLISHING_UPDATE),
            Self::CollaborationUpdate => Some(message_types::COLLABORATION_UPDATE),
            Self::Unrecognized => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentUpdate {
    pub content_id: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// Peer availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Busy,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub user_id: String,
    pub status: PresenceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_page: Option<String>,
    #[serde(default)]
    pub is_typing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typing_in: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub message: String,
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default)]
    pub data: Value,
}

fn default_severity() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsUpdate {
    pub metric: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    #[serde(default)]
    pub dimensions: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishingUpdate {
    pub content_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaborationUpdate {
    pub content_id: String,
    pub user_id: String,
    pub action: String,
    #[serde(default)]
    pub data: Value,
}

/// A parsed inbound frame with its typed payload.
///
/// Frames whose type is unknown, or whose payload does not fit the type's schema,
/// become [`InboundEvent::Unrecognized`] so fallback listeners still see them.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Heartbeat,
    HeartbeatAck,
    ContentUpdate(ContentUpdate),
    PresenceUpdate(PresenceUpdate),
    Notification(Notification),
    AnalyticsUpdate(AnalyticsUpdate),
    PublishingUpdate(PublishingUpdate),
    CollaborationUpdate(CollaborationUpdate),
    Unrecognized { kind: String, payload: Value },
}

impl InboundEvent {
    pub fn from_message(message: RealtimeMessage) -> Self {
        let kind = MessageKind::parse(&message.kind);
        let RealtimeMessage {
            kind: raw_kind,
            payload,
            ..
        } = message;

        let parsed = match kind {
            MessageKind::Heartbeat => Ok(Self::Heartbeat),
            MessageKind::HeartbeatAck => Ok(Self::HeartbeatAck),
            MessageKind::ContentUpdate => {
                serde_json::from_value(payload.clone()).map(Self::ContentUpdate)
            }
            MessageKind::PresenceUpdate => {
                serde_json::from_value(payload.clone()).map(Self::PresenceUpdate)
            }
            MessageKind::Notification => {
                serde_json::from_value(payload.clone()).map(Self::Notification)
            }
            MessageKind::AnalyticsUpdate => {
                serde_json::from_value(payload.clone()).map(Self::AnalyticsUpdate)
            }
            MessageKind::PublishingUpdate => {
                serde_json::from_value(payload.clone()).map(Self::PublishingUpdate)
            }
            MessageKind::CollaborationUpdate => {
                serde_json::from_value(payload.clone()).map(Self::CollaborationUpdate)
            }
            MessageKind::Unrecognized => {
                return Self::Unrecognized {
                    kind: raw_kind,
                    payload,
                };
            }
        };

        match parsed {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Malformed '{}' payload: {}", raw_kind, e);
                Self::Unrecognized {
                    kind: raw_kind,
                    payload,
                }
            }
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Heartbeat => MessageKind::Heartbeat,
            Self::HeartbeatAck => MessageKind::HeartbeatAck,
            Self::ContentUpdate(_) => MessageKind::ContentUpdate,
            Self::PresenceUpdate(_) => MessageKind::PresenceUpdate,
            Self::Notification(_) => MessageKind::Notification,
            Self::AnalyticsUpdate(_) => MessageKind::AnalyticsUpdate,
            Self::PublishingUpdate(_) => MessageKind::PublishingUpdate,
            Self::CollaborationUpdate(_) => MessageKind::CollaborationUpdate,
            Self::Unrecognized { .. } => MessageKind::Unrecognized,
        }
    }
}

/// Why a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called
    ClientDisconnect,
    /// Server sent a normal close frame
    ServerClosed,
    /// Transport dropped, errored, or closed abnormally
    ConnectionLost(String),
}

/// Events delivered to listeners registered with
/// [`RealtimeClient::on`](crate::client::RealtimeClient::on)
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Disconnected(DisconnectReason),
    Reconnecting { attempt: u32, delay_ms: u64 },
    ReconnectFailed { attempts: u32 },
    ConnectError(String),
    Message(InboundEvent),
}

/// Which events a listener receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Connection lifecycle: connected, disconnected, reconnecting, errors
    Lifecycle,
    /// Every inbound message, whatever its type
    AllMessages,
    /// Inbound messages of one kind
    Kind(MessageKind),
}

impl EventFilter {
    pub fn matches(&self, event: &ClientEvent) -> bool {
        match (self, event) {
            (Self::Lifecycle, ClientEvent::Message(_)) => false,
            (Self::Lifecycle, _) => true,
            (Self::AllMessages, ClientEvent::Message(_)) => true,
            (Self::Kind(kind), ClientEvent::Message(inbound)) => inbound.kind() == *kind,
            _ => false,
        }
    }
}

impl From<MessageKind> for EventFilter {
    fn from(kind: MessageKind) -> Self {
        Self::Kind(kind)
    }
}
