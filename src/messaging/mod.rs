// Messaging module - Event handling and message routing
pub mod event;
pub mod router;

pub use event::{
    AnalyticsUpdate, ClientEvent, CollaborationUpdate, ContentUpdate, DisconnectReason,
    EventFilter, InboundEvent, MessageKind, Notification, PresenceStatus, PresenceUpdate,
    PublishingUpdate,
};
pub use router::MessageRouter;
pub(crate) use router::dispatch;
