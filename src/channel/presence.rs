use super::spawn_listener;
use crate::client::{Delivery, RealtimeClient};
use crate::infrastructure::TaskManager;
use crate::messaging::{InboundEvent, MessageKind, PresenceStatus, PresenceUpdate};
use crate::types::Result;
use crate::types::constants::message_types;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time;

/// Host lifecycle transitions that change the local user's availability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Visible,
    Hidden,
    Focus,
    Blur,
    Unload,
}

impl LifecycleEvent {
    pub fn status(self) -> PresenceStatus {
        match self {
            Self::Visible | Self::Focus => PresenceStatus::Online,
            Self::Hidden | Self::Blur => PresenceStatus::Away,
            Self::Unload => PresenceStatus::Offline,
        }
    }
}

/// Last known state of one peer
#[derive(Debug, Clone, PartialEq)]
pub struct PeerPresence {
    pub user_id: String,
    pub status: PresenceStatus,
    pub last_activity: Option<DateTime<Utc>>,
    pub current_page: Option<String>,
    pub is_typing: bool,
    pub typing_in: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl From<PresenceUpdate> for PeerPresence {
    fn from(update: PresenceUpdate) -> Self {
        Self {
            user_id: update.user_id,
            status: update.status,
            last_activity: update.last_activity,
            current_page: update.current_page,
            is_typing: update.is_typing,
            typing_in: update.typing_in,
            received_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
struct LocalPresence {
    status: PresenceStatus,
    current_page: Option<String>,
    typing_in: Option<String>,
}

/// Peer presence cache plus publication of the local user's presence.
///
/// Peers are updated from `presence_update` frames; an `offline` update removes
/// the peer. The local state is published on [`start`](Self::start), on every
/// heartbeat tick, and whenever it changes.
#[derive(Clone)]
pub struct PresenceChannel {
    inner: Arc<PresenceInner>,
}

struct PresenceInner {
    client: RealtimeClient,
    user_id: String,
    peers: RwLock<HashMap<String, PeerPresence>>,
    local: Mutex<LocalPresence>,
    tasks: Mutex<TaskManager>,
}

impl PresenceChannel {
    pub fn new(client: RealtimeClient, user_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(PresenceInner {
                client,
                user_id: user_id.into(),
                peers: RwLock::new(HashMap::new()),
                local: Mutex::new(LocalPresence {
                    status: PresenceStatus::Online,
                    current_page: None,
                    typing_in: None,
                }),
                tasks: Mutex::new(TaskManager::new()),
            }),
        }
    }

    /// Starts tracking peers and publishing on a `heartbeat` cadence
    pub async fn start(&self, heartbeat: Duration) -> Result<Delivery> {
        let rx = self.inner.client.on(MessageKind::PresenceUpdate).await;
        spawn_listener(
            &self.inner.tasks,
            Arc::downgrade(&self.inner),
            rx,
            |inner, event| {
                if let InboundEvent::PresenceUpdate(update) = event {
                    inner.apply(update);
                }
            },
        );

        let weak = Arc::downgrade(&self.inner);
        self.inner
            .tasks
            .lock()
            .spawn(publish_on_interval(weak, heartbeat));

        tracing::info!("Presence started for {}", self.inner.user_id);
        self.publish().await
    }

    pub fn stop(&self) {
        self.inner.tasks.lock().abort_all();
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    pub fn status(&self) -> PresenceStatus {
        self.inner.local.lock().status
    }

    /// Peers sorted by user id
    pub fn peers(&self) -> Vec<PeerPresence> {
        let mut peers: Vec<_> = self.inner.peers.read().values().cloned().collect();
        peers.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        peers
    }

    pub fn peer(&self, user_id: &str) -> Option<PeerPresence> {
        self.inner.peers.read().get(user_id).cloned()
    }

    /// Peers currently typing in `context`
    pub fn typing_in(&self, context: &str) -> Vec<String> {
        let mut users: Vec<_> = self
            .inner
            .peers
            .read()
            .values()
            .filter(|p| p.is_typing && p.typing_in.as_deref() == Some(context))
            .map(|p| p.user_id.clone())
            .collect();
        users.sort();
        users
    }

    /// Applies one update to the cache; the local user's own echoes are ignored
    pub fn apply(&self, update: PresenceUpdate) {
        self.inner.apply(update);
    }

    pub async fn set_status(&self, status: PresenceStatus) -> Result<Delivery> {
        self.inner.local.lock().status = status;
        self.publish().await
    }

    pub async fn set_page(&self, page: impl Into<String>) -> Result<Delivery> {
        self.inner.local.lock().current_page = Some(page.into());
        self.publish().await
    }

    pub async fn handle_lifecycle(&self, event: LifecycleEvent) -> Result<Delivery> {
        tracing::debug!("Lifecycle {:?}", event);
        self.set_status(event.status()).await
    }

    pub(crate) async fn set_typing(&self, context: Option<String>) -> Result<Delivery> {
        self.inner.local.lock().typing_in = context;
        self.publish().await
    }

    /// Sends the local presence now
    pub async fn publish(&self) -> Result<Delivery> {
        self.inner.publish().await
    }
}

impl PresenceInner {
    fn apply(&self, update: PresenceUpdate) {
        if update.user_id == self.user_id {
            return;
        }

        let mut peers = self.peers.write();
        if update.status == PresenceStatus::Offline {
            if peers.remove(&update.user_id).is_some() {
                tracing::debug!("Peer {} went offline", update.user_id);
            }
            return;
        }
        peers.insert(update.user_id.clone(), PeerPresence::from(update));
    }

    fn snapshot(&self) -> PresenceUpdate {
        let local = self.local.lock().clone();
        PresenceUpdate {
            user_id: self.user_id.clone(),
            status: local.status,
            last_activity: Some(Utc::now()),
            current_page: local.current_page,
            is_typing: local.typing_in.is_some(),
            typing_in: local.typing_in,
        }
    }

    async fn publish(&self) -> Result<Delivery> {
        let payload = serde_json::to_value(self.snapshot())?;
        self.client
            .send(message_types::PRESENCE_UPDATE, payload)
            .await
    }
}

async fn publish_on_interval(presence: Weak<PresenceInner>, period: Duration) {
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let Some(presence) = presence.upgrade() else {
            break;
        };
        // Offline ticks would only pile up in the outbound queue
        if !presence.client.is_connected() {
            continue;
        }
        if let Err(e) = presence.publish().await {
            tracing::warn!("Presence heartbeat failed: {}", e);
        }
    }
}
