use super::spawn_listener;
use crate::client::RealtimeClient;
use crate::infrastructure::TaskManager;
use crate::messaging::{EventFilter, InboundEvent};
use crate::types::DEFAULT_ACTIVITY_FEED_SIZE;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Content,
    Publishing,
    Collaboration,
    Notification,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEntry {
    pub kind: ActivityKind,
    pub content_id: Option<String>,
    pub actor: Option<String>,
    pub summary: String,
    pub received_at: DateTime<Utc>,
}

impl ActivityEntry {
    /// Feed entry for events that belong in an activity feed
    pub fn from_event(event: &InboundEvent) -> Option<Self> {
        let (kind, content_id, actor, summary) = match event {
            InboundEvent::ContentUpdate(update) => (
                ActivityKind::Content,
                Some(update.content_id.clone()),
                None,
                format!(
                    "\"{}\" {}",
                    update.title.as_deref().unwrap_or(&update.content_id),
                    update.action
                ),
            ),
            InboundEvent::PublishingUpdate(update) => {
                let target = update.platform.as_deref().unwrap_or("all channels");
                let summary = match &update.error {
                    Some(error) => format!(
                        "Publishing {} to {} failed: {}",
                        update.content_id, target, error
                    ),
                    None => format!("{} {} on {}", update.content_id, update.status, target),
                };
                (
                    ActivityKind::Publishing,
                    Some(update.content_id.clone()),
                    None,
                    summary,
                )
            }
            InboundEvent::CollaborationUpdate(update) => (
                ActivityKind::Collaboration,
                Some(update.content_id.clone()),
                Some(update.user_id.clone()),
                format!("{} {} {}", update.user_id, update.action, update.content_id),
            ),
            InboundEvent::Notification(notification) => (
                ActivityKind::Notification,
                None,
                None,
                match &notification.title {
                    Some(title) => format!("{}: {}", title, notification.message),
                    None => notification.message.clone(),
                },
            ),
            _ => return None,
        };

        Some(Self {
            kind,
            content_id,
            actor,
            summary,
            received_at: Utc::now(),
        })
    }
}

/// Bounded, newest-first feed of content, publishing, collaboration and
/// notification events.
#[derive(Clone)]
pub struct ActivityFeed {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    entries: RwLock<VecDeque<ActivityEntry>>,
    capacity: usize,
    tasks: Mutex<TaskManager>,
}

impl Default for ActivityFeed {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITY_FEED_SIZE)
    }
}

impl ActivityFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                entries: RwLock::new(VecDeque::with_capacity(capacity)),
                capacity: capacity.max(1),
                tasks: Mutex::new(TaskManager::new()),
            }),
        }
    }

    /// Feeds the activity stream from `client`'s inbound messages
    pub async fn attach(&self, client: &RealtimeClient) {
        let rx = client.on(EventFilter::AllMessages).await;
        spawn_listener(
            &self.inner.tasks,
            Arc::downgrade(&self.inner),
            rx,
            |inner, event| {
                inner.record(&event);
            },
        );
    }

    pub fn detach(&self) {
        self.inner.tasks.lock().abort_all();
    }

    /// Adds the event if it is feed-worthy; returns whether it was added
    pub fn record(&self, event: &InboundEvent) -> bool {
        self.inner.record(event)
    }

    /// Newest first
    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.inner.entries.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.inner.entries.write().clear();
    }
}

impl FeedInner {
    fn record(&self, event: &InboundEvent) -> bool {
        let Some(entry) = ActivityEntry::from_event(event) else {
            return false;
        };

        let mut entries = self.entries.write();
        entries.push_front(entry);
        entries.truncate(self.capacity);
        true
    }
}
