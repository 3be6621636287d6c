//! Channel multiplexers: per-entity state built from typed real-time events.
//!
//! These consumers add no delivery logic of their own; ordering, queueing and
//! reconnection all come from [`RealtimeClient`](crate::RealtimeClient).

pub mod activity;
pub mod analytics;
pub mod presence;
pub mod typing;

pub use activity::{ActivityEntry, ActivityFeed, ActivityKind};
pub use analytics::{AnalyticsStream, MetricSample};
pub use presence::{LifecycleEvent, PeerPresence, PresenceChannel};
pub use typing::TypingIndicator;

use crate::infrastructure::TaskManager;
use crate::messaging::{ClientEvent, InboundEvent};
use parking_lot::Mutex;
use std::sync::Weak;
use tokio::sync::mpsc;

/// Feeds message events from `rx` to `handle` until the listener closes or `target` is dropped
fn spawn_listener<T, F>(
    tasks: &Mutex<TaskManager>,
    target: Weak<T>,
    mut rx: mpsc::Receiver<ClientEvent>,
    handle: F,
) where
    T: Send + Sync + 'static,
    F: Fn(&T, InboundEvent) + Send + 'static,
{
    tasks.lock().spawn(async move {
        while let Some(event) = rx.recv().await {
            let ClientEvent::Message(event) = event else {
                continue;
            };
            let Some(target) = target.upgrade() else {
                break;
            };
            handle(&target, event);
        }
        tracing::debug!("Channel listener finished");
    });
}
