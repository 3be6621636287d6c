use crate::infrastructure::{TaskManager, Timer};
use crate::messaging::{ClientEvent, EventFilter};
use tokio::sync::mpsc;

/// Event binding for client event listeners
#[derive(Debug)]
pub struct EventBinding {
    pub filter: EventFilter,
    pub sender: mpsc::Sender<ClientEvent>,
}

/// Consolidated mutable state for RealtimeClient
/// Using a single struct reduces lock contention
pub struct ClientState {
    /// Session token sent on every handshake
    pub token: Option<String>,

    /// Channels the caller wants active, in subscription order
    pub subscriptions: Vec<String>,

    /// Registered listeners
    pub bindings: Vec<EventBinding>,

    /// Reconnect backoff and attempt counter
    pub timer: Timer,

    /// Read and heartbeat tasks of the current connection
    pub session_tasks: TaskManager,

    /// Whether the disconnect was manual (prevents auto-reconnect)
    pub was_manual_disconnect: bool,
}

impl ClientState {
    pub fn new(max_reconnect_attempts: u32) -> Self {
        Self {
            token: None,
            subscriptions: Vec::new(),
            bindings: Vec::new(),
            timer: Timer::new(max_reconnect_attempts),
            session_tasks: TaskManager::new(),
            was_manual_disconnect: false,
        }
    }

    /// Adds a channel to the registry; false if it was already there
    pub fn add_subscription(&mut self, channel: &str) -> bool {
        if self.subscriptions.iter().any(|c| c == channel) {
            return false;
        }
        self.subscriptions.push(channel.to_string());
        true
    }

    /// Removes a channel from the registry; false if it was not there
    pub fn remove_subscription(&mut self, channel: &str) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|c| c != channel);
        before != self.subscriptions.len()
    }

    /// Senders whose filter accepts `event`
    pub fn listeners_for(&self, event: &ClientEvent) -> Vec<mpsc::Sender<ClientEvent>> {
        self.bindings
            .iter()
            .filter(|b| b.filter.matches(event))
            .map(|b| b.sender.clone())
            .collect()
    }

    /// Forget listeners whose receiver was dropped
    pub fn prune_closed_listeners(&mut self) {
        self.bindings.retain(|b| !b.sender.is_closed());
    }
}
