use crate::infrastructure::OutboundQueue;
use crate::types::{RealtimeMessage, Result};
use crate::websocket::FrameSink;
use futures::SinkExt;
use tokio::sync::{Mutex, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Outcome of handing a message to the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Queued,
}

/// Writer and outbound queue share one lock so that a flush on open and
/// concurrent sends cannot interleave.
struct Link {
    writer: Option<FrameSink>,
    open: bool,
    queue: OutboundQueue,
}

pub struct ConnectionManager {
    link: Mutex<Link>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(queue_capacity: usize) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            link: Mutex::new(Link {
                writer: None,
                open: false,
                queue: OutboundQueue::new(queue_capacity),
            }),
            state_tx,
        }
    }

    /// Gets the current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Sets the connection state and notifies watchers
    pub fn set_state(&self, new_state: ConnectionState) {
        let previous = self.state_tx.send_replace(new_state);
        if previous != new_state {
            tracing::debug!("Connection state {:?} -> {:?}", previous, new_state);
        }
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Checks if currently connected
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Installs the writer, sends `preamble` then the whole queue in FIFO order,
    /// and only then marks the link open.
    pub async fn open(&self, writer: FrameSink, preamble: Vec<RealtimeMessage>) -> Result<()> {
        let mut link = self.link.lock().await;
        let mut writer = writer;

        for message in &preamble {
            write_frame(&mut writer, message).await?;
        }

        let mut flushed = 0usize;
        while let Some(message) = link.queue.pop() {
            if let Err(e) = write_frame(&mut writer, &message).await {
                link.queue.push_front(message);
                tracing::warn!("Queue flush interrupted after {} messages: {}", flushed, e);
                return Err(e);
            }
            flushed += 1;
        }
        if flushed > 0 {
            tracing::info!("Flushed {} queued messages", flushed);
        }

        link.writer = Some(writer);
        link.open = true;
        Ok(())
    }

    /// Sends through the WebSocket if open, otherwise appends to the outbound queue
    pub async fn send_message(&self, message: RealtimeMessage) -> Result<Delivery> {
        let mut link = self.link.lock().await;

        if !link.open {
            link.queue.push(message);
            return Ok(Delivery::Queued);
        }

        let Some(writer) = link.writer.as_mut() else {
            link.queue.push(message);
            return Ok(Delivery::Queued);
        };

        match write_frame(writer, &message).await {
            Ok(()) => Ok(Delivery::Sent),
            Err(e) => {
                tracing::warn!("Send failed, keeping '{}' for replay: {}", message.kind, e);
                link.open = false;
                link.writer = None;
                link.queue.push(message);
                Ok(Delivery::Queued)
            }
        }
    }

    /// Sends only if the link is open; never queues.
    ///
    /// Used for frames that are meaningless after a reconnect (heartbeats, acks,
    /// subscription notices that the registry replay covers).
    pub async fn transmit_now(&self, message: &RealtimeMessage) -> Result<bool> {
        let mut link = self.link.lock().await;
        if !link.open {
            return Ok(false);
        }
        let Some(writer) = link.writer.as_mut() else {
            return Ok(false);
        };
        write_frame(writer, message).await?;
        Ok(true)
    }

    /// Drops the writer after the transport is gone
    pub async fn detach(&self) {
        let mut link = self.link.lock().await;
        link.open = false;
        link.writer = None;
    }

    /// Closes the WebSocket connection gracefully
    pub async fn close(&self) {
        let mut link = self.link.lock().await;
        link.open = false;
        if let Some(mut writer) = link.writer.take()
            && let Err(e) = writer.close().await
        {
            tracing::debug!("Error while closing transport: {}", e);
        }
    }

    pub async fn queued_len(&self) -> usize {
        self.link.lock().await.queue.len()
    }

    pub async fn dropped_count(&self) -> u64 {
        self.link.lock().await.queue.dropped()
    }
}

async fn write_frame(writer: &mut FrameSink, message: &RealtimeMessage) -> Result<()> {
    let json = serde_json::to_string(message)?;
    tracing::debug!("Sending '{}' frame", message.kind);
    writer.send(json).await
}
