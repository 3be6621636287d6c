use crate::types::{MAX_OUTBOUND_QUEUE_SIZE, RealtimeMessage};
use std::collections::VecDeque;

/// FIFO buffer of frames waiting for an open connection.
///
/// Bounded; when full the oldest frame is dropped to make room.
#[derive(Debug)]
pub struct OutboundQueue {
    messages: VecDeque<RealtimeMessage>,
    capacity: usize,
    dropped: u64,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Append a message, evicting the oldest one when full
    pub fn push(&mut self, message: RealtimeMessage) {
        if self.messages.len() >= self.capacity
            && let Some(evicted) = self.messages.pop_front()
        {
            self.dropped += 1;
            tracing::warn!(
                "Outbound queue full ({}), dropping oldest '{}' message",
                self.capacity,
                evicted.kind
            );
        }
        self.messages.push_back(message);
    }

    /// Put a message back at the head (used when a flush is interrupted)
    pub fn push_front(&mut self, message: RealtimeMessage) {
        self.messages.push_front(message);
        if self.messages.len() > self.capacity {
            self.messages.pop_back();
            self.dropped += 1;
        }
    }

    pub fn pop(&mut self) -> Option<RealtimeMessage> {
        self.messages.pop_front()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total messages evicted since creation
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new(MAX_OUTBOUND_QUEUE_SIZE)
    }
}
