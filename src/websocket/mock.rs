//! In-memory transport for connection manager tests.

use super::{Connector, Frame, FrameSink, FrameStream};
use crate::types::{RealtimeError, RealtimeMessage, Result};
use async_trait::async_trait;
use futures::SinkExt;
use futures::channel::mpsc as fmpsc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use url::Url;

/// Server side of one accepted mock connection
pub struct MockServerConn {
    pub url: Url,
    outbound: fmpsc::UnboundedReceiver<String>,
    inbound: Option<fmpsc::UnboundedSender<Result<Frame>>>,
}

impl MockServerConn {
    /// Next frame the client wrote, parsed
    pub async fn recv(&mut self) -> Option<RealtimeMessage> {
        use futures::StreamExt;
        let text = self.outbound.next().await?;
        Some(serde_json::from_str(&text).expect("client sent invalid JSON"))
    }

    /// Next frame the client wrote whose type is not a heartbeat
    pub async fn recv_non_heartbeat(&mut self) -> Option<RealtimeMessage> {
        loop {
            let msg = self.recv().await?;
            if msg.kind != "heartbeat" {
                return Some(msg);
            }
        }
    }

    pub fn push(&self, message: &RealtimeMessage) {
        let text = serde_json::to_string(message).expect("serializable");
        self.push_raw(&text);
    }

    pub fn push_raw(&self, text: &str) {
        if let Some(tx) = &self.inbound {
            let _ = tx.unbounded_send(Ok(Frame::Text(text.to_string())));
        }
    }

    /// Close with a close frame
    pub fn close(&mut self, code: u16) {
        if let Some(tx) = self.inbound.take() {
            let _ = tx.unbounded_send(Ok(Frame::Close {
                code: Some(code),
                reason: String::new(),
            }));
        }
    }

    /// Drop the connection without a close frame
    pub fn drop_connection(&mut self) {
        self.inbound.take();
    }
}

struct MockState {
    failures: VecDeque<bool>,
    connect_calls: usize,
}

/// Connector whose connections are handed to the test through a channel
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
    accepted_tx: mpsc::UnboundedSender<MockServerConn>,
    gate: Option<Arc<Semaphore>>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockServerConn>) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let connector = Self {
            state: Arc::new(Mutex::new(MockState {
                failures: VecDeque::new(),
                connect_calls: 0,
            })),
            accepted_tx,
            gate: None,
        };
        (connector, accepted_rx)
    }

    /// Every connect waits for a permit on this semaphore first
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Script upcoming attempts: `true` refuses the connection
    pub fn fail_next(&self, count: usize) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.failures.push_back(true);
        }
    }

    pub fn connect_calls(&self) -> usize {
        self.state.lock().connect_calls
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &Url) -> Result<(FrameSink, FrameStream)> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| RealtimeError::Connection(e.to_string()))?
                .forget();
        }

        let refuse = {
            let mut state = self.state.lock();
            state.connect_calls += 1;
            state.failures.pop_front().unwrap_or(false)
        };
        if refuse {
            return Err(RealtimeError::Connection("connection refused".to_string()));
        }

        let (out_tx, out_rx) = fmpsc::unbounded::<String>();
        let (in_tx, in_rx) = fmpsc::unbounded::<Result<Frame>>();

        let _ = self.accepted_tx.send(MockServerConn {
            url: url.clone(),
            outbound: out_rx,
            inbound: Some(in_tx),
        });

        let sink: FrameSink = Box::pin(
            out_tx.sink_map_err(|e| RealtimeError::Connection(format!("mock sink closed: {e}"))),
        );
        let stream: FrameStream = Box::pin(in_rx);
        Ok((sink, stream))
    }
}
