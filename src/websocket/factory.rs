use crate::types::{RealtimeError, Result};
use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use url::Url;

/// Inbound transport frame, reduced to what the connection manager acts on
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Close { code: Option<u16>, reason: String },
}

/// Write half of an open transport
pub type FrameSink = Pin<Box<dyn Sink<String, Error = RealtimeError> + Send>>;

/// Read half of an open transport
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame>> + Send>>;

/// Opens transports for the connection manager.
///
/// The production implementation is [`WebSocketFactory`]; tests plug in an
/// in-memory connector.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &Url) -> Result<(FrameSink, FrameStream)>;
}

/// WebSocket factory for creating WebSocket connections
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketFactory;

#[async_trait]
impl Connector for WebSocketFactory {
    async fn connect(&self, url: &Url) -> Result<(FrameSink, FrameStream)> {
        tracing::debug!(
            "Creating WebSocket connection to: {}",
            url.host_str().unwrap_or_default()
        );

        let (ws_stream, response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        tracing::debug!("WebSocket handshake completed with status {}", response.status());

        let (write_half, read_half) = ws_stream.split();

        let sink = write_half
            .with(|text: String| {
                futures::future::ready(Ok::<_, WsError>(Message::Text(text.into())))
            })
            .sink_map_err(RealtimeError::from);

        let stream = read_half.filter_map(|msg_result| async move {
            match msg_result {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_string()))),
                Ok(Message::Close(frame)) => Some(Ok(match frame {
                    Some(close_frame) => Frame::Close {
                        code: Some(u16::from(close_frame.code)),
                        reason: close_frame.reason.as_str().to_string(),
                    },
                    None => Frame::Close {
                        code: None,
                        reason: String::new(),
                    },
                })),
                Ok(Message::Binary(data)) => {
                    tracing::warn!("Received unexpected binary message ({} bytes)", data.len());
                    None
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => None,
                Err(e) => Some(Err(RealtimeError::from(e))),
            }
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
