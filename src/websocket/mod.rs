// WebSocket module - transport seam for the connection manager
mod factory;
#[cfg(test)]
pub(crate) mod mock;

pub use factory::{Connector, Frame, FrameSink, FrameStream, WebSocketFactory};
