// Module declarations
mod builder;
mod connection;
mod core;
mod state;

#[cfg(test)]
mod tests;

// Public API exports
pub use builder::{RealtimeClientBuilder, RealtimeClientOptions};
pub use connection::{ConnectionManager, ConnectionState, Delivery};
pub use self::core::RealtimeClient;
pub use state::{ClientState, EventBinding};
