/// Real-time frame type strings (magic strings layer)
pub mod message_types {
    pub const HEARTBEAT: &str = "heartbeat";
    pub const HEARTBEAT_ACK: &str = "heartbeat_ack";
    pub const SUBSCRIBE: &str = "subscribe";
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    pub const CONTENT_UPDATE: &str = "content_update";
    pub const PRESENCE_UPDATE: &str = "presence_update";
    pub const NOTIFICATION: &str = "notification";
    pub const ANALYTICS_UPDATE: &str = "analytics_update";
    pub const PUBLISHING_UPDATE: &str = "publishing_update";
    pub const COLLABORATION_UPDATE: &str = "collaboration_update";
}

/// HTTP header names
pub mod headers {
    pub const API_KEY: &str = "X-API-Key";
    pub const REQUEST_ID: &str = "X-Request-ID";
    pub const RETRY_AFTER: &str = "Retry-After";
}

/// Query parameter carrying the session token on the WebSocket handshake
pub const HANDSHAKE_TOKEN_PARAM: &str = "token";

/// Default refresh endpoint path, relative to the API base URL
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

/// Default HTTP timeout (milliseconds)
pub const DEFAULT_TIMEOUT: u64 = 30000;

/// Default retry budget per HTTP call
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay for exponential HTTP backoff (milliseconds)
pub const DEFAULT_RETRY_BASE_DELAY: u64 = 1000;

/// Cap for exponential HTTP backoff (milliseconds)
pub const MAX_BACKOFF_DELAY: u64 = 10000;

/// Cap for server-advertised rate-limit waits (milliseconds)
pub const MAX_RATE_LIMIT_DELAY: u64 = 30000;

/// Retry-After fallback when the header is missing or malformed (seconds)
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Jitter ceiling as a fraction of the exponential delay
pub const BACKOFF_JITTER_RATIO: f64 = 0.1;

/// Default heartbeat interval (milliseconds)
pub const HEARTBEAT_INTERVAL: u64 = 30000;

/// Reconnect backoff base and cap (milliseconds)
pub const RECONNECT_BASE_DELAY: u64 = 1000;
pub const RECONNECT_MAX_DELAY: u64 = 30000;

/// Default reconnect attempt budget
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Max outbound queue size while disconnected
pub const MAX_OUTBOUND_QUEUE_SIZE: usize = 1000;

/// Capacity of each listener channel
pub const LISTENER_CHANNEL_CAPACITY: usize = 100;

/// WebSocket close codes
pub const WS_CLOSE_NORMAL: u16 = 1000;

/// Idle time after the last keystroke before typing is cleared (milliseconds)
pub const DEFAULT_TYPING_TIMEOUT: u64 = 3000;

/// Entries kept by an activity feed
pub const DEFAULT_ACTIVITY_FEED_SIZE: usize = 50;
