use shared::{DEFAULT_MAX_FRAME_BYTES, DEFAULT_PORT};
use std::net::SocketAddr;
use std::time::Duration;

/// Settings for one client network session and the state it feeds
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub server_addr: SocketAddr,
    /// Cadence of the publish cycle
    pub publish_interval: Duration,
    pub connect_timeout: Duration,
    /// Outgoing messages held before the oldest is dropped
    pub outgoing_capacity: usize,
    pub max_frame_bytes: usize,
    /// How long a remote bullet stays visible after it is announced
    pub remote_bullet_ttl: Duration,
    /// Evict remote players not heard from for this long; `None` keeps them forever
    pub stale_after: Option<Duration>,
    pub chat_history: usize,
    pub event_feed: usize,
}

impl SessionConfig {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            publish_interval: Duration::from_secs_f64(1.0 / 60.0),
            connect_timeout: Duration::from_secs(5),
            outgoing_capacity: 256,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            remote_bullet_ttl: Duration::from_secs(1),
            stale_after: None,
            chat_history: 8,
            event_feed: 5,
        }
    }
}
