use shared::{DEFAULT_MAX_FRAME_BYTES, DEFAULT_PORT};
use std::net::{Ipv4Addr, SocketAddr};

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    pub max_clients: usize,
    /// Largest incomplete message a client may leave buffered
    pub max_frame_bytes: usize,
    /// Frames queued per recipient before it is disconnected as too slow
    pub peer_queue_depth: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_clients: 32,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            peer_queue_depth: 1024,
        }
    }
}

impl RelayConfig {
    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }
}
