//! Connection set owned by the relay actor
//!
//! This module tracks which clients are connected to the relay and how to
//! reach them:
//! - Connection admission with a capacity limit
//! - Per-client outbound queues feeding each socket's writer task
//! - Fan-out of a received frame to every client except its sender, dropping
//!   any client whose queue is full or whose writer has stopped
//!
//! Only the relay's event loop touches the manager, so no locking is needed.

use log::{info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};

/// One raw frame, shared between every recipient's queue
pub type Frame = Arc<[u8]>;

/// A connected client and the queue its writer task drains
#[derive(Debug)]
pub struct Client {
    /// Relay-local connection identifier
    pub id: u32,
    /// Peer address, used for logging
    pub addr: SocketAddr,
    /// When the connection was accepted
    pub connected_at: Instant,
    /// Frames received from this client so far
    pub frames_received: u64,
    outbox: mpsc::Sender<Frame>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr, outbox: mpsc::Sender<Frame>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            frames_received: 0,
            outbox,
        }
    }

    /// Queues a frame for this client's writer without waiting
    pub fn try_send(&self, frame: Frame) -> Result<(), TrySendError<Frame>> {
        self.outbox.try_send(frame)
    }
}

/// Result of relaying one frame
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: Vec<u32>,
}

/// Manages every live relay connection
pub struct ClientManager {
    /// Connected clients indexed by their connection ID
    clients: HashMap<u32, Client>,
    /// Next available ID for new connections
    next_client_id: u32,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Admits a new connection
    ///
    /// Returns Some(client_id) if successful, None if the relay is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr, outbox: mpsc::Sender<Frame>) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, outbox));

        Some(client_id)
    }

    /// Removes a client from the set
    ///
    /// Dropping the client's outbox ends its writer task, which closes the
    /// socket. Returns true if the client was present.
    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!(
                "Client {} disconnected from {} after {:.1}s ({} frames)",
                client.id,
                client.addr,
                client.connected_at.elapsed().as_secs_f32(),
                client.frames_received
            );
            true
        } else {
            false
        }
    }

    /// Relays a frame from `sender_id` to every other client
    ///
    /// A full or closed queue for one recipient is logged and skipped; it
    /// never prevents delivery to the others.
    pub fn broadcast_from(&mut self, sender_id: u32, frame: &Frame) -> BroadcastReport {
        if let Some(sender) = self.clients.get_mut(&sender_id) {
            sender.frames_received += 1;
        }

        let mut report = BroadcastReport::default();
        for (id, client) in &self.clients {
            if *id == sender_id {
                continue;
            }

            match client.try_send(Arc::clone(frame)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Client {} is not keeping up, disconnecting", id);
                    report.failed.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    warn!("Client {} writer has stopped, disconnecting", id);
                    report.failed.push(*id);
                }
            }
        }

        for id in &report.failed {
            self.remove_client(id);
        }
        report
    }

    pub fn contains(&self, client_id: &u32) -> bool {
        self.clients.contains_key(client_id)
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
