//! Relay network layer: TCP accept loop and frame fan-out
//!
//! One event loop owns the [`ClientManager`]. Every accepted socket is split
//! into a reader task, which frames incoming bytes and reports each complete
//! message to the loop, and a writer task, which drains that client's outbox.
//! The loop relays each frame to every other client byte for byte, without
//! decoding it.

use crate::client_manager::{ClientManager, Frame};
use crate::config::RelayConfig;
use log::{debug, error, info, warn};
use shared::{FrameError, Framer};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

const READ_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("relay I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Why a client's reader stopped
#[derive(Debug)]
pub enum CloseReason {
    PeerClosed,
    ReadError(io::Error),
    Oversized(FrameError),
}

/// Messages sent from connection tasks to the relay loop
#[derive(Debug)]
pub enum RelayEvent {
    FrameReceived { client_id: u32, frame: Frame },
    ClientClosed { client_id: u32, reason: CloseReason },
}

/// Relay server rebroadcasting every client message to all other clients
pub struct RelayServer {
    listener: TcpListener,
    config: RelayConfig,
    clients: ClientManager,
    event_tx: mpsc::UnboundedSender<RelayEvent>,
    event_rx: mpsc::UnboundedReceiver<RelayEvent>,
    live_clients: Arc<AtomicUsize>,
}

impl RelayServer {
    pub async fn bind(config: RelayConfig) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: config.bind_addr,
                source,
            })?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(RelayServer {
            listener,
            clients: ClientManager::new(config.max_clients),
            config,
            event_tx,
            event_rx,
            live_clients: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Live connection count, readable after `run` takes ownership
    pub fn connection_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.live_clients)
    }

    /// Main relay loop: accepts clients and relays their frames until the task is dropped
    pub async fn run(mut self) -> Result<(), RelayError> {
        info!("Relay listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.accept_client(stream, addr),
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                },

                Some(event) = self.event_rx.recv() => {
                    self.handle_event(event);
                },
            }
        }
    }

    fn accept_client(&mut self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", addr, e);
        }

        let (outbox_tx, outbox_rx) = mpsc::channel(self.config.peer_queue_depth);
        let Some(client_id) = self.clients.add_client(addr, outbox_tx) else {
            warn!(
                "Rejecting {}: relay is full ({} clients)",
                addr,
                self.clients.len()
            );
            return;
        };
        self.live_clients.store(self.clients.len(), Ordering::SeqCst);

        let (read_half, write_half) = stream.into_split();
        tokio::spawn(read_loop(
            client_id,
            read_half,
            self.config.max_frame_bytes,
            self.event_tx.clone(),
        ));
        tokio::spawn(write_loop(client_id, write_half, outbox_rx));
    }

    fn handle_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::FrameReceived { client_id, frame } => {
                if !self.clients.contains(&client_id) {
                    return;
                }
                let report = self.clients.broadcast_from(client_id, &frame);
                if !report.failed.is_empty() {
                    self.live_clients.store(self.clients.len(), Ordering::SeqCst);
                }
                debug!(
                    "Relayed {} bytes from client {} to {} peers",
                    frame.len(),
                    client_id,
                    report.delivered
                );
            }
            RelayEvent::ClientClosed { client_id, reason } => {
                match reason {
                    CloseReason::PeerClosed => {}
                    CloseReason::ReadError(e) => warn!("Client {} read failed: {}", client_id, e),
                    CloseReason::Oversized(e) => warn!("Client {} dropped: {}", client_id, e),
                }
                self.clients.remove_client(&client_id);
                self.live_clients.store(self.clients.len(), Ordering::SeqCst);
            }
        }
    }
}

/// Reads from one client until it closes, reporting each complete frame
async fn read_loop(
    client_id: u32,
    mut reader: OwnedReadHalf,
    max_frame_bytes: usize,
    events: mpsc::UnboundedSender<RelayEvent>,
) {
    let mut framer = Framer::new(max_frame_bytes);
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    let reason = 'read: loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break CloseReason::PeerClosed,
            Ok(len) => {
                framer.push(&buffer[..len]);
                loop {
                    match framer.next_frame() {
                        Ok(Some(frame)) => {
                            let event = RelayEvent::FrameReceived {
                                client_id,
                                frame: Arc::from(frame),
                            };
                            if events.send(event).is_err() {
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => break 'read CloseReason::Oversized(e),
                    }
                }
            }
            Err(e) => break CloseReason::ReadError(e),
        }
    };

    let _ = events.send(RelayEvent::ClientClosed { client_id, reason });
}

/// Writes queued frames to one client until its outbox is dropped
async fn write_loop(client_id: u32, mut writer: OwnedWriteHalf, mut outbox: mpsc::Receiver<Frame>) {
    while let Some(frame) = outbox.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            warn!("Failed to send to client {}: {}", client_id, e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout, Instant};

    async fn start_relay(config: RelayConfig) -> (SocketAddr, Arc<AtomicUsize>) {
        let config = config.with_bind_addr("127.0.0.1:0".parse().unwrap());
        let relay = RelayServer::bind(config).await.unwrap();
        let addr = relay.local_addr().unwrap();
        let counter = relay.connection_counter();
        tokio::spawn(relay.run());
        (addr, counter)
    }

    async fn wait_for_count(counter: &AtomicUsize, expected: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while counter.load(Ordering::SeqCst) != expected {
            assert!(Instant::now() < deadline, "never reached {} clients", expected);
            sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn test_close_reason_formatting() {
        let reason = CloseReason::Oversized(FrameError::Oversized { len: 10, limit: 5 });
        assert!(format!("{:?}", reason).contains("Oversized"));
    }

    #[tokio::test]
    async fn test_bind_conflict_reports_address() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let result = RelayServer::bind(RelayConfig::default().with_bind_addr(addr)).await;
        match result {
            Err(RelayError::Bind { addr: reported, .. }) => assert_eq!(reported, addr),
            Err(other) => panic!("Unexpected error {}", other),
            Ok(_) => panic!("Bind should fail on a used port"),
        }
    }

    #[tokio::test]
    async fn test_relay_rejects_clients_beyond_capacity() {
        let config = RelayConfig {
            max_clients: 1,
            ..RelayConfig::default()
        };
        let (addr, counter) = start_relay(config).await;

        let _first = TcpStream::connect(addr).await.unwrap();
        wait_for_count(&counter, 1).await;

        let mut second = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 16];
        let read = timeout(Duration::from_secs(2), second.read(&mut buf))
            .await
            .expect("rejected socket should be closed");
        assert!(matches!(read, Ok(0) | Err(_)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_oversized_partial_frame_disconnects_client() {
        let config = RelayConfig {
            max_frame_bytes: 32,
            ..RelayConfig::default()
        };
        let (addr, counter) = start_relay(config).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        wait_for_count(&counter, 1).await;

        let unterminated = format!(r#"{{"type":"chat","name":"{}""#, "x".repeat(64));
        client.write_all(unterminated.as_bytes()).await.unwrap();

        wait_for_count(&counter, 0).await;
    }
    #[tokio::test]
    async fn test_slow_reader_is_disconnected() {
        let config = RelayConfig {
            peer_queue_depth: 1,
            ..RelayConfig::default()
        };
        let (addr, counter) = start_relay(config).await;

        let mut sender = TcpStream::connect(addr).await.unwrap();
        wait_for_count(&counter, 1).await;
        let _slow = TcpStream::connect(addr).await.unwrap();
        wait_for_count(&counter, 2).await;

        let chat = format!(r#"{{"type":"chat","name":"A","text":"{}"}}"#, "x".repeat(60_000));
        tokio::spawn(async move {
            for _ in 0..400 {
                if sender.write_all(chat.as_bytes()).await.is_err() {
                    break;
                }
            }
            sender
        });

        wait_for_count(&counter, 1).await;
    }
}
