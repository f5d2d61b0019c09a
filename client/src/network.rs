//! Client network session
//!
//! One tokio task per session. After connecting it runs a fixed-cadence
//! publish cycle: send the local snapshot, flush the outgoing queue, read
//! whatever bytes are already waiting without blocking, then dispatch every
//! complete message to the [`ClientWorld`]. The session never reconnects; any
//! failure leaves it `Disconnected` while the local simulation carries on.

use crate::config::SessionConfig;
use crate::game::ClientWorld;
use log::{debug, info, warn};
use parking_lot::Mutex;
use shared::{FrameError, Framer, Message};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

const READ_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("could not resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("timed out connecting to {0}")]
    ConnectTimeout(SocketAddr),
    #[error("network error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    ConnectFailed(String),
    ServerClosed,
    TransportError(String),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Connecting,
    Connected,
    Disconnected(DisconnectReason),
}

impl SessionStatus {
    /// Human-readable status for whatever presents the session to the player
    pub fn status_line(&self) -> String {
        match self {
            SessionStatus::Connecting => "Connecting...".to_string(),
            SessionStatus::Connected => "Connected".to_string(),
            SessionStatus::Disconnected(DisconnectReason::ConnectFailed(error)) => {
                format!("Error: {}", error)
            }
            SessionStatus::Disconnected(_) => "Disconnected".to_string(),
        }
    }

    /// Terminal status for a session that never got a connection
    pub fn connect_failed(error: &SessionError) -> Self {
        SessionStatus::Disconnected(DisconnectReason::ConnectFailed(error.to_string()))
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, SessionStatus::Connected)
    }
}

/// Looks up the relay address for `host`
pub fn resolve_server(host: &str, port: u16) -> Result<SocketAddr, SessionError> {
    let resolve_error = |source: io::Error| SessionError::Resolve {
        host: host.to_string(),
        source,
    };
    (host, port)
        .to_socket_addrs()
        .map_err(resolve_error)?
        .next()
        .ok_or_else(|| resolve_error(io::Error::new(io::ErrorKind::NotFound, "no addresses")))
}

/// Handle kept by the simulation side of a running session
pub struct SessionHandle {
    status: Arc<Mutex<SessionStatus>>,
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Current status. A task that stopped without reporting is shown as disconnected.
    pub fn status(&self) -> SessionStatus {
        if self.task.is_finished() {
            mark_stopped(&self.status, &self.running);
        }
        self.status.lock().clone()
    }

    pub fn status_line(&self) -> String {
        self.status().status_line()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Asks the session to stop; it notices at the top of its next cycle
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Waits for the session task to finish and returns its final status
    pub async fn join(self) -> SessionStatus {
        if let Err(e) = self.task.await {
            warn!("Network session task failed: {}", e);
        }
        mark_stopped(&self.status, &self.running);
        let status = self.status.lock().clone();
        status
    }
}

/// Moves a session whose task has ended into `Disconnected` if it never got there itself
fn mark_stopped(status: &Mutex<SessionStatus>, running: &AtomicBool) {
    running.store(false, Ordering::SeqCst);
    let mut status = status.lock();
    if !matches!(*status, SessionStatus::Disconnected(_)) {
        *status = SessionStatus::Disconnected(DisconnectReason::TransportError(
            "network session stopped unexpectedly".to_string(),
        ));
    }
}

pub struct NetworkSession {
    config: SessionConfig,
    world: Arc<ClientWorld>,
    status: Arc<Mutex<SessionStatus>>,
    running: Arc<AtomicBool>,
}

impl NetworkSession {
    /// Starts a session on the current tokio runtime
    pub fn spawn(config: SessionConfig, world: Arc<ClientWorld>) -> SessionHandle {
        let status = Arc::new(Mutex::new(SessionStatus::Connecting));
        let running = Arc::new(AtomicBool::new(true));

        let session = NetworkSession {
            config,
            world,
            status: Arc::clone(&status),
            running: Arc::clone(&running),
        };
        let task = tokio::spawn(session.run());

        SessionHandle {
            status,
            running,
            task,
        }
    }

    async fn run(self) {
        let addr = self.config.server_addr;
        info!("Connecting to {}", addr);

        let stream = match self.connect().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Could not connect to server: {}", e);
                self.running.store(false, Ordering::SeqCst);
                self.set_status(SessionStatus::connect_failed(&e));
                return;
            }
        };

        info!("Connected to {} as player {}", addr, self.world.player_id());
        self.set_status(SessionStatus::Connected);
        self.world.announce_join();

        let reason = match self.serve(stream).await {
            Ok(reason) => reason,
            Err(e) => {
                warn!("Network error: {}", e);
                DisconnectReason::TransportError(e.to_string())
            }
        };
        info!("Session ended: {:?}", reason);
        self.finish(reason);
    }

    async fn connect(&self) -> Result<TcpStream, SessionError> {
        let addr = self.config.server_addr;
        let stream = timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| SessionError::ConnectTimeout(addr))?
            .map_err(|source| SessionError::Connect { addr, source })?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle: {}", e);
        }
        Ok(stream)
    }

    /// Runs publish cycles until shutdown, server close or an I/O error
    async fn serve(&self, mut stream: TcpStream) -> Result<DisconnectReason, SessionError> {
        let mut ticker = interval(self.config.publish_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut framer = Framer::new(self.config.max_frame_bytes);
        let mut buffer = [0u8; READ_BUFFER_SIZE];

        loop {
            ticker.tick().await;

            if !self.running.load(Ordering::SeqCst) {
                let _ = stream.shutdown().await;
                return Ok(DisconnectReason::Shutdown);
            }

            self.publish(&mut stream).await?;

            if !self.receive(&stream, &mut framer, &mut buffer)? {
                return Ok(DisconnectReason::ServerClosed);
            }

            self.world.maintain(Instant::now());
        }
    }

    /// Sends the state snapshot followed by everything queued since last cycle
    async fn publish(&self, stream: &mut TcpStream) -> Result<(), SessionError> {
        let mut batch = self.world.snapshot().encode()?;
        for message in self.world.outgoing().drain() {
            batch.extend_from_slice(&message.encode()?);
        }
        stream.write_all(&batch).await?;
        Ok(())
    }

    /// Reads every byte already available and dispatches complete messages.
    ///
    /// Returns false once the server has closed the connection.
    fn receive(
        &self,
        stream: &TcpStream,
        framer: &mut Framer,
        buffer: &mut [u8],
    ) -> Result<bool, SessionError> {
        let mut open = true;
        loop {
            match stream.try_read(buffer) {
                Ok(0) => {
                    open = false;
                    break;
                }
                Ok(len) => framer.push(&buffer[..len]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }

        while let Some(frame) = framer.next_frame()? {
            match Message::decode(&frame) {
                Ok(message) => {
                    let kind = message.kind();
                    let outcome = self.world.apply_message(message);
                    debug!("Dispatched {} message: {:?}", kind, outcome);
                }
                Err(e) => warn!("Skipping undecodable message: {}", e),
            }
        }
        Ok(open)
    }

    fn set_status(&self, status: SessionStatus) {
        *self.status.lock() = status;
    }

    fn finish(&self, reason: DisconnectReason) {
        self.running.store(false, Ordering::SeqCst);
        self.set_status(SessionStatus::Disconnected(reason));
    }
}
