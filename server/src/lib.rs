//! # Relay Server Library
//!
//! This library implements the relay that connects flight clients to each
//! other. It holds no game state at all: every client is authoritative for its
//! own plane, and the relay only moves bytes between them.
//!
//! ## Core Responsibilities
//!
//! ### Connection Management
//! Accepts TCP connections on the game port, enforces a client limit, and
//! forgets a client as soon as its socket closes or errors. No leave message
//! is generated; peers simply stop hearing from it.
//!
//! ### Message Relay
//! Every complete JSON message received from one client is forwarded, byte for
//! byte, to every other connected client and never back to its sender. A
//! failed delivery to one client is logged and does not affect the others.
//!
//! ## Architecture Design
//!
//! ### Single-Owner Event Loop
//! The connection set is owned by one event loop task. Per-connection reader
//! tasks report frames and closures over a channel, and per-connection writer
//! tasks drain a bounded outbox, so the set itself never needs a lock.
//!
//! ### Stream Framing
//! TCP delivers a byte stream, not messages. Readers use the shared
//! [`shared::Framer`] to cut the stream into whole JSON documents before
//! relaying them, so a message split across reads is never forwarded in
//! pieces.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::RelayConfig;
//! use server::network::RelayServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let relay = RelayServer::bind(RelayConfig::default()).await?;
//!     relay.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod network;

pub use config::RelayConfig;
pub use network::{RelayError, RelayServer};
