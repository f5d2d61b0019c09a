//! # Flight Client Library
//!
//! This library provides the networking and combat core of a multiplayer
//! dogfight client. Rendering, input and flight physics live elsewhere; this
//! crate owns everything that has to agree with other players.
//!
//! ## Architecture Overview
//!
//! Every client is authoritative for its own plane. It publishes a full state
//! snapshot at a fixed cadence through the relay, mirrors every other plane
//! it hears about, and decides on its own which of its projectiles hit.
//!
//! ### Client-Authoritative State
//! The local pilot's position, health and score are never corrected by
//! anyone else. Remote planes are read-only mirrors rebuilt from the state
//! messages their owners send.
//!
//! ### Attacker-Side Hit Detection
//! Projectiles are simulated only by the client that fired them. When one
//! lands, the attacker credits its own score immediately and sends a hit
//! message so the victim can apply the damage to itself.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The shared local state the simulation and the network both touch:
//! - The local pilot and its plane preset
//! - Chat history and the event feed
//! - Dispatch of received messages
//! - Scoreboard view
//!
//! ### Registry Module (`registry`)
//! Mirrors of remote planes and their announced bullets, keyed by player id,
//! plus duplicate hit detection.
//!
//! ### Combat Module (`combat`)
//! Projectile kinematics and hit resolution against every known plane.
//!
//! ### Network Module (`network`)
//! The background session: connect, publish cycle, non-blocking receive and
//! status reporting.
//!
//! ### Publisher and Queue Modules (`publisher`, `queue`)
//! The per-cycle state snapshot and the bounded hand-off of outgoing
//! messages from the simulation to the session.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::config::SessionConfig;
//! use client::game::{random_player_id, ClientWorld, LocalPilot, PLANE_PRESETS};
//! use client::network::NetworkSession;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SessionConfig::default();
//!     let pilot = LocalPilot::new(random_player_id(), "Alice", PLANE_PRESETS[0]);
//!     let world = Arc::new(ClientWorld::new(pilot, &config));
//!     let session = NetworkSession::spawn(config, Arc::clone(&world));
//!
//!     world.fire();
//!     world.simulate_tick();
//!     println!("{}", session.status_line());
//! }
//! ```
//!
//! ## Failure Model
//!
//! Nothing here is fatal to the process. A failed connect or a dropped
//! connection leaves the session `Disconnected` with a readable status line,
//! and the local simulation keeps running solo.

pub mod combat;
pub mod config;
pub mod game;
pub mod network;
pub mod publisher;
pub mod queue;
pub mod registry;
