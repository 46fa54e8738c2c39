//! # Game Server Library
//!
//! The authoritative host of an action session. It owns the real world:
//! characters, their hit points and movement, and the action players that
//! schedule every ability they use. Clients only ever ask; the server decides
//! and tells them what happened.
//!
//! ## Module Organization
//!
//! ### Action Player (`action_player`)
//! Per-character scheduler: a queue of blocking actions, a set of
//! non-blocking ones, and follow-up chaining, with backpressure when a
//! client floods requests.
//!
//! ### Characters and Movement (`character`, `movement`)
//! Character classes, life state and the movement modes actions command
//! (pathing, following, charging, knockback).
//!
//! ### World (`world`)
//! The spatial queries and mutations actions run against, plus projectile
//! and charge collision handling.
//!
//! ### Game (`game`)
//! Ties the world to connected clients and saves each player's character
//! into their session so a reconnecting player picks up where they left.
//!
//! ### Client Manager and Network (`client_manager`, `network`)
//! UDP plumbing: who is connected from where, and the tick loop that drives
//! the host connection state machine.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod action_player;
pub mod character;
pub mod client_manager;
pub mod game;
pub mod movement;
pub mod network;
pub mod world;
