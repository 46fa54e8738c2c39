//! # Game Client Library
//!
//! A player's side of an action session. The client owns nothing
//! authoritative: it asks the host to run actions for its character and
//! plays the cosmetic half of every action the host confirms, for every
//! character it can see.
//!
//! ## Module Organization
//!
//! ### Action Player (`action_player`)
//! Per-character playback of confirmed actions. For the local character it
//! also starts actions the moment input happens and reconciles them with
//! the host's confirmation.
//!
//! ### Game (`game`)
//! The world as last replicated by the host, answering the queries actions
//! make, and the set of action players for the characters in it.
//!
//! ### Input (`input`)
//! Scripted input: picks the nearest foe and works through an ability
//! rotation.
//!
//! ### Network (`network`)
//! UDP transport and the client loop driving the connection state machine,
//! including reconnection after the host drops us.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new(ClientConfig::default());
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod action_player;
pub mod game;
pub mod input;
pub mod network;
