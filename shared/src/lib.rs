//! Code both peers run: the action engine, the wire protocol, the session
//! registry and the connection state machine.

pub mod action;
pub mod connection;
pub mod math;
pub mod protocol;
pub mod session;
pub mod world;

pub use action::{Action, ActionCatalog, ActionConfig, ActionFactory, ActionId, ActionRequestData};
pub use math::Vec3;
pub use protocol::{ConnectStatus, ConnectionPayload, Packet, ProtocolError};
pub use session::{ClientId, PlayerSessionData, SessionManager};
pub use world::{EntityId, LifeState, World, WorldQuery};

/// Default simulation rate of the host, in ticks per second.
pub const DEFAULT_TICK_RATE: u32 = 60;
