//! Wire protocol between host and clients.
//!
//! Every datagram is one bincode-encoded [`Packet`]. The connection payload a
//! client presents for approval travels as opaque bytes inside
//! [`Packet::Connect`] so the host can bound its size before decoding it.

use crate::action::{ActionId, ActionRequestData};
use crate::math::Vec3;
use crate::world::{EntityId, LifeState};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Connection payloads larger than this are rejected without being decoded.
pub const MAX_CONNECT_PAYLOAD: usize = 1024;

/// Outcome codes published by the connection state machine and carried as
/// disconnect reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConnectStatus {
    #[default]
    Undefined,
    Success,
    ServerFull,
    LoggedInAgain,
    UserRequestedDisconnect,
    GenericDisconnect,
    Reconnecting,
    IncompatibleBuildType,
    HostEndedSession,
    StartHostFailed,
    StartClientFailed,
}

impl ConnectStatus {
    /// Reasons after which a reconnecting client gives up immediately.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConnectStatus::UserRequestedDisconnect
                | ConnectStatus::HostEndedSession
                | ConnectStatus::ServerFull
                | ConnectStatus::IncompatibleBuildType
        )
    }
}

impl fmt::Display for ConnectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectStatus::Undefined => "Undefined",
            ConnectStatus::Success => "Connected",
            ConnectStatus::ServerFull => "Connection failed: the host is full",
            ConnectStatus::LoggedInAgain => "Disconnected: logged in from another client",
            ConnectStatus::UserRequestedDisconnect => "Disconnected by user",
            ConnectStatus::GenericDisconnect => "Disconnected: connection to the host was lost",
            ConnectStatus::Reconnecting => "Attempting to reconnect",
            ConnectStatus::IncompatibleBuildType => {
                "Connection failed: server and client builds are not compatible"
            }
            ConnectStatus::HostEndedSession => "Disconnected: the host has ended the game session",
            ConnectStatus::StartHostFailed => "Failed to start host",
            ConnectStatus::StartClientFailed => "Failed to connect to the host",
        };
        f.write_str(text)
    }
}

/// What a client presents when asking to join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionPayload {
    /// Persistent identity that survives reconnection.
    pub player_id: String,
    pub player_name: String,
    pub is_debug: bool,
}

impl ConnectionPayload {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serialize(self).map_err(ProtocolError::Encode)
    }

    /// Decodes a payload, refusing anything over [`MAX_CONNECT_PAYLOAD`]
    /// without looking at its contents.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() > MAX_CONNECT_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: MAX_CONNECT_PAYLOAD,
            });
        }
        bincode::deserialize(bytes).map_err(ProtocolError::Decode)
    }
}

/// Replicated view of one character, sent every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    pub id: EntityId,
    pub name: String,
    pub is_npc: bool,
    pub position: Vec3,
    pub facing: Vec3,
    pub hit_points: i32,
    pub life_state: LifeState,
    pub target: Option<EntityId>,
    pub held_object: Option<EntityId>,
    pub is_stealthy: bool,
    pub is_moving: bool,
    pub forced_movement: bool,
}

/// Replicated view of a carriable object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    pub id: EntityId,
    pub position: Vec3,
    pub holder: Option<EntityId>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    // client -> host
    Connect {
        payload: Vec<u8>,
    },
    ActionRequest {
        data: ActionRequestData,
    },
    MoveRequest {
        destination: Vec3,
    },
    StopChargingUp,
    Heartbeat,
    Disconnect,

    // host -> client
    Connected {
        client_id: u64,
        character: Option<EntityId>,
    },
    Disconnected {
        /// `None` means the connection dropped without an explicit reason.
        reason: Option<ConnectStatus>,
    },
    LoadScene {
        name: String,
    },
    Snapshot {
        tick: u32,
        timestamp: u64,
        characters: Vec<CharacterSnapshot>,
        objects: Vec<ObjectSnapshot>,
    },
    PlayAction {
        character: EntityId,
        data: ActionRequestData,
    },
    CancelAllActions {
        character: EntityId,
    },
    CancelActionsById {
        character: EntityId,
        action_id: ActionId,
    },
    StoppedChargingUp {
        character: EntityId,
        percent: f32,
    },
}

impl Packet {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serialize(self).map_err(ProtocolError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        bincode::deserialize(bytes).map_err(ProtocolError::Decode)
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to encode: {0}")]
    Encode(#[source] bincode::Error),
    #[error("failed to decode: {0}")]
    Decode(#[source] bincode::Error),
    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },
}
