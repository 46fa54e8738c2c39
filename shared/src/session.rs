//! Reconnection-aware registry of per-player session data.
//!
//! Players are keyed by a persistent player id chosen by the client; the
//! transient client id assigned by the transport changes on every
//! connection. A player who drops mid-session keeps their record, marked
//! disconnected, so reconnecting with the same player id restores it.
//! Records of players still disconnected when the session ends are purged.

use crate::math::Vec3;
use log::{debug, error};
use std::collections::HashMap;

/// Transport-assigned identifier of one connection.
pub type ClientId = u64;

/// Data the registry can carry across reconnections.
pub trait SessionPlayerData: Clone {
    fn client_id(&self) -> ClientId;
    fn set_client_id(&mut self, client_id: ClientId);
    fn is_connected(&self) -> bool;
    fn set_connected(&mut self, connected: bool);
    /// Resets per-session fields between two sessions.
    fn reinitialize(&mut self);
}

/// What the game keeps about a player between connections.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSessionData {
    pub client_id: ClientId,
    pub is_connected: bool,
    pub player_name: String,
    pub position: Vec3,
    pub facing: Vec3,
    pub hit_points: i32,
    pub has_character_spawned: bool,
}

impl PlayerSessionData {
    pub fn new(client_id: ClientId, player_name: &str) -> Self {
        Self {
            client_id,
            is_connected: true,
            player_name: player_name.to_string(),
            position: Vec3::ZERO,
            facing: Vec3::FORWARD,
            hit_points: 0,
            has_character_spawned: false,
        }
    }
}

impl SessionPlayerData for PlayerSessionData {
    fn client_id(&self) -> ClientId {
        self.client_id
    }

    fn set_client_id(&mut self, client_id: ClientId) {
        self.client_id = client_id;
    }

    fn is_connected(&self) -> bool {
        self.is_connected
    }

    fn set_connected(&mut self, connected: bool) {
        self.is_connected = connected;
    }

    fn reinitialize(&mut self) {
        self.has_character_spawned = false;
    }
}

/// Registry mapping player ids to their session data.
///
/// One instance lives as long as the hosting session; the host creates it and
/// hands it to whoever needs it. All access happens on the simulation thread.
pub struct SessionManager<T: SessionPlayerData> {
    client_data: HashMap<String, T>,
    client_id_to_player_id: HashMap<ClientId, String>,
    has_session_started: bool,
}

impl<T: SessionPlayerData> Default for SessionManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SessionPlayerData> SessionManager<T> {
    pub fn new() -> Self {
        Self {
            client_data: HashMap::new(),
            client_id_to_player_id: HashMap::new(),
            has_session_started: false,
        }
    }

    pub fn has_session_started(&self) -> bool {
        self.has_session_started
    }

    /// Handles a client leaving. Before the session starts its data is
    /// dropped; afterwards it is kept, marked disconnected.
    pub fn disconnect_client(&mut self, client_id: ClientId) {
        if self.has_session_started {
            let Some(player_id) = self.client_id_to_player_id.get(&client_id) else {
                return;
            };
            if let Some(data) = self.client_data.get_mut(player_id) {
                if data.client_id() == client_id {
                    data.set_connected(false);
                }
            }
        } else if let Some(player_id) = self.client_id_to_player_id.remove(&client_id) {
            let owned_by_client = self
                .client_data
                .get(&player_id)
                .map_or(false, |data| data.client_id() == client_id);
            if owned_by_client {
                self.client_data.remove(&player_id);
            }
        }
    }

    /// Whether `player_id` is already connected through another client.
    pub fn is_duplicate_connection(&self, player_id: &str) -> bool {
        self.client_data
            .get(player_id)
            .map_or(false, |data| data.is_connected())
    }

    /// Registers a newly approved client.
    ///
    /// A player reconnecting after a drop gets their old record back, only
    /// the client id and connected flag are refreshed; `data` is ignored in
    /// that case. A player who is still connected elsewhere is refused.
    pub fn setup_connecting_player_session_data(&mut self, client_id: ClientId, player_id: &str, data: T) {
        if self.is_duplicate_connection(player_id) {
            error!(
                "Player ID {} already exists. This is a duplicate connection. Rejecting this session data.",
                player_id
            );
            return;
        }

        let record = match self.client_data.get(player_id) {
            Some(existing) if !existing.is_connected() => {
                debug!("Player {} is reconnecting as client {}", player_id, client_id);
                let mut restored = existing.clone();
                restored.set_client_id(client_id);
                restored.set_connected(true);
                restored
            }
            _ => data,
        };

        self.client_id_to_player_id
            .insert(client_id, player_id.to_string());
        self.client_data.insert(player_id.to_string(), record);
    }

    pub fn player_id(&self, client_id: ClientId) -> Option<&str> {
        let player_id = self.client_id_to_player_id.get(&client_id);
        if player_id.is_none() {
            debug!("No client player ID found mapped to the given client ID: {}", client_id);
        }
        player_id.map(String::as_str)
    }

    pub fn player_data(&self, client_id: ClientId) -> Option<&T> {
        let player_id = self.player_id(client_id)?;
        self.player_data_by_player_id(player_id)
    }

    pub fn player_data_by_player_id(&self, player_id: &str) -> Option<&T> {
        let data = self.client_data.get(player_id);
        if data.is_none() {
            debug!("No PlayerData of matching player ID found: {}", player_id);
        }
        data
    }

    pub fn set_player_data(&mut self, client_id: ClientId, data: T) {
        match self.client_id_to_player_id.get(&client_id) {
            Some(player_id) => {
                self.client_data.insert(player_id.clone(), data);
            }
            None => error!("No client player ID found mapped to the given client ID: {}", client_id),
        }
    }

    pub fn on_session_started(&mut self) {
        self.has_session_started = true;
    }

    /// Purges players still disconnected and resets the rest for the next
    /// session.
    pub fn on_session_ended(&mut self) {
        self.clear_disconnected_players_data();
        self.reinitialize_players_data();
        self.has_session_started = false;
    }

    /// Forgets everything; the host is going away.
    pub fn on_server_ended(&mut self) {
        self.client_data.clear();
        self.client_id_to_player_id.clear();
        self.has_session_started = false;
    }

    /// Players with a record, connected or not.
    pub fn player_count(&self) -> usize {
        self.client_data.len()
    }

    fn clear_disconnected_players_data(&mut self) {
        let stale: Vec<ClientId> = self
            .client_id_to_player_id
            .iter()
            .filter(|(_, player_id)| {
                self.client_data
                    .get(*player_id)
                    .map_or(false, |data| !data.is_connected())
            })
            .map(|(client_id, _)| *client_id)
            .collect();

        for client_id in stale {
            if let Some(player_id) = self.client_id_to_player_id.remove(&client_id) {
                let owned_by_client = self
                    .client_data
                    .get(&player_id)
                    .map_or(false, |data| data.client_id() == client_id);
                if owned_by_client {
                    self.client_data.remove(&player_id);
                }
            }
        }
    }

    fn reinitialize_players_data(&mut self) {
        for player_id in self.client_id_to_player_id.values() {
            if let Some(data) = self.client_data.get_mut(player_id) {
                data.reinitialize();
            }
        }
    }
}
