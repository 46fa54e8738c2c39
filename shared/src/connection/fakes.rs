//! In-memory collaborators for connection state tests.

use super::method::{ConnectionMethod, ReconnectionSetup};
use super::transport::{SceneLoader, Transport, MAIN_MENU_SCENE};
use super::ConnectionError;
use crate::protocol::ConnectStatus;
use crate::session::ClientId;

pub struct FakeTransport {
    pub connection_data: Vec<u8>,
    pub endpoint: Option<(String, u16)>,
    pub start_result: bool,
    pub client_starts: u32,
    pub host_starts: u32,
    pub shutdowns: u32,
    /// Number of `is_shutdown_in_progress` polls that still report `true`.
    pub shutdown_polls: std::cell::Cell<u32>,
    pub disconnected: Vec<(ClientId, ConnectStatus)>,
    pub connected: Vec<ClientId>,
    pub local_id: ClientId,
    pub reason: Option<ConnectStatus>,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self {
            connection_data: Vec::new(),
            endpoint: None,
            start_result: true,
            client_starts: 0,
            host_starts: 0,
            shutdowns: 0,
            shutdown_polls: std::cell::Cell::new(0),
            disconnected: Vec::new(),
            connected: Vec::new(),
            local_id: 0,
            reason: None,
        }
    }
}

impl Transport for FakeTransport {
    fn set_connection_data(&mut self, payload: Vec<u8>) {
        self.connection_data = payload;
    }

    fn connection_data(&self) -> &[u8] {
        &self.connection_data
    }

    fn set_endpoint(&mut self, address: &str, port: u16) {
        self.endpoint = Some((address.to_string(), port));
    }

    fn start_client(&mut self) -> bool {
        self.client_starts += 1;
        self.start_result
    }

    fn start_host(&mut self) -> bool {
        self.host_starts += 1;
        if self.start_result {
            self.connected = vec![self.local_id];
        }
        self.start_result
    }

    fn shutdown(&mut self) {
        self.shutdowns += 1;
        self.connected.clear();
    }

    fn is_shutdown_in_progress(&self) -> bool {
        let remaining = self.shutdown_polls.get();
        if remaining > 0 {
            self.shutdown_polls.set(remaining - 1);
            true
        } else {
            false
        }
    }

    fn disconnect_client(&mut self, client_id: ClientId, reason: ConnectStatus) {
        self.disconnected.push((client_id, reason));
        self.connected.retain(|&id| id != client_id);
    }

    fn connected_client_ids(&self) -> Vec<ClientId> {
        self.connected.clone()
    }

    fn local_client_id(&self) -> ClientId {
        self.local_id
    }

    fn disconnect_reason(&self) -> Option<ConnectStatus> {
        self.reason
    }
}

pub struct FakeScenes {
    pub active: String,
    pub loaded: Vec<String>,
}

impl Default for FakeScenes {
    fn default() -> Self {
        Self {
            active: "Startup".to_string(),
            loaded: Vec::new(),
        }
    }
}

impl SceneLoader for FakeScenes {
    fn active_scene(&self) -> &str {
        &self.active
    }

    fn load_scene(&mut self, name: &str, _networked: bool) {
        self.active = name.to_string();
        self.loaded.push(name.to_string());
    }
}

impl FakeScenes {
    pub fn at_main_menu() -> Self {
        Self {
            active: MAIN_MENU_SCENE.to_string(),
            loaded: Vec::new(),
        }
    }
}

/// A connection method whose outcomes are scripted.
pub struct FakeMethod {
    pub fail_setup: bool,
    pub reconnection: ReconnectionSetup,
}

impl FakeMethod {
    pub fn failing() -> Self {
        Self {
            fail_setup: true,
            reconnection: ReconnectionSetup {
                success: true,
                should_try_again: true,
            },
        }
    }

    pub fn reconnection(success: bool, should_try_again: bool) -> Self {
        Self {
            fail_setup: false,
            reconnection: ReconnectionSetup {
                success,
                should_try_again,
            },
        }
    }

    fn setup(&self) -> Result<(), ConnectionError> {
        if self.fail_setup {
            Err(ConnectionError::MissingConnectionMethod)
        } else {
            Ok(())
        }
    }
}

impl ConnectionMethod for FakeMethod {
    fn setup_client_connection(&mut self, _transport: &mut dyn Transport) -> Result<(), ConnectionError> {
        self.setup()
    }

    fn setup_client_reconnection(&mut self) -> ReconnectionSetup {
        self.reconnection
    }

    fn setup_host_connection(&mut self, _transport: &mut dyn Transport) -> Result<(), ConnectionError> {
        self.setup()
    }
}
