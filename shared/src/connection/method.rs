use super::transport::Transport;
use super::ConnectionError;
use crate::protocol::ConnectionPayload;
use log::debug;

/// Result of preparing a reconnection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectionSetup {
    pub success: bool,
    /// When `false` the remaining attempts are abandoned.
    pub should_try_again: bool,
}

/// How a peer reaches its session: fills in the transport's endpoint and
/// connection payload before it starts.
pub trait ConnectionMethod {
    fn setup_client_connection(&mut self, transport: &mut dyn Transport) -> Result<(), ConnectionError>;

    fn setup_client_reconnection(&mut self) -> ReconnectionSetup {
        ReconnectionSetup {
            success: true,
            should_try_again: true,
        }
    }

    fn setup_host_connection(&mut self, transport: &mut dyn Transport) -> Result<(), ConnectionError>;
}

/// Direct connection to a known address and port.
#[derive(Debug, Clone)]
pub struct IpConnectionMethod {
    pub address: String,
    pub port: u16,
    pub player_id: String,
    pub player_name: String,
    pub is_debug: bool,
}

impl IpConnectionMethod {
    pub fn new(address: &str, port: u16, player_id: &str, player_name: &str, is_debug: bool) -> Self {
        Self {
            address: address.to_string(),
            port,
            player_id: player_id.to_string(),
            player_name: player_name.to_string(),
            is_debug,
        }
    }

    fn apply(&self, transport: &mut dyn Transport) -> Result<(), ConnectionError> {
        let payload = ConnectionPayload {
            player_id: self.player_id.clone(),
            player_name: self.player_name.clone(),
            is_debug: self.is_debug,
        };
        transport.set_connection_data(payload.encode()?);
        transport.set_endpoint(&self.address, self.port);
        debug!("Connection method set up for {}:{}", self.address, self.port);
        Ok(())
    }
}

impl ConnectionMethod for IpConnectionMethod {
    fn setup_client_connection(&mut self, transport: &mut dyn Transport) -> Result<(), ConnectionError> {
        self.apply(transport)
    }

    fn setup_host_connection(&mut self, transport: &mut dyn Transport) -> Result<(), ConnectionError> {
        self.apply(transport)
    }
}
