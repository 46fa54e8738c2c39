use crate::protocol::ConnectStatus;
use crate::session::ClientId;

/// Scene shown while no session is running.
pub const MAIN_MENU_SCENE: &str = "MainMenu";
/// First scene of a hosted session.
pub const CHAR_SELECT_SCENE: &str = "CharSelect";

/// The low-level network transport the connection states drive.
///
/// Transport events (a client connected, the server started, ...) are not
/// callbacks on this trait: whoever owns the transport forwards them to the
/// matching `ConnectionManager` handler.
pub trait Transport {
    /// Bytes presented to the host for approval on the next client start.
    fn set_connection_data(&mut self, payload: Vec<u8>);
    fn connection_data(&self) -> &[u8];
    fn set_endpoint(&mut self, address: &str, port: u16);

    /// Returns `false` if the transport refused to start.
    fn start_client(&mut self) -> bool;
    fn start_host(&mut self) -> bool;

    fn shutdown(&mut self);
    fn is_shutdown_in_progress(&self) -> bool;

    /// Host only: drops a remote client, telling it why.
    fn disconnect_client(&mut self, client_id: ClientId, reason: ConnectStatus);

    /// Host only: every connected client, the host's own included.
    fn connected_client_ids(&self) -> Vec<ClientId>;
    fn local_client_id(&self) -> ClientId;

    /// Client only: the reason the host gave for the last disconnect.
    /// `None` means the connection dropped without one.
    fn disconnect_reason(&self) -> Option<ConnectStatus>;
}

pub trait SceneLoader {
    fn active_scene(&self) -> &str;
    /// `networked` scenes are loaded on every connected client as well.
    fn load_scene(&mut self, name: &str, networked: bool);
}
