//! Connection and session lifecycle state machine.
//!
//! [`ConnectionManager`] holds one instance of each connection state and
//! exactly one of them is current. Transport events and user requests are
//! forwarded to the current state, which may ask for a transition; the
//! outgoing state's `exit` always runs before the incoming state's `enter`.
//!
//! Waits (reconnect delays, transport shutdown) are deadlines and predicates
//! checked by [`ConnectionManager::tick`], never blocked threads.

mod client_connected;
mod client_connecting;
mod client_reconnecting;
mod hosting;
mod method;
mod offline;
mod starting_host;
mod transport;

#[cfg(test)]
pub(crate) mod fakes;

pub use method::{ConnectionMethod, IpConnectionMethod, ReconnectionSetup};
pub use transport::{SceneLoader, Transport, CHAR_SELECT_SCENE, MAIN_MENU_SCENE};

use crate::protocol::{ConnectStatus, ProtocolError, MAX_CONNECT_PAYLOAD};
use crate::session::{ClientId, PlayerSessionData, SessionManager};
use client_connected::ClientConnectedState;
use client_connecting::ClientConnectingState;
use client_reconnecting::ClientReconnectingState;
use hosting::HostingState;
use log::{info, warn};
use offline::OfflineState;
use starting_host::StartingHostState;
use std::fmt;
use thiserror::Error;

/// Tuning for the connection state machine.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Connected clients, the host included, beyond which joins are refused.
    pub max_connected_players: usize,
    pub reconnect_attempts: u32,
    /// Seconds to wait before the first reconnection attempt.
    pub time_before_first_attempt: f32,
    /// Seconds to wait before each later reconnection attempt.
    pub time_between_attempts: f32,
    pub max_connect_payload: usize,
    /// Only peers built the same way may play together.
    pub is_debug_build: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_connected_players: 8,
            reconnect_attempts: 2,
            time_before_first_attempt: 1.0,
            time_between_attempts: 5.0,
            max_connect_payload: MAX_CONNECT_PAYLOAD,
            is_debug_build: cfg!(debug_assertions),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("transport refused to start the host")]
    StartHostFailed,
    #[error("transport refused to start the client")]
    StartClientFailed,
    #[error("no connection method configured")]
    MissingConnectionMethod,
    #[error("connection payload error: {0}")]
    Payload(#[from] ProtocolError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStateKind {
    Offline,
    ClientConnecting,
    ClientConnected,
    ClientReconnecting,
    StartingHost,
    Hosting,
}

impl fmt::Display for ConnectionStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStateKind::Offline => "Offline",
            ConnectionStateKind::ClientConnecting => "ClientConnecting",
            ConnectionStateKind::ClientConnected => "ClientConnected",
            ConnectionStateKind::ClientReconnecting => "ClientReconnecting",
            ConnectionStateKind::StartingHost => "StartingHost",
            ConnectionStateKind::Hosting => "Hosting",
        };
        f.write_str(name)
    }
}

/// Something the UI (or a log) should hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionNotice {
    Status(ConnectStatus),
    /// Reconnection progress; `attempt == max` once reconnection is over.
    Reconnecting { attempt: u32, max: u32 },
    /// Host side: a player joined or left.
    PlayerEvent { status: ConnectStatus, player_name: String },
}

/// A client asking the host to let it in.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub client_id: ClientId,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalResponse {
    pub approved: bool,
    pub create_player_object: bool,
    /// Why the client was refused; `None` when approved or when the request
    /// was dropped without being looked at.
    pub reason: Option<ConnectStatus>,
}

impl ApprovalResponse {
    pub fn approved() -> Self {
        Self {
            approved: true,
            create_player_object: true,
            reason: None,
        }
    }

    pub fn denied(reason: Option<ConnectStatus>) -> Self {
        Self {
            approved: false,
            create_player_object: false,
            reason,
        }
    }
}

/// A state's request to move somewhere else.
pub(crate) type Transition = Option<ConnectionStateKind>;

/// Shared dependencies every state works with.
pub struct ConnectionContext<T: Transport, S: SceneLoader> {
    pub transport: T,
    pub scenes: S,
    pub sessions: SessionManager<PlayerSessionData>,
    pub config: ConnectionConfig,
    method: Option<Box<dyn ConnectionMethod>>,
    notices: Vec<ConnectionNotice>,
    pending_error: Option<ConnectionError>,
    now: f32,
}

impl<T: Transport, S: SceneLoader> ConnectionContext<T, S> {
    pub(crate) fn publish(&mut self, status: ConnectStatus) {
        self.notices.push(ConnectionNotice::Status(status));
    }

    pub(crate) fn notify(&mut self, notice: ConnectionNotice) {
        self.notices.push(notice);
    }

    /// Records a setup failure to be handed back to the public caller once
    /// the resulting transitions have run.
    pub(crate) fn fail(&mut self, error: ConnectionError) {
        self.pending_error = Some(error);
    }

    pub(crate) fn now(&self) -> f32 {
        self.now
    }

    /// Runs `f` with the configured method and the transport side by side.
    pub(crate) fn with_method<R>(
        &mut self,
        f: impl FnOnce(&mut dyn ConnectionMethod, &mut dyn Transport) -> R,
    ) -> Result<R, ConnectionError> {
        let method = self
            .method
            .as_deref_mut()
            .ok_or(ConnectionError::MissingConnectionMethod)?;
        Ok(f(method, &mut self.transport))
    }
}

/// Behavior of one connection state. Every handler defaults to ignoring the
/// event.
pub(crate) trait ConnectionState<T: Transport, S: SceneLoader> {
    fn enter(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition;

    fn exit(&mut self, _ctx: &mut ConnectionContext<T, S>) {}

    fn tick(&mut self, _ctx: &mut ConnectionContext<T, S>) -> Transition {
        None
    }

    fn on_client_connected(&mut self, _ctx: &mut ConnectionContext<T, S>, _client_id: ClientId) -> Transition {
        None
    }

    fn on_client_disconnected(&mut self, _ctx: &mut ConnectionContext<T, S>, _client_id: ClientId) -> Transition {
        None
    }

    fn on_server_started(&mut self, _ctx: &mut ConnectionContext<T, S>) -> Transition {
        None
    }

    fn on_server_stopped(&mut self, _ctx: &mut ConnectionContext<T, S>) -> Transition {
        None
    }

    fn on_transport_failure(&mut self, _ctx: &mut ConnectionContext<T, S>) -> Transition {
        None
    }

    fn on_user_requested_shutdown(&mut self, _ctx: &mut ConnectionContext<T, S>) -> Transition {
        None
    }

    fn start_client(
        &mut self,
        _ctx: &mut ConnectionContext<T, S>,
        _method: Box<dyn ConnectionMethod>,
    ) -> Transition {
        warn!("Cannot start a client from the current connection state");
        None
    }

    fn start_host(
        &mut self,
        _ctx: &mut ConnectionContext<T, S>,
        _method: Box<dyn ConnectionMethod>,
    ) -> Transition {
        warn!("Cannot start a host from the current connection state");
        None
    }

    fn approval_check(
        &mut self,
        _ctx: &mut ConnectionContext<T, S>,
        _request: &ApprovalRequest,
    ) -> ApprovalResponse {
        ApprovalResponse::denied(None)
    }
}

#[derive(Default)]
struct States {
    offline: OfflineState,
    client_connecting: ClientConnectingState,
    client_connected: ClientConnectedState,
    client_reconnecting: ClientReconnectingState,
    starting_host: StartingHostState,
    hosting: HostingState,
}

impl States {
    fn get_mut<T: Transport, S: SceneLoader>(
        &mut self,
        kind: ConnectionStateKind,
    ) -> &mut dyn ConnectionState<T, S> {
        match kind {
            ConnectionStateKind::Offline => &mut self.offline,
            ConnectionStateKind::ClientConnecting => &mut self.client_connecting,
            ConnectionStateKind::ClientConnected => &mut self.client_connected,
            ConnectionStateKind::ClientReconnecting => &mut self.client_reconnecting,
            ConnectionStateKind::StartingHost => &mut self.starting_host,
            ConnectionStateKind::Hosting => &mut self.hosting,
        }
    }
}

/// Owner of the connection state machine.
///
/// Starts in `Offline` without running its `enter`; the first transition is
/// always an explicit start request.
pub struct ConnectionManager<T: Transport, S: SceneLoader> {
    ctx: ConnectionContext<T, S>,
    states: States,
    current: ConnectionStateKind,
}

impl<T: Transport, S: SceneLoader> ConnectionManager<T, S> {
    pub fn new(transport: T, scenes: S, config: ConnectionConfig) -> Self {
        Self {
            ctx: ConnectionContext {
                transport,
                scenes,
                sessions: SessionManager::new(),
                config,
                method: None,
                notices: Vec::new(),
                pending_error: None,
                now: 0.0,
            },
            states: States::default(),
            current: ConnectionStateKind::Offline,
        }
    }

    pub fn state(&self) -> ConnectionStateKind {
        self.current
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.ctx.config
    }

    pub fn transport(&self) -> &T {
        &self.ctx.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.ctx.transport
    }

    pub fn scenes(&self) -> &S {
        &self.ctx.scenes
    }

    pub fn scenes_mut(&mut self) -> &mut S {
        &mut self.ctx.scenes
    }

    pub fn sessions(&self) -> &SessionManager<PlayerSessionData> {
        &self.ctx.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut SessionManager<PlayerSessionData> {
        &mut self.ctx.sessions
    }

    /// Takes every notice published since the last call.
    pub fn drain_notices(&mut self) -> Vec<ConnectionNotice> {
        std::mem::take(&mut self.ctx.notices)
    }

    /// Advances pending waits to `now` (seconds).
    pub fn tick(&mut self, now: f32) {
        self.ctx.now = now;
        let next = self.dispatch(|state, ctx| state.tick(ctx));
        self.apply(next);
    }

    /// Starts joining a host. Setup failures are published, drive the state
    /// machine back to `Offline`, and are then returned.
    pub fn start_client(&mut self, method: Box<dyn ConnectionMethod>) -> Result<(), ConnectionError> {
        self.ctx.pending_error = None;
        let next = self.dispatch(|state, ctx| state.start_client(ctx, method));
        self.apply(next);
        self.take_error()
    }

    pub fn start_client_ip(
        &mut self,
        player_id: &str,
        player_name: &str,
        address: &str,
        port: u16,
    ) -> Result<(), ConnectionError> {
        let is_debug = self.ctx.config.is_debug_build;
        self.start_client(Box::new(IpConnectionMethod::new(
            address,
            port,
            player_id,
            player_name,
            is_debug,
        )))
    }

    /// Starts hosting. Same error contract as [`Self::start_client`].
    pub fn start_host(&mut self, method: Box<dyn ConnectionMethod>) -> Result<(), ConnectionError> {
        self.ctx.pending_error = None;
        let next = self.dispatch(|state, ctx| state.start_host(ctx, method));
        self.apply(next);
        self.take_error()
    }

    pub fn start_host_ip(
        &mut self,
        player_id: &str,
        player_name: &str,
        address: &str,
        port: u16,
    ) -> Result<(), ConnectionError> {
        let is_debug = self.ctx.config.is_debug_build;
        self.start_host(Box::new(IpConnectionMethod::new(
            address,
            port,
            player_id,
            player_name,
            is_debug,
        )))
    }

    pub fn request_shutdown(&mut self) {
        let next = self.dispatch(|state, ctx| state.on_user_requested_shutdown(ctx));
        self.apply(next);
    }

    pub fn on_client_connected(&mut self, client_id: ClientId) {
        let next = self.dispatch(|state, ctx| state.on_client_connected(ctx, client_id));
        self.apply(next);
    }

    pub fn on_client_disconnected(&mut self, client_id: ClientId) {
        let next = self.dispatch(|state, ctx| state.on_client_disconnected(ctx, client_id));
        self.apply(next);
    }

    pub fn on_server_started(&mut self) {
        let next = self.dispatch(|state, ctx| state.on_server_started(ctx));
        self.apply(next);
    }

    pub fn on_server_stopped(&mut self) {
        let next = self.dispatch(|state, ctx| state.on_server_stopped(ctx));
        self.apply(next);
    }

    pub fn on_transport_failure(&mut self) {
        let next = self.dispatch(|state, ctx| state.on_transport_failure(ctx));
        self.apply(next);
    }

    /// Decides whether a connecting client is let in.
    pub fn approval_check(&mut self, request: &ApprovalRequest) -> ApprovalResponse {
        self.dispatch(|state, ctx| state.approval_check(ctx, request))
    }

    fn dispatch<R>(
        &mut self,
        f: impl FnOnce(&mut dyn ConnectionState<T, S>, &mut ConnectionContext<T, S>) -> R,
    ) -> R {
        let state = self.states.get_mut::<T, S>(self.current);
        f(state, &mut self.ctx)
    }

    /// Runs transitions until a state settles.
    fn apply(&mut self, mut next: Transition) {
        while let Some(kind) = next.take() {
            next = self.change_state(kind);
        }
    }

    fn change_state(&mut self, kind: ConnectionStateKind) -> Transition {
        info!("changed connection state from {} to {}", self.current, kind);
        self.dispatch(|state, ctx| state.exit(ctx));
        self.current = kind;
        self.dispatch(|state, ctx| state.enter(ctx))
    }

    fn take_error(&mut self) -> Result<(), ConnectionError> {
        match self.ctx.pending_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
