use crate::game::ClientGameState;
use crate::input::{InputCommand, InputManager};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::action::ActionCatalog;
use shared::connection::{
    ConnectionConfig, ConnectionError, ConnectionManager, ConnectionNotice, ConnectionStateKind,
    SceneLoader, Transport, MAIN_MENU_SCENE,
};
use shared::{ClientId, ConnectStatus, Packet};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::interval;

/// How long a join may go unanswered before it counts as failed.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Silence from a connected host after which the connection counts as lost.
pub const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(5);

/// Client side of the UDP transport.
///
/// Every start binds a fresh socket and sends the join request; the
/// [`Client`] reads from whatever socket is current and tells the transport
/// when the host answered.
#[derive(Debug, Default)]
pub struct UdpClientTransport {
    endpoint: Option<(String, u16)>,
    connection_data: Vec<u8>,
    socket: Option<Arc<UdpSocket>>,
    /// Blocking-free handle on the same socket for sends made outside the
    /// async loop (join and goodbye).
    sender: Option<std::net::UdpSocket>,
    server_addr: Option<SocketAddr>,
    client_id: Option<ClientId>,
    disconnect_reason: Option<ConnectStatus>,
    started_at: Option<Instant>,
    last_received: Option<Instant>,
}

impl UdpClientTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn socket(&self) -> Option<Arc<UdpSocket>> {
        self.socket.clone()
    }

    /// Where packets go: the current socket and the host's address.
    pub fn route(&self) -> Option<(Arc<UdpSocket>, SocketAddr)> {
        Some((self.socket.clone()?, self.server_addr?))
    }

    pub fn is_connected(&self) -> bool {
        self.client_id.is_some() && self.socket.is_some()
    }

    /// The host let us in under `client_id`.
    pub fn mark_connected(&mut self, client_id: ClientId) {
        self.client_id = Some(client_id);
        self.started_at = None;
        self.last_received = Some(Instant::now());
    }

    pub fn mark_received(&mut self) {
        self.last_received = Some(Instant::now());
    }

    pub fn set_disconnect_reason(&mut self, reason: Option<ConnectStatus>) {
        self.disconnect_reason = reason;
    }

    /// How long the pending join has gone unanswered.
    pub fn waiting_for_reply(&self) -> Option<Duration> {
        if self.client_id.is_some() || self.socket.is_none() {
            return None;
        }
        self.started_at.map(|started| started.elapsed())
    }

    /// How long a connected host has been silent.
    pub fn silent_for(&self) -> Option<Duration> {
        if !self.is_connected() {
            return None;
        }
        self.last_received.map(|heard| heard.elapsed())
    }

    /// Drops the connection without telling the host, which is gone or has
    /// already dropped us.
    pub fn abandon(&mut self) {
        self.socket = None;
        self.sender = None;
        self.client_id = None;
        self.started_at = None;
    }

    /// Binds a fresh socket, returning the async half for the client loop
    /// and a std handle on the same socket for immediate sends.
    fn bind(&self, server_addr: SocketAddr) -> std::io::Result<(UdpSocket, std::net::UdpSocket)> {
        let local: SocketAddr = if server_addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = std::net::UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        let sender = socket.try_clone()?;
        Ok((UdpSocket::from_std(socket)?, sender))
    }
}

impl Transport for UdpClientTransport {
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
        let Some((address, port)) = self.endpoint.clone() else {
            error!("No endpoint set for the client");
            return false;
        };
        let server_addr = match (address.as_str(), port).to_socket_addrs() {
            Ok(mut addrs) => addrs.next(),
            Err(e) => {
                error!("Failed to resolve {}:{}: {}", address, port, e);
                return false;
            }
        };
        let Some(server_addr) = server_addr else {
            error!("{}:{} resolved to no address", address, port);
            return false;
        };

        let (socket, sender) = match self.bind(server_addr) {
            Ok(bound) => bound,
            Err(e) => {
                error!("Failed to bind client socket: {}", e);
                return false;
            }
        };
        let join = Packet::Connect {
            payload: self.connection_data.clone(),
        };
        let sent = serialize(&join)
            .map_err(|e| e.to_string())
            .and_then(|data| {
                sender
                    .send_to(&data, server_addr)
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = sent {
            error!("Failed to send join request to {}: {}", server_addr, e);
            return false;
        }

        info!("Joining host at {}", server_addr);
        self.socket = Some(Arc::new(socket));
        self.sender = Some(sender);
        self.server_addr = Some(server_addr);
        self.client_id = None;
        self.disconnect_reason = None;
        self.started_at = Some(Instant::now());
        self.last_received = None;
        true
    }

    fn start_host(&mut self) -> bool {
        warn!("The client transport cannot host");
        false
    }

    fn shutdown(&mut self) {
        if let (Some(sender), Some(addr)) = (&self.sender, self.server_addr) {
            if let Ok(data) = serialize(&Packet::Disconnect) {
                if let Err(e) = sender.send_to(&data, addr) {
                    debug!("Could not say goodbye to {}: {}", addr, e);
                }
            }
        }
        self.abandon();
    }

    fn is_shutdown_in_progress(&self) -> bool {
        false
    }

    fn disconnect_client(&mut self, client_id: ClientId, _reason: ConnectStatus) {
        warn!("A client cannot disconnect client {}", client_id);
    }

    fn connected_client_ids(&self) -> Vec<ClientId> {
        self.client_id.into_iter().collect()
    }

    fn local_client_id(&self) -> ClientId {
        self.client_id.unwrap_or_default()
    }

    fn disconnect_reason(&self) -> Option<ConnectStatus> {
        self.disconnect_reason
    }
}

/// The scene the host last told us to show.
#[derive(Debug)]
pub struct ClientScenes {
    active: String,
}

impl ClientScenes {
    pub fn new() -> Self {
        Self {
            active: MAIN_MENU_SCENE.to_string(),
        }
    }
}

impl Default for ClientScenes {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneLoader for ClientScenes {
    fn active_scene(&self) -> &str {
        &self.active
    }

    fn load_scene(&mut self, name: &str, _networked: bool) {
        info!("Loading scene {}", name);
        self.active = name.to_string();
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub address: String,
    pub port: u16,
    pub player_id: String,
    pub player_name: String,
    pub reconnect_attempts: u32,
    pub connect_timeout: Duration,
    pub server_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8080,
            player_id: "player".to_string(),
            player_name: "Player".to_string(),
            reconnect_attempts: ConnectionConfig::default().reconnect_attempts,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            server_timeout: DEFAULT_SERVER_TIMEOUT,
        }
    }
}

pub struct Client {
    config: ClientConfig,
    connection: ConnectionManager<UdpClientTransport, ClientScenes>,
    game_state: ClientGameState,
    input_manager: InputManager,
    started: Instant,
    ping_ms: u64,
    last_status: Option<ConnectStatus>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let connection_config = ConnectionConfig {
            reconnect_attempts: config.reconnect_attempts,
            ..ConnectionConfig::default()
        };
        Client {
            connection: ConnectionManager::new(
                UdpClientTransport::new(),
                ClientScenes::new(),
                connection_config,
            ),
            game_state: ClientGameState::new(Arc::new(ActionCatalog::default())),
            input_manager: InputManager::default(),
            started: Instant::now(),
            ping_ms: 0,
            last_status: None,
            config,
        }
    }

    pub fn connection(&self) -> &ConnectionManager<UdpClientTransport, ClientScenes> {
        &self.connection
    }

    pub fn game_state(&self) -> &ClientGameState {
        &self.game_state
    }

    pub fn ping_ms(&self) -> u64 {
        self.ping_ms
    }

    /// The last outcome the connection state machine published.
    pub fn last_status(&self) -> Option<ConnectStatus> {
        self.last_status
    }

    /// Seconds since the client was created; the connection state machine's
    /// clock.
    fn now(&self) -> f32 {
        self.started.elapsed().as_secs_f32()
    }

    /// Sends the join request.
    pub fn start(&mut self) -> Result<(), ConnectionError> {
        info!(
            "Connecting to {}:{} as {}",
            self.config.address, self.config.port, self.config.player_name
        );
        let result = self.connection.start_client_ip(
            &self.config.player_id,
            &self.config.player_name,
            &self.config.address,
            self.config.port,
        );
        self.log_notices();
        result
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let Some((socket, addr)) = self.connection.transport().route() else {
            return Ok(());
        };
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    async fn handle_packet(&mut self, packet: Packet) {
        self.connection.transport_mut().mark_received();

        match packet {
            Packet::Connected {
                client_id,
                character,
            } => {
                info!("Connected! Client ID: {}", client_id);
                self.connection.transport_mut().mark_connected(client_id);
                self.game_state.set_local_character(character);
                self.connection.on_client_connected(client_id);
            }

            Packet::Disconnected { reason } => {
                match reason {
                    Some(status) => warn!("Disconnected: {}", status),
                    None => warn!("Disconnected by host"),
                }
                self.connection.transport_mut().set_disconnect_reason(reason);
                self.lose_connection();
            }

            Packet::LoadScene { name } => {
                self.connection.scenes_mut().load_scene(&name, false);
            }

            Packet::Snapshot {
                tick,
                timestamp,
                characters,
                objects,
            } => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or(Duration::from_secs(0))
                    .as_millis() as u64;

                if timestamp > 0 {
                    self.ping_ms = now.saturating_sub(timestamp);
                }

                self.game_state.apply_snapshot(tick, characters, objects);
            }

            Packet::PlayAction { character, data } => {
                self.game_state.play_action(character, data);
            }

            Packet::CancelAllActions { character } => {
                self.game_state.cancel_all_actions(character);
            }

            Packet::CancelActionsById {
                character,
                action_id,
            } => {
                self.game_state.cancel_actions_by_id(character, action_id);
            }

            Packet::StoppedChargingUp { character, percent } => {
                self.game_state.stopped_charging_up(character, percent);
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
        self.log_notices();
    }

    /// Forgets the session and lets the state machine decide whether to
    /// reconnect, based on the reason the transport recorded.
    fn lose_connection(&mut self) {
        let client_id = self.connection.transport().local_client_id();
        self.connection.transport_mut().abandon();
        self.game_state.reset();
        self.connection.on_client_disconnected(client_id);
    }

    async fn send_command(&mut self, command: InputCommand) {
        let packet = match command {
            InputCommand::Action(data) => {
                if self.game_state.anticipate(&data) {
                    debug!("Anticipating {}", data.action_id);
                }
                Packet::ActionRequest { data }
            }
            InputCommand::Move(destination) => Packet::MoveRequest { destination },
            InputCommand::StopChargingUp => Packet::StopChargingUp,
        };
        if let Err(e) = self.send_packet(&packet).await {
            error!("Error sending input: {}", e);
        }
    }

    async fn run_tick(&mut self, dt: f32) {
        self.game_state.update(dt);
        self.connection.tick(self.now());

        if self.connection.state() == ConnectionStateKind::ClientConnected {
            if let Some(local) = self.game_state.local_character() {
                let commands = self.input_manager.update(
                    self.game_state.now(),
                    &self.game_state.world,
                    self.game_state.factory().catalog(),
                    local,
                );
                for command in commands {
                    self.send_command(command).await;
                }
            }
        }

        for cue in self.game_state.drain_cues() {
            debug!("{:?}", cue);
        }
        self.log_notices();
    }

    /// Keeps the host aware of us and notices when either side went quiet.
    async fn check_liveness(&mut self) {
        let transport = self.connection.transport();
        if transport.is_connected() {
            if let Err(e) = self.send_packet(&Packet::Heartbeat).await {
                error!("Error sending heartbeat: {}", e);
            }
            let silent = self.connection.transport().silent_for();
            if silent.map_or(false, |silent| silent > self.config.server_timeout) {
                warn!("Host stopped responding");
                self.lose_connection();
                self.log_notices();
            }
        } else if let Some(waited) = transport.waiting_for_reply() {
            if waited > self.config.connect_timeout {
                warn!("No reply from host after {:?}", waited);
                self.lose_connection();
                self.log_notices();
            }
        }
    }

    fn log_notices(&mut self) {
        for notice in self.connection.drain_notices() {
            match notice {
                ConnectionNotice::Status(status) => {
                    info!("{}", status);
                    self.last_status = Some(status);
                }
                ConnectionNotice::Reconnecting { attempt, max } => {
                    if attempt < max {
                        info!("Reconnecting {}/{}", attempt + 1, max);
                    }
                }
                ConnectionNotice::PlayerEvent {
                    status,
                    player_name,
                } => info!("{}: {}", player_name, status),
            }
        }
    }

    /// Joins the host and plays until the connection ends for good.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.connection.state() == ConnectionStateKind::Offline {
            self.start()?;
        }

        let mut tick_interval = interval(Duration::from_millis(16));
        let mut heartbeat_interval = interval(Duration::from_secs(1));
        let mut last_tick = Instant::now();
        let mut buffer = [0u8; 2048];

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut shutdown_requested = false;

        while self.connection.state() != ConnectionStateKind::Offline {
            let socket = self.connection.transport().socket();

            tokio::select! {
                result = recv_packet(socket.as_deref(), &mut buffer) => {
                    match result {
                        Ok(len) => match deserialize::<Packet>(&buffer[..len]) {
                            Ok(packet) => self.handle_packet(packet).await,
                            Err(e) => warn!("Failed to deserialize packet: {}", e),
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;
                    self.run_tick(dt).await;
                },

                _ = heartbeat_interval.tick() => {
                    self.check_liveness().await;
                },

                _ = &mut ctrl_c, if !shutdown_requested => {
                    info!("Received Ctrl+C, leaving the session...");
                    shutdown_requested = true;
                    self.connection.request_shutdown();
                    self.log_notices();
                },
            }
        }

        info!("Client stopped");
        Ok(())
    }
}

/// Waits for a datagram on `socket`, or forever while there is none.
async fn recv_packet(socket: Option<&UdpSocket>, buffer: &mut [u8]) -> std::io::Result<usize> {
    match socket {
        Some(socket) => socket.recv_from(buffer).await.map(|(len, _)| len),
        None => std::future::pending().await,
    }
}
