//! Server network layer handling UDP communications and game loop coordination

use crate::client_manager::ClientManager;
use crate::game::{GameState, RoundOutcome};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::action::ActionCatalog;
use shared::connection::{
    ApprovalRequest, ConnectionConfig, ConnectionManager, ConnectionNotice, SceneLoader, Transport,
    MAIN_MENU_SCENE,
};
use shared::{ClientId, ConnectStatus, Packet, DEFAULT_TICK_RATE};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Scene the session moves on to once the host is up.
pub const GAME_SCENE: &str = "BossRoom";
/// The host approves itself under this identity.
pub const HOST_PLAYER_ID: &str = "host";
const HOST_PLAYER_NAME: &str = "Host";
/// Client id of the host's own connection.
pub const HOST_CLIENT_ID: ClientId = 0;

/// Host side of the UDP transport.
///
/// Binds the socket when the connection state machine starts the host and
/// hands it over to the [`Server`]'s tasks. Disconnects requested by the
/// state machine are queued; the server delivers them, since only it knows
/// where each client lives.
#[derive(Debug, Default)]
pub struct UdpHostTransport {
    endpoint: Option<(String, u16)>,
    connection_data: Vec<u8>,
    socket: Option<std::net::UdpSocket>,
    running: bool,
    connected: Vec<ClientId>,
    pending_disconnects: Vec<(ClientId, ConnectStatus)>,
}

impl UdpHostTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bound socket, once. `None` before the host started.
    pub fn take_socket(&mut self) -> Option<std::net::UdpSocket> {
        self.socket.take()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_connected(&self, client_id: ClientId) -> bool {
        self.connected.contains(&client_id)
    }

    pub fn add_client(&mut self, client_id: ClientId) {
        if self.running && !self.is_connected(client_id) {
            self.connected.push(client_id);
        }
    }

    /// Returns `false` if the client was not connected.
    pub fn remove_client(&mut self, client_id: ClientId) -> bool {
        let before = self.connected.len();
        self.connected.retain(|id| *id != client_id);
        self.connected.len() != before
    }

    pub fn take_disconnects(&mut self) -> Vec<(ClientId, ConnectStatus)> {
        std::mem::take(&mut self.pending_disconnects)
    }
}

impl Transport for UdpHostTransport {
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
        warn!("The host transport cannot join another host");
        false
    }

    fn start_host(&mut self) -> bool {
        let Some((address, port)) = self.endpoint.clone() else {
            error!("No endpoint set for the host");
            return false;
        };
        let bound = std::net::UdpSocket::bind((address.as_str(), port))
            .and_then(|socket| socket.set_nonblocking(true).map(|()| socket));
        match bound {
            Ok(socket) => {
                self.socket = Some(socket);
                self.running = true;
                self.connected = vec![HOST_CLIENT_ID];
                true
            }
            Err(e) => {
                error!("Failed to bind {}:{}: {}", address, port, e);
                false
            }
        }
    }

    fn shutdown(&mut self) {
        if self.running {
            info!("Host transport shut down");
        }
        self.running = false;
        self.socket = None;
        self.connected.clear();
    }

    fn is_shutdown_in_progress(&self) -> bool {
        false
    }

    fn disconnect_client(&mut self, client_id: ClientId, reason: ConnectStatus) {
        if self.remove_client(client_id) {
            self.pending_disconnects.push((client_id, reason));
        }
    }

    fn connected_client_ids(&self) -> Vec<ClientId> {
        self.connected.clone()
    }

    fn local_client_id(&self) -> ClientId {
        HOST_CLIENT_ID
    }

    fn disconnect_reason(&self) -> Option<ConnectStatus> {
        None
    }
}

/// Tracks the active scene. Networked loads are queued so the server can
/// tell every client to follow.
#[derive(Debug)]
pub struct HostScenes {
    active: String,
    pending: Vec<String>,
}

impl HostScenes {
    pub fn new() -> Self {
        Self {
            active: MAIN_MENU_SCENE.to_string(),
            pending: Vec::new(),
        }
    }

    pub fn take_pending_loads(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending)
    }
}

impl Default for HostScenes {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneLoader for HostScenes {
    fn active_scene(&self) -> &str {
        &self.active
    }

    fn load_scene(&mut self, name: &str, networked: bool) {
        info!("Loading scene {}", name);
        self.active = name.to_string();
        if networked {
            self.pending.push(name.to_string());
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub tick_rate: u32,
    /// Connected players, the host's own slot included.
    pub max_players: usize,
    pub client_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8080,
            tick_rate: DEFAULT_TICK_RATE,
            max_players: ConnectionConfig::default().max_connected_players,
            client_timeout: crate::client_manager::DEFAULT_CLIENT_TIMEOUT,
        }
    }
}

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: ClientId },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<ClientId>,
    },
}

/// Main server coordinating networking, the connection state machine and
/// the game simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    connection: ConnectionManager<UdpHostTransport, HostScenes>,
    game_state: GameState,
    tick_duration: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    /// Starts hosting: binds the socket through the connection state
    /// machine, opens the session and populates the arena.
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let connection_config = ConnectionConfig {
            max_connected_players: config.max_players,
            ..ConnectionConfig::default()
        };
        let mut connection =
            ConnectionManager::new(UdpHostTransport::new(), HostScenes::new(), connection_config);
        connection.start_host_ip(HOST_PLAYER_ID, HOST_PLAYER_NAME, &config.address, config.port)?;

        let std_socket = connection
            .transport_mut()
            .take_socket()
            .ok_or("host transport started without a socket")?;
        let socket = Arc::new(UdpSocket::from_std(std_socket)?);
        info!("Server listening on {}", socket.local_addr()?);

        connection.on_server_started();
        connection.sessions_mut().on_session_started();
        connection.scenes_mut().load_scene(GAME_SCENE, true);
        // nobody is connected yet to follow these
        connection.scenes_mut().take_pending_loads();

        let mut game_state = GameState::new(Arc::new(ActionCatalog::default()));
        game_state.populate_arena();

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let tick_rate = config.tick_rate.max(1);

        let mut server = Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::with_timeout(
                config.max_players,
                config.client_timeout,
            ))),
            connection,
            game_state,
            tick_duration: Duration::from_secs_f64(1.0 / tick_rate as f64),
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        };
        server.log_notices();
        Ok(server)
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// A sender the owner can use to stop the server, e.g. on Ctrl+C.
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn connection(&self) -> &ConnectionManager<UdpHostTransport, HostScenes> {
        &self.connection
    }

    pub fn game_state(&self) -> &GameState {
        &self.game_state
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<ClientId>) {
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket { packet, exclude }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Processes incoming packets from clients
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { payload } => self.handle_connect(payload, addr).await,

            Packet::ActionRequest { data } => {
                if let Some(client_id) = self.touch(addr).await {
                    self.game_state.handle_action_request(client_id, data);
                }
            }

            Packet::MoveRequest { destination } => {
                if let Some(client_id) = self.touch(addr).await {
                    self.game_state.handle_move_request(client_id, destination);
                }
            }

            Packet::StopChargingUp => {
                if let Some(client_id) = self.touch(addr).await {
                    self.game_state.handle_stop_charging(client_id);
                }
            }

            Packet::Heartbeat => {
                self.touch(addr).await;
            }

            Packet::Disconnect => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    self.handle_client_left(client_id).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
        self.flush_disconnects().await;
        self.log_notices();
    }

    async fn touch(&self, addr: SocketAddr) -> Option<ClientId> {
        let client_id = self.clients.write().await.touch(addr);
        if client_id.is_none() {
            debug!("Packet from unknown address {}", addr);
        }
        client_id
    }

    /// Runs a join request through approval and, once let in, spawns the
    /// player's character and tells the client where the session is.
    async fn handle_connect(&mut self, payload: Vec<u8>, addr: SocketAddr) {
        info!("Client connecting from {}", addr);

        // Remove existing connection if present
        let existing_client_id = {
            let clients = self.clients.read().await;
            clients.find_client_by_addr(addr)
        };
        if let Some(existing_id) = existing_client_id {
            info!("Removing existing client {} from {}", existing_id, addr);
            self.handle_client_left(existing_id).await;
        }

        let client_id = self.clients.write().await.allocate_id();
        let response = self
            .connection
            .approval_check(&ApprovalRequest { client_id, payload });
        if !response.approved {
            self.send_packet(
                Packet::Disconnected {
                    reason: response.reason,
                },
                addr,
            );
            return;
        }

        let added = self.clients.write().await.add_client(client_id, addr);
        if !added {
            warn!("No room left for client {}", client_id);
            self.connection.sessions_mut().disconnect_client(client_id);
            self.send_packet(
                Packet::Disconnected {
                    reason: Some(ConnectStatus::ServerFull),
                },
                addr,
            );
            return;
        }

        self.connection.transport_mut().add_client(client_id);
        self.connection.on_client_connected(client_id);
        if !self.connection.transport().is_connected(client_id) {
            // kicked by the state machine on arrival
            return;
        }

        let character = if response.create_player_object {
            self.game_state
                .spawn_player(client_id, self.connection.sessions_mut())
        } else {
            None
        };
        self.send_packet(
            Packet::Connected {
                client_id,
                character,
            },
            addr,
        );
        self.send_packet(
            Packet::LoadScene {
                name: self.connection.scenes().active_scene().to_string(),
            },
            addr,
        );
    }

    /// Cleans up after a client that left, timed out or was replaced.
    async fn handle_client_left(&mut self, client_id: ClientId) {
        self.clients.write().await.remove_client(&client_id);
        if self.connection.transport_mut().remove_client(client_id) {
            self.game_state
                .despawn_player(client_id, self.connection.sessions_mut());
            self.connection.on_client_disconnected(client_id);
        }
    }

    /// Delivers the disconnects the connection state machine asked for.
    /// These bypass the send queue so they go out even while shutting down.
    async fn flush_disconnects(&mut self) {
        let disconnects = self.connection.transport_mut().take_disconnects();
        for (client_id, reason) in disconnects {
            let removed = self.clients.write().await.remove_client(&client_id);
            if let Some(client) = removed {
                let packet = Packet::Disconnected {
                    reason: Some(reason),
                };
                if let Err(e) = Self::send_packet_impl(&self.socket, &packet, client.addr).await {
                    error!("Failed to disconnect client {}: {}", client_id, e);
                }
            }
            self.game_state
                .despawn_player(client_id, self.connection.sessions_mut());
            self.connection.on_client_disconnected(client_id);
        }
    }

    fn log_notices(&mut self) {
        for notice in self.connection.drain_notices() {
            match notice {
                ConnectionNotice::PlayerEvent {
                    status,
                    player_name,
                } => info!("{}: {}", player_name, status),
                ConnectionNotice::Status(status) => info!("{}", status),
                ConnectionNotice::Reconnecting { attempt, max } => {
                    debug!("Reconnecting {}/{}", attempt, max)
                }
            }
        }
    }

    /// Advances the simulation and sends everything clients need to hear
    async fn run_tick(&mut self, dt: f32) {
        self.game_state.update(dt);
        if let Some(outcome) = self.game_state.round_outcome() {
            self.end_round(outcome).await;
        }
        self.connection.tick(self.game_state.now());

        for name in self.connection.scenes_mut().take_pending_loads() {
            self.broadcast_packet(Packet::LoadScene { name }, None);
        }
        for packet in self.game_state.drain_outbox() {
            self.broadcast_packet(packet, None);
        }
        self.broadcast_game_state().await;

        self.flush_disconnects().await;
        self.log_notices();
    }

    /// Closes the session on a finished round and starts the next one,
    /// telling every player which character is now theirs.
    async fn end_round(&mut self, outcome: RoundOutcome) {
        info!("Round over: {:?}", outcome);
        let respawned = self
            .game_state
            .restart_round(self.connection.sessions_mut());
        self.connection.scenes_mut().load_scene(GAME_SCENE, true);

        let clients = Arc::clone(&self.clients);
        let clients = clients.read().await;
        for (client_id, character) in respawned {
            if let Some(addr) = clients.addr_of(client_id) {
                self.send_packet(
                    Packet::Connected {
                        client_id,
                        character: Some(character),
                    },
                    addr,
                );
            }
        }
    }

    /// Broadcasts current game state to all connected clients
    async fn broadcast_game_state(&mut self) {
        let client_count = {
            let clients = self.clients.read().await;
            clients.len()
        };

        if client_count == 0 {
            return;
        }

        // Take timestamp as close to transmission as possible
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis();
        let timestamp_safe = (timestamp.min(u64::MAX as u128)) as u64;

        let packet = self.game_state.snapshot(timestamp_safe);
        self.broadcast_packet(packet, None);
    }

    /// Ends the session, telling every remote client the host is gone.
    async fn shutdown(&mut self) {
        info!("Server shutting down");
        self.connection.request_shutdown();
        self.flush_disconnects().await;
        self.log_notices();
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.handle_client_left(client_id).await;
                            self.log_notices();
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            self.shutdown().await;
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    self.run_tick(dt).await;

                    // Periodic performance monitoring
                    if self.game_state.tick % 60 == 0 {
                        let client_count = {
                            let clients = self.clients.read().await;
                            clients.len()
                        };

                        if client_count > 0 {
                            debug!("Tick {}: {} clients, {:.1}Hz, connection {}",
                                   self.game_state.tick, client_count, 1.0 / dt, self.connection.state());
                        }
                    }
                },
            }
        }

        Ok(())
    }
}
