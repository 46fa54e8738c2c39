//! Integration tests for networked multiplayer components
//!
//! These tests validate cross-component interactions: the action scheduler
//! against the server world, the connection state machine against a
//! scripted transport, session continuity through the game, and a real
//! host and client talking over UDP.

use assert_approx_eq::assert_approx_eq;
use client::game::ClientGameState;
use client::network::{Client, ClientConfig};
use server::action_player::{ServerActionPlayer, MAX_QUEUE_TIME_DEPTH};
use server::character::CharacterClass;
use server::game::GameState;
use server::network::{Server, ServerConfig, ServerMessage};
use server::world::ServerWorld;
use shared::action::{
    ActionCatalog, ActionFactory, ARCHER_VOLLEY, GENERAL_CHASE, GENERAL_TARGET, ROGUE_STEALTH,
    TANK_BASE_ATTACK,
};
use shared::connection::{
    ApprovalRequest, ConnectionConfig, ConnectionManager, ConnectionStateKind, SceneLoader,
    Transport, MAIN_MENU_SCENE,
};
use shared::protocol::CharacterSnapshot;
use shared::{
    ActionRequestData, ClientId, ConnectStatus, ConnectionPayload, EntityId, LifeState,
    PlayerSessionData, SessionManager, Vec3, WorldQuery,
};
use std::sync::Arc;
use std::time::Duration;

/// ACTION SCHEDULING TESTS
mod scheduling_tests {
    use super::*;

    struct Arena {
        world: ServerWorld,
        factory: ActionFactory,
        hero: EntityId,
        imp: EntityId,
    }

    impl Arena {
        fn new() -> Self {
            let mut world = ServerWorld::new();
            let hero = world.spawn_character("Hero", CharacterClass::Tank, Vec3::ZERO, None);
            let imp = world.spawn_character("Imp", CharacterClass::Imp, Vec3::new(0.0, 0.0, 10.0), None);
            Self {
                world,
                factory: ActionFactory::new(Arc::new(ActionCatalog::default())),
                hero,
                imp,
            }
        }

        fn play(&mut self, data: ActionRequestData, now: f32) {
            let factory = &mut self.factory;
            self.world.set_time(now);
            self.world
                .with_action_player(self.hero, |player, world| {
                    player.play_action(world, factory, data, now)
                })
                .unwrap();
        }

        fn tick(&mut self, now: f32, dt: f32) {
            self.world.update(&mut self.factory, now, dt);
        }

        fn player(&self) -> &ServerActionPlayer {
            self.world.action_player(self.hero).unwrap()
        }

        fn blocking_count(&self) -> usize {
            let player = self.player();
            player.running_action_count() - player.non_blocking_action_ids().len()
        }
    }

    /// A closing request on a new target is preceded by target and chase
    #[test]
    fn closing_request_expands_to_target_chase_action() {
        let mut arena = Arena::new();
        let imp = arena.imp;

        arena.play(
            ActionRequestData::new(TANK_BASE_ATTACK).with_targets(vec![imp]).closing(),
            0.0,
        );

        // the target action starts first and steps aside at once
        assert_eq!(arena.player().non_blocking_action_ids(), vec![GENERAL_TARGET]);
        assert_eq!(
            arena.player().queued_action_ids(),
            vec![GENERAL_CHASE, TANK_BASE_ATTACK]
        );
        assert_eq!(arena.world.target_of(arena.hero), Some(imp));
    }

    /// Twenty rapid requests only fill the queue up to the depth ceiling
    #[test]
    fn rapid_requests_truncated_at_depth_ceiling() {
        let mut arena = Arena::new();

        for _ in 0..20 {
            arena.play(ActionRequestData::new(TANK_BASE_ATTACK).queued(), 0.0);
        }

        let queued = arena.player().queued_action_ids();
        assert_eq!(queued.len(), 4);
        assert!(arena.player().queue_time_depth(0.0) < MAX_QUEUE_TIME_DEPTH + 0.5);
        assert_eq!(arena.factory.allocated_count(), 4);
    }

    /// Whatever is requested, at most one action holds the blocking slot
    #[test]
    fn never_more_than_one_blocking_action() {
        let mut arena = Arena::new();
        let imp = arena.imp;
        let requests = [
            ActionRequestData::new(ROGUE_STEALTH),
            ActionRequestData::new(TANK_BASE_ATTACK).queued(),
            ActionRequestData::new(ARCHER_VOLLEY).queued(),
            ActionRequestData::new(TANK_BASE_ATTACK).with_targets(vec![imp]).closing(),
        ];

        let dt = 1.0 / 60.0;
        for step in 0..240 {
            let now = step as f32 * dt;
            if step % 30 == 0 {
                arena.play(requests[(step / 30) % requests.len()].clone(), now);
            }
            arena.tick(now, dt);
            assert!(arena.blocking_count() <= 1, "step {}", step);
        }
    }

    /// A cooled-down action cannot start twice within its reuse time
    #[test]
    fn cooldown_prevents_early_restart() {
        let mut arena = Arena::new();
        arena.play(ActionRequestData::new(ARCHER_VOLLEY), 0.0);
        arena.tick(1.0, 1.0);

        arena.play(ActionRequestData::new(ARCHER_VOLLEY), 1.5);
        assert_eq!(arena.player().last_used(ARCHER_VOLLEY), Some(0.0));

        arena.play(ActionRequestData::new(ARCHER_VOLLEY), 3.0);
        assert_eq!(arena.player().last_used(ARCHER_VOLLEY), Some(3.0));
    }

    /// A chase with nothing to chase declines and leaves movement alone
    #[test]
    fn declined_start_runs_no_shutdown_hook() {
        let mut arena = Arena::new();
        arena.world.set_destination(arena.hero, Vec3::new(5.0, 0.0, 0.0));

        arena.play(ActionRequestData::new(GENERAL_CHASE), 0.0);

        assert!(arena.player().queued_action_ids().is_empty());
        assert!(arena.world.is_moving(arena.hero));
        assert_eq!(arena.factory.pooled_count(GENERAL_CHASE), 1);
    }

    /// A closing melee attack walks into range before swinging
    #[test]
    fn chase_then_attack_reaches_target() {
        let mut arena = Arena::new();
        let imp = arena.imp;

        arena.play(
            ActionRequestData::new(TANK_BASE_ATTACK).with_targets(vec![imp]).closing(),
            0.0,
        );
        let dt = 1.0 / 60.0;
        for step in 1..=300 {
            arena.tick(step as f32 * dt, dt);
        }

        let hero = arena.world.position(arena.hero).unwrap();
        let target = arena.world.position(imp).unwrap();
        assert!(hero.distance(&target) <= 2.2 + 0.1);
        assert!(arena.player().last_used(TANK_BASE_ATTACK).is_some());
        assert!(arena.player().queued_action_ids().is_empty());
    }
}

/// CONNECTION STATE MACHINE TESTS
mod connection_tests {
    use super::*;

    /// Transport whose outcomes the test decides.
    #[derive(Default)]
    struct ScriptedTransport {
        data: Vec<u8>,
        client_starts: u32,
        connected: Vec<ClientId>,
        kicked: Vec<(ClientId, ConnectStatus)>,
        reason: Option<ConnectStatus>,
    }

    impl Transport for ScriptedTransport {
        fn set_connection_data(&mut self, payload: Vec<u8>) {
            self.data = payload;
        }

        fn connection_data(&self) -> &[u8] {
            &self.data
        }

        fn set_endpoint(&mut self, _address: &str, _port: u16) {}

        fn start_client(&mut self) -> bool {
            self.client_starts += 1;
            true
        }

        fn start_host(&mut self) -> bool {
            self.connected = vec![0];
            true
        }

        fn shutdown(&mut self) {
            self.connected.clear();
        }

        fn is_shutdown_in_progress(&self) -> bool {
            false
        }

        fn disconnect_client(&mut self, client_id: ClientId, reason: ConnectStatus) {
            self.kicked.push((client_id, reason));
            self.connected.retain(|id| *id != client_id);
        }

        fn connected_client_ids(&self) -> Vec<ClientId> {
            self.connected.clone()
        }

        fn local_client_id(&self) -> ClientId {
            0
        }

        fn disconnect_reason(&self) -> Option<ConnectStatus> {
            self.reason
        }
    }

    struct Menu(String);

    impl SceneLoader for Menu {
        fn active_scene(&self) -> &str {
            &self.0
        }

        fn load_scene(&mut self, name: &str, _networked: bool) {
            self.0 = name.to_string();
        }
    }

    type Manager = ConnectionManager<ScriptedTransport, Menu>;

    fn manager(reconnect_attempts: u32) -> Manager {
        Manager::new(
            ScriptedTransport::default(),
            Menu(MAIN_MENU_SCENE.to_string()),
            ConnectionConfig {
                reconnect_attempts,
                ..ConnectionConfig::default()
            },
        )
    }

    fn lost_host(reconnect_attempts: u32) -> Manager {
        let mut connection = manager(reconnect_attempts);
        connection
            .start_client_ip("p1", "Ada", "127.0.0.1", 9000)
            .unwrap();
        connection.on_client_connected(1);
        connection.on_client_disconnected(1);
        connection
    }

    fn hosting() -> Manager {
        let mut connection = manager(2);
        connection
            .start_host_ip("host", "Host", "127.0.0.1", 9000)
            .unwrap();
        connection.on_server_started();
        connection
    }

    /// An oversized join payload is refused before it is decoded
    #[test]
    fn oversized_payload_refused_unread() {
        let mut connection = hosting();
        assert_eq!(connection.state(), ConnectionStateKind::Hosting);

        let response = connection.approval_check(&ApprovalRequest {
            client_id: 1,
            payload: vec![0u8; 2000],
        });

        assert!(!response.approved);
        assert_eq!(response.reason, None);
        assert_eq!(connection.sessions().player_id(1), None);
    }

    /// A well-formed join is approved and registered
    #[test]
    fn valid_payload_approved() {
        let mut connection = hosting();
        let payload = ConnectionPayload {
            player_id: "p1".to_string(),
            player_name: "Ada".to_string(),
            is_debug: connection.config().is_debug_build,
        }
        .encode()
        .unwrap();

        let response = connection.approval_check(&ApprovalRequest {
            client_id: 1,
            payload,
        });

        assert!(response.approved);
        assert_eq!(connection.sessions().player_id(1), Some("p1"));
    }

    /// A failed attempt with budget left schedules a delayed retry
    #[test]
    fn reasonless_disconnect_with_budget_left_retries_later() {
        let mut connection = lost_host(2);
        connection.tick(1.0);
        assert_eq!(connection.transport().client_starts, 2);

        connection.on_client_disconnected(1);
        assert_eq!(connection.state(), ConnectionStateKind::ClientReconnecting);
        assert_eq!(connection.transport().client_starts, 2);

        connection.tick(5.0);
        assert_eq!(connection.transport().client_starts, 2);
        connection.tick(6.0);
        assert_eq!(connection.transport().client_starts, 3);
    }

    /// Offline after exactly the configured number of failed attempts
    #[test]
    fn reconnection_gives_up_after_budget() {
        for budget in 1..=4u32 {
            let mut connection = lost_host(budget);
            let mut now = 0.0;
            let mut failures = 0;

            while connection.state() == ConnectionStateKind::ClientReconnecting {
                let starts = connection.transport().client_starts;
                while connection.transport().client_starts == starts {
                    now += 0.5;
                    connection.tick(now);
                }
                connection.on_client_disconnected(1);
                failures += 1;
                assert!(failures <= budget, "budget {} exceeded", budget);
            }

            assert_eq!(failures, budget);
            assert_eq!(connection.state(), ConnectionStateKind::Offline);
            assert_eq!(connection.transport().client_starts, budget + 1);
        }
    }

    /// Terminal reasons end reconnection regardless of remaining budget
    #[test]
    fn terminal_reason_ends_reconnection() {
        let terminal = [
            ConnectStatus::UserRequestedDisconnect,
            ConnectStatus::HostEndedSession,
            ConnectStatus::ServerFull,
            ConnectStatus::IncompatibleBuildType,
        ];
        for reason in terminal {
            let mut connection = lost_host(5);
            connection.tick(1.0);
            connection.transport_mut().reason = Some(reason);

            connection.on_client_disconnected(1);

            assert_eq!(connection.state(), ConnectionStateKind::Offline, "{:?}", reason);
            assert_eq!(connection.transport().client_starts, 2);
        }
    }

    /// Ending the hosted session kicks every remote client
    #[test]
    fn host_shutdown_kicks_remote_clients() {
        let mut connection = hosting();
        connection.transport_mut().connected.extend([3, 4]);

        connection.request_shutdown();

        assert_eq!(connection.state(), ConnectionStateKind::Offline);
        assert_eq!(
            connection.transport().kicked,
            vec![
                (4, ConnectStatus::HostEndedSession),
                (3, ConnectStatus::HostEndedSession)
            ]
        );
        assert_eq!(connection.scenes().active_scene(), MAIN_MENU_SCENE);
    }
}

/// SESSION CONTINUITY TESTS
mod session_tests {
    use super::*;

    /// A dropped player comes back with the hit points they left with
    #[test]
    fn reconnecting_player_keeps_hit_points() {
        let mut sessions = SessionManager::<PlayerSessionData>::new();
        sessions.on_session_started();
        sessions.setup_connecting_player_session_data(1, "p7", PlayerSessionData::new(1, "Ada"));

        let mut game = GameState::new(Arc::new(ActionCatalog::default()));
        let hero = game.spawn_player(1, &mut sessions).unwrap();
        game.world.character_mut(hero).unwrap().set_hit_points(37);

        game.despawn_player(1, &mut sessions);
        sessions.disconnect_client(1);
        sessions.setup_connecting_player_session_data(2, "p7", PlayerSessionData::new(2, "Ada"));

        let data = sessions.player_data(2).unwrap();
        assert_eq!(data.hit_points, 37);
        assert!(data.is_connected);
        assert_eq!(data.client_id, 2);

        let again = game.spawn_player(2, &mut sessions).unwrap();
        assert_eq!(game.world.character(again).unwrap().hit_points, 37);
    }

    /// Ending the session purges everyone still disconnected
    #[test]
    fn session_end_purges_disconnected_players() {
        let mut sessions = SessionManager::<PlayerSessionData>::new();
        sessions.on_session_started();
        sessions.setup_connecting_player_session_data(1, "stays", PlayerSessionData::new(1, "A"));
        sessions.setup_connecting_player_session_data(2, "leaves", PlayerSessionData::new(2, "B"));
        sessions.disconnect_client(2);

        sessions.on_session_ended();

        assert!(sessions.player_data(2).is_none());
        assert!(sessions.player_data_by_player_id("leaves").is_none());
        assert!(sessions.player_data_by_player_id("stays").is_some());
    }
}

/// CLIENT PLAYBACK TESTS
mod playback_tests {
    use super::*;

    /// Replicated state from the server drives client-side playback
    #[test]
    fn server_snapshot_and_actions_replay_on_client() {
        let mut world = ServerWorld::new();
        let mut factory = ActionFactory::new(Arc::new(ActionCatalog::default()));
        let imp = world.spawn_character("Imp", CharacterClass::Imp, Vec3::new(0.0, 0.0, 1.5), None);
        let hero = world.spawn_character("Hero", CharacterClass::Rogue, Vec3::ZERO, None);
        world.play_action(&mut factory, hero, ActionRequestData::new(ROGUE_STEALTH));
        world.update(&mut factory, 1.0 / 60.0, 1.0 / 60.0);

        let mut view = ClientGameState::new(Arc::new(ActionCatalog::default()));
        view.apply_snapshot(
            1,
            world.characters().map(|c| c.snapshot()).collect(),
            world.object_snapshots(),
        );
        for packet in world.drain_outbox() {
            if let shared::Packet::PlayAction { character, data } = packet {
                view.play_action(character, data);
            }
        }

        assert!(view.world.exists(imp));
        assert_eq!(
            view.action_player(hero).map(|p| p.playing_count()),
            Some(1)
        );
    }

    /// Snapshots carry hit points and life state through the wire format
    #[test]
    fn snapshot_survives_encoding() {
        let snapshot = CharacterSnapshot {
            id: 3,
            name: "Imp".to_string(),
            is_npc: true,
            position: Vec3::new(1.0, 0.0, 2.0),
            facing: Vec3::FORWARD,
            hit_points: 12,
            life_state: LifeState::Fainted,
            target: Some(1),
            held_object: None,
            is_stealthy: false,
            is_moving: true,
            forced_movement: false,
        };
        let packet = shared::Packet::Snapshot {
            tick: 9,
            timestamp: 0,
            characters: vec![snapshot],
            objects: vec![],
        };

        match shared::Packet::decode(&packet.encode().unwrap()).unwrap() {
            shared::Packet::Snapshot { characters, .. } => {
                assert_eq!(characters[0].hit_points, 12);
                assert_eq!(characters[0].life_state, LifeState::Fainted);
                assert_approx_eq!(characters[0].position.z, 2.0);
            }
            other => panic!("Unexpected packet: {:?}", other),
        }
    }
}

/// NETWORK TESTS
mod network_tests {
    use super::*;

    /// A real client joins a real host, then the host ends the session
    #[tokio::test]
    async fn client_joins_and_hears_host_end_session() {
        let mut server = Server::new(ServerConfig {
            port: 0,
            ..ServerConfig::default()
        })
        .await
        .unwrap();
        let port = server.local_addr().unwrap().port();
        let shutdown = server.shutdown_handle();

        let mut client = Client::new(ClientConfig {
            port,
            player_id: "e2e".to_string(),
            player_name: "Ada".to_string(),
            ..ClientConfig::default()
        });

        let stopper = async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            shutdown.send(ServerMessage::Shutdown).unwrap();
        };

        let (server_result, client_result, ()) = tokio::time::timeout(
            Duration::from_secs(5),
            async { tokio::join!(server.run(), client.run(), stopper) },
        )
        .await
        .unwrap();

        assert!(server_result.is_ok());
        assert!(client_result.is_ok());
        assert_eq!(server.connection().state(), ConnectionStateKind::Offline);
        assert_eq!(client.connection().state(), ConnectionStateKind::Offline);
        assert_eq!(client.last_status(), Some(ConnectStatus::HostEndedSession));
    }
}
