use crate::character::CharacterClass;
use crate::world::ServerWorld;
use log::{debug, info, warn};
use shared::action::{ActionCatalog, ActionFactory};
use shared::{
    ActionRequestData, ClientId, EntityId, Packet, PlayerSessionData, SessionManager, Vec3,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Where players appear the first time they join.
const PLAYER_SPAWN_POINTS: [Vec3; 4] = [
    Vec3::new(-4.0, 0.0, -10.0),
    Vec3::new(-1.5, 0.0, -10.0),
    Vec3::new(1.5, 0.0, -10.0),
    Vec3::new(4.0, 0.0, -10.0),
];

/// How a round of the arena ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    BossDefeated,
    PartyDown,
}

/// The authoritative session: the world, the action pool, and which
/// character each connected client controls.
pub struct GameState {
    pub tick: u32,
    now: f32,
    pub world: ServerWorld,
    factory: ActionFactory,
    players: HashMap<ClientId, EntityId>,
    spawned: usize,
}

impl GameState {
    pub fn new(catalog: Arc<ActionCatalog>) -> Self {
        Self::with_world(catalog, ServerWorld::new())
    }

    pub fn with_world(catalog: Arc<ActionCatalog>, world: ServerWorld) -> Self {
        Self {
            tick: 0,
            now: 0.0,
            world,
            factory: ActionFactory::new(catalog),
            players: HashMap::new(),
            spawned: 0,
        }
    }

    pub fn now(&self) -> f32 {
        self.now
    }

    pub fn factory(&self) -> &ActionFactory {
        &self.factory
    }

    /// Fills the arena with its monsters and a pot to carry around.
    pub fn populate_arena(&mut self) {
        for (i, x) in [-6.0, 0.0, 6.0].into_iter().enumerate() {
            self.world.spawn_character(
                &format!("Imp{}", i + 1),
                CharacterClass::Imp,
                Vec3::new(x, 0.0, 8.0),
                None,
            );
        }
        self.world
            .spawn_character("Boss", CharacterClass::Boss, Vec3::new(0.0, 0.0, 18.0), None);
        self.world.spawn_object(Vec3::new(3.0, 0.0, -6.0));
        info!("Arena populated");
    }

    pub fn character_of(&self, client_id: ClientId) -> Option<EntityId> {
        self.players.get(&client_id).copied()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Spawns the character of an approved client. A player who already had
    /// a character this session comes back where they left, with the hit
    /// points they left with.
    pub fn spawn_player(
        &mut self,
        client_id: ClientId,
        sessions: &mut SessionManager<PlayerSessionData>,
    ) -> Option<EntityId> {
        if let Some(existing) = self.character_of(client_id) {
            return Some(existing);
        }
        let Some(player_id) = sessions.player_id(client_id).map(str::to_string) else {
            warn!("Client {} has no session, not spawning a character", client_id);
            return None;
        };
        let mut data = sessions.player_data(client_id)?.clone();
        let class = CharacterClass::for_player(&player_id);

        let entity = if data.has_character_spawned {
            let entity = self
                .world
                .spawn_character(&data.player_name, class, data.position, Some(client_id));
            if let Some(character) = self.world.character_mut(entity) {
                character.facing = data.facing;
                character.set_hit_points(data.hit_points);
            }
            info!(
                "Restored {} at ({:.1}, {:.1}) with {} hp",
                data.player_name, data.position.x, data.position.z, data.hit_points
            );
            entity
        } else {
            let position = PLAYER_SPAWN_POINTS[self.spawned % PLAYER_SPAWN_POINTS.len()];
            self.spawned += 1;
            let entity = self
                .world
                .spawn_character(&data.player_name, class, position, Some(client_id));
            data.has_character_spawned = true;
            data.position = position;
            data.facing = Vec3::FORWARD;
            data.hit_points = class.base_hp();
            sessions.set_player_data(client_id, data);
            entity
        };

        self.players.insert(client_id, entity);
        Some(entity)
    }

    /// Removes a client's character, saving where it stood into the
    /// client's session data.
    pub fn despawn_player(&mut self, client_id: ClientId, sessions: &mut SessionManager<PlayerSessionData>) {
        let Some(entity) = self.players.remove(&client_id) else {
            return;
        };
        let Some(character) = self.world.despawn_character(entity, &mut self.factory) else {
            return;
        };
        if let Some(mut data) = sessions.player_data(client_id).cloned() {
            data.position = character.position;
            data.facing = character.facing;
            data.hit_points = character.hit_points;
            sessions.set_player_data(client_id, data);
        }
        info!("Removed {} (client {})", character.name, client_id);
    }

    /// The round is over once every boss is dead, or once every player
    /// character is down.
    pub fn round_outcome(&self) -> Option<RoundOutcome> {
        let mut bosses = self
            .world
            .characters()
            .filter(|c| c.class == CharacterClass::Boss)
            .peekable();
        if bosses.peek().is_some() && bosses.all(|c| !c.is_alive()) {
            return Some(RoundOutcome::BossDefeated);
        }

        let mut players = self
            .players
            .values()
            .filter_map(|entity| self.world.character(*entity))
            .peekable();
        if players.peek().is_some() && players.all(|c| !c.is_alive()) {
            return Some(RoundOutcome::PartyDown);
        }
        None
    }

    /// Ends the session and opens the next one on a fresh arena. Players who
    /// left during the round lose their saved state; everyone still here
    /// gets a new character. Returns each client with its new character.
    pub fn restart_round(
        &mut self,
        sessions: &mut SessionManager<PlayerSessionData>,
    ) -> Vec<(ClientId, EntityId)> {
        let mut clients: Vec<ClientId> = self.players.keys().copied().collect();
        clients.sort_unstable();
        for client_id in &clients {
            self.despawn_player(*client_id, sessions);
        }
        sessions.on_session_ended();

        self.world.clear(&mut self.factory);
        self.spawned = 0;
        self.populate_arena();
        sessions.on_session_started();

        clients
            .into_iter()
            .filter_map(|client_id| Some((client_id, self.spawn_player(client_id, sessions)?)))
            .collect()
    }

    pub fn handle_action_request(&mut self, client_id: ClientId, data: ActionRequestData) {
        match self.character_of(client_id) {
            Some(entity) => self.world.play_action(&mut self.factory, entity, data),
            None => debug!("Action request from client {} without a character", client_id),
        }
    }

    pub fn handle_move_request(&mut self, client_id: ClientId, destination: Vec3) {
        if let Some(entity) = self.character_of(client_id) {
            self.world.move_character(entity, destination);
        }
    }

    pub fn handle_stop_charging(&mut self, client_id: ClientId) {
        if let Some(entity) = self.character_of(client_id) {
            self.world.stop_charging_up(entity);
        }
    }

    /// Advances the simulation by one tick of `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        self.tick += 1;
        self.now += dt;
        self.world.update(&mut self.factory, self.now, dt);
    }

    pub fn snapshot(&self, timestamp: u64) -> Packet {
        Packet::Snapshot {
            tick: self.tick,
            timestamp,
            characters: self.world.characters().map(|c| c.snapshot()).collect(),
            objects: self.world.object_snapshots(),
        }
    }

    /// Action notifications for clients, in the order they were raised.
    pub fn drain_outbox(&mut self) -> Vec<Packet> {
        self.world.drain_outbox()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::action::TANK_BASE_ATTACK;
    use shared::{LifeState, WorldQuery};

    fn game() -> GameState {
        GameState::with_world(Arc::new(ActionCatalog::default()), ServerWorld::with_seed(7))
    }

    fn join(sessions: &mut SessionManager<PlayerSessionData>, client_id: ClientId, player_id: &str) {
        sessions.setup_connecting_player_session_data(
            client_id,
            player_id,
            PlayerSessionData::new(client_id, player_id),
        );
    }

    #[test]
    fn test_new_player_spawn_is_saved_to_session() {
        let mut game = game();
        let mut sessions = SessionManager::new();
        join(&mut sessions, 1, "p1");

        let entity = game.spawn_player(1, &mut sessions).unwrap();

        let data = sessions.player_data(1).unwrap();
        assert!(data.has_character_spawned);
        assert_eq!(data.position, game.world.position(entity).unwrap());
        assert_eq!(
            data.hit_points,
            CharacterClass::for_player("p1").base_hp()
        );
        // spawning twice gives the same character
        assert_eq!(game.spawn_player(1, &mut sessions), Some(entity));
    }

    #[test]
    fn test_unknown_client_gets_no_character() {
        let mut game = game();
        let mut sessions = SessionManager::new();
        assert!(game.spawn_player(9, &mut sessions).is_none());
        game.handle_action_request(9, ActionRequestData::new(TANK_BASE_ATTACK));
        assert_eq!(game.player_count(), 0);
    }

    #[test]
    fn test_reconnecting_player_restored_where_they_left() {
        let mut game = game();
        let mut sessions = SessionManager::new();
        sessions.on_session_started();
        join(&mut sessions, 1, "p1");

        let entity = game.spawn_player(1, &mut sessions).unwrap();
        let imp = game
            .world
            .spawn_character("Imp", CharacterClass::Imp, Vec3::new(5.0, 0.0, 5.0), None);
        game.world.set_destination(entity, Vec3::new(0.0, 0.0, 0.0));
        for _ in 0..150 {
            game.update(1.0 / 30.0);
        }
        shared::World::receive_hp(&mut game.world, imp, entity, -25);
        let hp = game.world.character(entity).unwrap().hit_points;

        game.despawn_player(1, &mut sessions);
        sessions.disconnect_client(1);
        assert!(!game.world.exists(entity));

        join(&mut sessions, 2, "p1");
        let restored = game.spawn_player(2, &mut sessions).unwrap();
        let character = game.world.character(restored).unwrap();
        assert_eq!(character.hit_points, hp);
        assert_eq!(character.position, Vec3::new(0.0, 0.0, 0.0));
        assert_eq!(character.life_state, LifeState::Alive);
        assert_eq!(character.client_id, Some(2));
    }

    #[test]
    fn test_round_ends_when_boss_falls() {
        let mut game = game();
        game.populate_arena();
        assert_eq!(game.round_outcome(), None);

        let boss = game
            .world
            .characters()
            .find(|c| c.class == CharacterClass::Boss)
            .map(|c| c.id)
            .unwrap();
        game.world.character_mut(boss).unwrap().set_hit_points(0);
        assert_eq!(game.round_outcome(), Some(RoundOutcome::BossDefeated));
    }

    #[test]
    fn test_round_ends_when_party_is_down() {
        let mut game = game();
        let mut sessions = SessionManager::new();
        join(&mut sessions, 1, "p1");
        let entity = game.spawn_player(1, &mut sessions).unwrap();
        assert_eq!(game.round_outcome(), None);

        game.world.character_mut(entity).unwrap().set_hit_points(0);
        assert_eq!(game.round_outcome(), Some(RoundOutcome::PartyDown));
    }

    #[test]
    fn test_restart_round_purges_departed_players() {
        let mut game = game();
        let mut sessions = SessionManager::new();
        sessions.on_session_started();
        game.populate_arena();
        join(&mut sessions, 1, "stayed");
        join(&mut sessions, 2, "left");
        let first = game.spawn_player(1, &mut sessions).unwrap();
        game.spawn_player(2, &mut sessions).unwrap();
        game.world.character_mut(first).unwrap().set_hit_points(5);

        game.despawn_player(2, &mut sessions);
        sessions.disconnect_client(2);
        assert!(sessions.player_data_by_player_id("left").is_some());

        let respawned = game.restart_round(&mut sessions);

        assert!(sessions.player_data_by_player_id("left").is_none());
        assert!(sessions.has_session_started());
        assert_eq!(respawned.len(), 1);
        let (client_id, entity) = respawned[0];
        assert_eq!(client_id, 1);
        assert_eq!(game.character_of(1), Some(entity));
        // a new round starts from full health, not the saved state
        assert_eq!(
            game.world.character(entity).unwrap().hit_points,
            CharacterClass::for_player("stayed").base_hp()
        );
        // monsters are back and nothing is left over from the last round
        assert_eq!(game.world.characters().filter(|c| c.is_npc()).count(), 4);
        assert_eq!(game.round_outcome(), None);
    }

    #[test]
    fn test_populated_arena_in_snapshot() {
        let mut game = game();
        game.populate_arena();
        game.update(1.0 / 60.0);

        match game.snapshot(42) {
            Packet::Snapshot {
                tick,
                timestamp,
                characters,
                objects,
            } => {
                assert_eq!(tick, 1);
                assert_eq!(timestamp, 42);
                assert_eq!(characters.len(), 4);
                assert!(characters.iter().all(|c| c.is_npc));
                assert_eq!(objects.len(), 1);
            }
            other => panic!("Unexpected packet type: {:?}", other),
        }
    }

    #[test]
    fn test_action_request_echoed_to_clients() {
        let mut game = game();
        let mut sessions = SessionManager::new();
        join(&mut sessions, 1, "p1");
        let entity = game.spawn_player(1, &mut sessions).unwrap();

        game.handle_action_request(1, ActionRequestData::new(TANK_BASE_ATTACK));

        let echoed = game.drain_outbox().into_iter().any(|packet| {
            matches!(packet, Packet::PlayAction { character, ref data }
                if character == entity && data.action_id == TANK_BASE_ATTACK)
        });
        assert!(echoed);
    }
}
