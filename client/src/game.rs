use crate::action_player::ClientActionPlayer;
use log::{debug, info};
use shared::action::{ActionFactory, ActionId, ActionRequestData, VisualCue};
use shared::protocol::{CharacterSnapshot, ObjectSnapshot};
use shared::world::{raycast_arena_walls, BODY_RADIUS};
use shared::{ActionCatalog, EntityId, LifeState, Vec3, WorldQuery};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// The world as last replicated by the host.
///
/// Answers the read-only queries the cosmetic half of an action makes.
/// Nothing here is authoritative: it is replaced wholesale by every
/// snapshot.
#[derive(Debug, Default)]
pub struct ClientWorld {
    characters: BTreeMap<EntityId, CharacterSnapshot>,
    objects: BTreeMap<EntityId, ObjectSnapshot>,
    animating: HashSet<EntityId>,
}

impl ClientWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_snapshot(&mut self, characters: Vec<CharacterSnapshot>, objects: Vec<ObjectSnapshot>) {
        self.characters = characters.into_iter().map(|c| (c.id, c)).collect();
        self.objects = objects.into_iter().map(|o| (o.id, o)).collect();
    }

    pub fn character(&self, id: EntityId) -> Option<&CharacterSnapshot> {
        self.characters.get(&id)
    }

    pub fn characters(&self) -> impl Iterator<Item = &CharacterSnapshot> {
        self.characters.values()
    }

    pub fn set_animating(&mut self, id: EntityId, animating: bool) {
        if animating {
            self.animating.insert(id);
        } else {
            self.animating.remove(&id);
        }
    }

    /// The closest living foe of `id`.
    pub fn nearest_foe(&self, id: EntityId) -> Option<EntityId> {
        let ours = self.position(id)?;
        self.characters
            .values()
            .filter(|c| c.life_state == LifeState::Alive && self.is_foe(id, c.id))
            .min_by(|a, b| {
                a.position
                    .distance(&ours)
                    .total_cmp(&b.position.distance(&ours))
            })
            .map(|c| c.id)
    }

    pub fn clear(&mut self) {
        self.characters.clear();
        self.objects.clear();
        self.animating.clear();
    }
}

impl WorldQuery for ClientWorld {
    fn exists(&self, id: EntityId) -> bool {
        self.characters.contains_key(&id) || self.objects.contains_key(&id)
    }

    fn position(&self, id: EntityId) -> Option<Vec3> {
        self.characters
            .get(&id)
            .map(|c| c.position)
            .or_else(|| self.objects.get(&id).map(|o| o.position))
    }

    fn facing(&self, id: EntityId) -> Option<Vec3> {
        self.characters.get(&id).map(|c| c.facing)
    }

    fn life_state(&self, id: EntityId) -> Option<LifeState> {
        self.characters.get(&id).map(|c| c.life_state)
    }

    fn is_npc(&self, id: EntityId) -> bool {
        self.characters.get(&id).map_or(false, |c| c.is_npc)
    }

    fn target_of(&self, id: EntityId) -> Option<EntityId> {
        self.characters.get(&id).and_then(|c| c.target)
    }

    fn held_object(&self, id: EntityId) -> Option<EntityId> {
        self.characters.get(&id).and_then(|c| c.held_object)
    }

    fn holder_of(&self, object: EntityId) -> Option<EntityId> {
        self.objects.get(&object).and_then(|o| o.holder)
    }

    fn is_moving(&self, id: EntityId) -> bool {
        self.characters.get(&id).map_or(false, |c| c.is_moving)
    }

    fn is_performing_forced_movement(&self, id: EntityId) -> bool {
        self.characters.get(&id).map_or(false, |c| c.forced_movement)
    }

    fn overlap_sphere(&self, center: Vec3, radius: f32) -> Vec<EntityId> {
        self.characters
            .values()
            .filter(|c| c.position.distance(&center) <= radius + BODY_RADIUS)
            .map(|c| c.id)
            .collect()
    }

    fn box_cast(&self, origin: Vec3, direction: Vec3, range: f32, half_width: f32) -> Vec<EntityId> {
        let dir = direction.flat().normalize();
        let mut hits: Vec<(f32, EntityId)> = self
            .characters
            .values()
            .filter_map(|c| {
                let offset = (c.position - origin).flat();
                let along = offset.dot(&dir);
                let lateral = (offset - dir * along).magnitude();
                (along > 0.0 && along <= range + half_width && lateral <= half_width * 2.0)
                    .then_some((along, c.id))
            })
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits.into_iter().map(|(_, id)| id).collect()
    }

    fn raycast_obstacle(&self, from: Vec3, to: Vec3) -> Option<Vec3> {
        raycast_arena_walls(from, to)
    }

    fn pickup_in_front(&self, id: EntityId, range: f32) -> Option<EntityId> {
        let character = self.characters.get(&id)?;
        self.objects
            .values()
            .filter(|o| o.holder.is_none())
            .filter(|o| {
                let offset = o.position - character.position;
                offset.dot(&character.facing) > 0.0 && offset.magnitude() <= range
            })
            .min_by(|a, b| {
                a.position
                    .distance(&character.position)
                    .total_cmp(&b.position.distance(&character.position))
            })
            .map(|o| o.id)
    }

    fn is_animating(&self, id: EntityId) -> bool {
        self.animating.contains(&id)
            || self
                .characters
                .get(&id)
                .map_or(false, |c| c.forced_movement)
    }
}

/// Everything the client knows about the running session: the replicated
/// world and one action player per character.
pub struct ClientGameState {
    pub world: ClientWorld,
    factory: ActionFactory,
    players: HashMap<EntityId, ClientActionPlayer>,
    local_character: Option<EntityId>,
    pub last_snapshot_tick: u32,
    now: f32,
    cues: Vec<VisualCue>,
}

impl ClientGameState {
    pub fn new(catalog: Arc<ActionCatalog>) -> Self {
        Self {
            world: ClientWorld::new(),
            factory: ActionFactory::new(catalog),
            players: HashMap::new(),
            local_character: None,
            last_snapshot_tick: 0,
            now: 0.0,
            cues: Vec::new(),
        }
    }

    pub fn now(&self) -> f32 {
        self.now
    }

    pub fn local_character(&self) -> Option<EntityId> {
        self.local_character
    }

    pub fn set_local_character(&mut self, character: Option<EntityId>) {
        if let Some(id) = character {
            info!("Controlling character {}", id);
        }
        self.local_character = character;
    }

    pub fn factory(&self) -> &ActionFactory {
        &self.factory
    }

    pub fn action_player(&self, character: EntityId) -> Option<&ClientActionPlayer> {
        self.players.get(&character)
    }

    /// Replaces the replicated world. Snapshots older than the last one
    /// applied are dropped.
    pub fn apply_snapshot(&mut self, tick: u32, characters: Vec<CharacterSnapshot>, objects: Vec<ObjectSnapshot>) {
        if tick < self.last_snapshot_tick {
            debug!("Dropping stale snapshot {} (have {})", tick, self.last_snapshot_tick);
            return;
        }
        self.last_snapshot_tick = tick;
        self.world.apply_snapshot(characters, objects);

        let gone: Vec<EntityId> = self
            .players
            .keys()
            .filter(|id| !self.world.exists(**id))
            .copied()
            .collect();
        for id in gone {
            if let Some(mut player) = self.players.remove(&id) {
                player.release_all(&mut self.factory);
            }
        }
        for id in self.world.characters.keys() {
            self.players
                .entry(*id)
                .or_insert_with(|| ClientActionPlayer::new(*id));
        }
    }

    pub fn play_action(&mut self, character: EntityId, data: ActionRequestData) {
        let now = self.now;
        let player = self
            .players
            .entry(character)
            .or_insert_with(|| ClientActionPlayer::new(character));
        player.play_action(&mut self.factory, &self.world, data, now, &mut self.cues);
    }

    pub fn cancel_all_actions(&mut self, character: EntityId) {
        let now = self.now;
        if let Some(player) = self.players.get_mut(&character) {
            player.cancel_all_actions(&mut self.factory, &self.world, now, &mut self.cues);
        }
    }

    pub fn cancel_actions_by_id(&mut self, character: EntityId, action_id: ActionId) {
        let now = self.now;
        if let Some(player) = self.players.get_mut(&character) {
            player.cancel_all_actions_with_same_prototype_id(
                &mut self.factory,
                &self.world,
                action_id,
                now,
                &mut self.cues,
            );
        }
    }

    pub fn stopped_charging_up(&mut self, character: EntityId, percent: f32) {
        let now = self.now;
        if let Some(player) = self.players.get_mut(&character) {
            player.on_stopped_charging_up(&self.world, percent, now, &mut self.cues);
        }
    }

    /// Plays local input ahead of the host's confirmation, if possible.
    pub fn anticipate(&mut self, data: &ActionRequestData) -> bool {
        let Some(character) = self.local_character else {
            return false;
        };
        let now = self.now;
        let player = self
            .players
            .entry(character)
            .or_insert_with(|| ClientActionPlayer::new(character));
        player.anticipate_action(&mut self.factory, &self.world, data, now, &mut self.cues)
    }

    /// Advances every action player by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        self.now += dt;
        let now = self.now;
        for player in self.players.values_mut() {
            player.on_update(&mut self.factory, &self.world, now, &mut self.cues);
        }
        for (id, player) in &self.players {
            self.world.set_animating(*id, player.is_animating(now));
        }
    }

    /// Visual cues produced since the last drain.
    pub fn drain_cues(&mut self) -> Vec<VisualCue> {
        std::mem::take(&mut self.cues)
    }

    /// Forgets the session, e.g. after losing the host.
    pub fn reset(&mut self) {
        for player in self.players.values_mut() {
            player.release_all(&mut self.factory);
        }
        self.players.clear();
        self.world.clear();
        self.local_character = None;
        self.last_snapshot_tick = 0;
        self.cues.clear();
    }
}
