//! The authoritative entity store.
//!
//! [`ServerWorld`] owns every character, carriable object and projectile in
//! the arena and implements the [`World`] traits the action hooks run
//! against. Each character's [`ServerActionPlayer`] lives on the character;
//! while one of its hooks is running the player is detached, so anything
//! that would have to re-enter it (a gameplay activity, clearing its queue)
//! is deferred until it is reattached.

use crate::action_player::ServerActionPlayer;
use crate::character::{CharacterClass, ServerCharacter};
use crate::movement::MovementState;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::action::util::hits_player_characters;
use shared::action::{
    ActionFactory, ActionLogic, BuffableValue, GameplayActivity, ProjectileInfo, DEFAULT_HIT_REACT,
};
use shared::protocol::ObjectSnapshot;
use shared::world::{raycast_arena_walls, ARENA_HALF_EXTENT, BODY_RADIUS};
use shared::{
    ActionId, ActionRequestData, ClientId, EntityId, LifeState, Packet, Vec3, World, WorldQuery,
};
use std::collections::{BTreeMap, HashSet};

/// A pot or similar object characters can carry.
#[derive(Debug, Clone)]
pub struct WorldObject {
    pub id: EntityId,
    pub position: Vec3,
}

#[derive(Debug, Clone)]
struct Projectile {
    owner: EntityId,
    info: ProjectileInfo,
    position: Vec3,
    direction: Vec3,
    traveled: f32,
    victims: Vec<EntityId>,
}

/// Work for an action player that was detached when it came up.
#[derive(Debug, Clone, Copy)]
enum Deferred {
    Activity(GameplayActivity),
    ClearActions { cancel_non_blocking: bool },
}

pub struct ServerWorld {
    characters: BTreeMap<EntityId, ServerCharacter>,
    objects: BTreeMap<EntityId, WorldObject>,
    projectiles: Vec<Projectile>,
    /// Charging character and whoever it was touching last tick.
    contacts: HashSet<(EntityId, EntityId)>,
    next_id: EntityId,
    now: f32,
    rng: StdRng,
    outbox: Vec<Packet>,
    deferred: Vec<(EntityId, Deferred)>,
}

impl Default for ServerWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerWorld {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// A world whose rolls are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            characters: BTreeMap::new(),
            objects: BTreeMap::new(),
            projectiles: Vec::new(),
            contacts: HashSet::new(),
            next_id: 1,
            now: 0.0,
            rng,
            outbox: Vec::new(),
            deferred: Vec::new(),
        }
    }

    pub fn now(&self) -> f32 {
        self.now
    }

    pub fn set_time(&mut self, now: f32) {
        self.now = now;
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn spawn_character(
        &mut self,
        name: &str,
        class: CharacterClass,
        position: Vec3,
        client_id: Option<ClientId>,
    ) -> EntityId {
        let id = self.allocate_id();
        let character = ServerCharacter::new(id, name, class, Self::clamp_to_arena(position), client_id);
        debug!("Spawned {} ({:?}) as {}", name, class, id);
        self.characters.insert(id, character);
        id
    }

    pub fn spawn_object(&mut self, position: Vec3) -> EntityId {
        let id = self.allocate_id();
        self.objects.insert(
            id,
            WorldObject {
                id,
                position: Self::clamp_to_arena(position),
            },
        );
        id
    }

    /// Removes a character, handing its actions back to the factory without
    /// running any hook. Whatever it carried is left where it stood.
    pub fn despawn_character(&mut self, id: EntityId, factory: &mut ActionFactory) -> Option<ServerCharacter> {
        let mut character = self.characters.remove(&id)?;
        if let Some(player) = character.actions.as_mut() {
            player.release_all(factory);
        }
        self.deferred.retain(|(owner, _)| *owner != id);
        self.contacts.retain(|(a, b)| *a != id && *b != id);
        debug!("Despawned {} ({})", character.name, id);
        Some(character)
    }

    /// Empties the arena between rounds.
    pub fn clear(&mut self, factory: &mut ActionFactory) {
        let ids: Vec<EntityId> = self.characters.keys().copied().collect();
        for id in ids {
            self.despawn_character(id, factory);
        }
        self.objects.clear();
        self.projectiles.clear();
        self.outbox.clear();
    }

    pub fn character(&self, id: EntityId) -> Option<&ServerCharacter> {
        self.characters.get(&id)
    }

    pub fn character_mut(&mut self, id: EntityId) -> Option<&mut ServerCharacter> {
        self.characters.get_mut(&id)
    }

    pub fn characters(&self) -> impl Iterator<Item = &ServerCharacter> {
        self.characters.values()
    }

    pub fn object_snapshots(&self) -> Vec<ObjectSnapshot> {
        self.objects
            .values()
            .map(|object| ObjectSnapshot {
                id: object.id,
                position: object.position,
                holder: self.holder_of(object.id),
            })
            .collect()
    }

    pub fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }

    /// `None` while the character is missing or its player is detached.
    pub fn action_player(&self, id: EntityId) -> Option<&ServerActionPlayer> {
        self.characters.get(&id).and_then(|c| c.actions.as_ref())
    }

    /// Runs `f` with the character's action player detached, so `f` may
    /// hand the world to the player's hooks. Deferred work for the player
    /// runs as soon as it is reattached.
    pub fn with_action_player<R>(
        &mut self,
        id: EntityId,
        f: impl FnOnce(&mut ServerActionPlayer, &mut ServerWorld) -> R,
    ) -> Option<R> {
        let mut player = self.characters.get_mut(&id)?.actions.take()?;
        let result = f(&mut player, self);
        match self.characters.get_mut(&id) {
            Some(character) => character.actions = Some(player),
            None => warn!("Character {} left the world while its actions ran", id),
        }
        self.flush_deferred(id);
        Some(result)
    }

    fn flush_deferred(&mut self, id: EntityId) {
        while let Some(index) = self.deferred.iter().position(|(owner, _)| *owner == id) {
            let (_, op) = self.deferred.remove(index);
            let now = self.now;
            self.with_action_player(id, |player, world| match op {
                Deferred::Activity(activity) => player.on_gameplay_activity(world, activity, now),
                Deferred::ClearActions { cancel_non_blocking } => {
                    player.clear_actions(world, now, cancel_non_blocking)
                }
            });
        }
    }

    fn is_detached(&self, id: EntityId) -> bool {
        self.characters.get(&id).map_or(false, |c| c.actions.is_none())
    }

    /// Tells every running action of the character about `activity`.
    pub fn on_gameplay_activity(&mut self, id: EntityId, activity: GameplayActivity) {
        if self.is_detached(id) {
            self.deferred.push((id, Deferred::Activity(activity)));
            return;
        }
        let now = self.now;
        self.with_action_player(id, |player, world| player.on_gameplay_activity(world, activity, now));
    }

    pub fn clear_actions(&mut self, id: EntityId, cancel_non_blocking: bool) {
        if self.is_detached(id) {
            self.deferred
                .push((id, Deferred::ClearActions { cancel_non_blocking }));
            return;
        }
        let now = self.now;
        self.with_action_player(id, |player, world| {
            player.clear_actions(world, now, cancel_non_blocking)
        });
    }

    /// Plays a request on behalf of the character's controller.
    ///
    /// Attacks first let running actions react (stealth breaks, for one).
    /// Nothing is played while the character is down or being moved by
    /// force.
    pub fn play_action(&mut self, factory: &mut ActionFactory, id: EntityId, data: ActionRequestData) {
        let is_friendly = factory
            .catalog()
            .get(data.action_id)
            .map_or(true, |config| config.is_friendly);
        if !is_friendly {
            self.on_gameplay_activity(id, GameplayActivity::UsingAttackAction);
        }

        let Some(character) = self.characters.get_mut(&id) else {
            return;
        };
        if !character.can_act() {
            debug!("{} cannot act, ignoring {}", id, data.action_id);
            return;
        }
        if data.cancel_movement {
            character.movement.cancel_move();
        }

        let now = self.now;
        self.with_action_player(id, |player, world| player.play_action(world, factory, data, now));
    }

    /// Walks the character to `destination`. Interruptible work is dropped
    /// and the locked target released.
    pub fn move_character(&mut self, id: EntityId, destination: Vec3) {
        if !self.characters.get(&id).map_or(false, |c| c.can_act()) {
            return;
        }
        let now = self.now;
        self.with_action_player(id, |player, world| {
            let interruptible = player
                .active_action_config()
                .map_or(false, |config| config.action_interruptible);
            if interruptible {
                player.clear_actions(world, now, false);
            }
            player.cancel_running_actions_by_logic(world, now, ActionLogic::Target, true, None);
        });
        self.set_destination(id, destination);
    }

    pub fn stop_charging_up(&mut self, id: EntityId) {
        self.on_gameplay_activity(id, GameplayActivity::StoppedChargingUp);
    }

    pub fn set_destination(&mut self, id: EntityId, destination: Vec3) {
        if let Some(character) = self.characters.get_mut(&id) {
            character
                .movement
                .set_destination(Self::clamp_to_arena(destination));
        }
    }

    /// Advances the simulation to `now`: actions first, then movement,
    /// charge collisions, projectiles and carried objects.
    pub fn update(&mut self, factory: &mut ActionFactory, now: f32, dt: f32) {
        self.now = now;

        let ids: Vec<EntityId> = self.characters.keys().copied().collect();
        for &id in &ids {
            self.with_action_player(id, |player, world| player.update(world, &mut *factory, now));
        }

        self.step_movement(&ids, dt, now);
        self.detect_charge_collisions();
        self.step_projectiles(dt);
        self.carry_objects();
    }

    fn step_movement(&mut self, ids: &[EntityId], dt: f32, now: f32) {
        for id in ids {
            let follow_target = match self.characters.get(id).map(|c| c.movement.state) {
                Some(MovementState::Following { target }) => self.characters.get(&target).map(|t| t.position),
                _ => None,
            };
            let Some(character) = self.characters.get_mut(id) else {
                continue;
            };
            let (position, facing) =
                character
                    .movement
                    .step(character.position, character.facing, follow_target, dt, now);
            character.position = Self::clamp_to_arena(position);
            character.facing = facing;
        }
    }

    /// Reports bodies a charging character newly runs into.
    fn detect_charge_collisions(&mut self) {
        let mut touching = HashSet::new();
        let mut entered = Vec::new();
        for (&id, character) in &self.characters {
            if !matches!(character.movement.state, MovementState::Charging { .. }) {
                continue;
            }
            for other in self.overlap_sphere(character.position, BODY_RADIUS) {
                if other == id {
                    continue;
                }
                touching.insert((id, other));
                if !self.contacts.contains(&(id, other)) {
                    entered.push((id, other));
                }
            }
        }
        self.contacts = touching;

        let now = self.now;
        for (id, other) in entered {
            self.with_action_player(id, |player, world| player.collision_entered(world, now, other));
        }
    }

    fn step_projectiles(&mut self, dt: f32) {
        let mut projectiles = std::mem::take(&mut self.projectiles);
        projectiles.retain_mut(|projectile| self.step_projectile(projectile, dt));
        // hits may have launched new ones
        projectiles.append(&mut self.projectiles);
        self.projectiles = projectiles;
    }

    /// Returns `false` once the projectile is spent.
    fn step_projectile(&mut self, projectile: &mut Projectile, dt: f32) -> bool {
        let step = projectile.info.speed * dt;
        let next = projectile.position + projectile.direction.scale(step);
        if self.raycast_obstacle(projectile.position, next).is_some() {
            return false;
        }
        projectile.position = next;
        projectile.traveled += step;

        let hits_players = hits_player_characters(&*self, projectile.owner, false);
        for victim in self.overlap_sphere(projectile.position, projectile.info.radius) {
            if victim == projectile.owner || projectile.victims.contains(&victim) {
                continue;
            }
            if !self.is_alive(victim) || self.is_npc(victim) == hits_players {
                continue;
            }
            projectile.victims.push(victim);
            self.receive_hp(projectile.owner, victim, -projectile.info.damage);
            if projectile.victims.len() >= projectile.info.max_victims as usize {
                return false;
            }
        }
        projectile.traveled < projectile.info.range
    }

    fn carry_objects(&mut self) {
        for character in self.characters.values() {
            if let Some(object) = character.held_object.and_then(|id| self.objects.get_mut(&id)) {
                object.position = character.position;
            }
        }
    }

    /// Takes every packet the actions asked to send since the last call.
    pub fn drain_outbox(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.outbox)
    }

    pub fn take_animation_triggers(&mut self, id: EntityId) -> Vec<String> {
        self.characters
            .get_mut(&id)
            .map(|c| std::mem::take(&mut c.animation_triggers))
            .unwrap_or_default()
    }

    fn clamp_to_arena(position: Vec3) -> Vec3 {
        let limit = ARENA_HALF_EXTENT - BODY_RADIUS;
        Vec3::new(
            position.x.clamp(-limit, limit),
            position.y,
            position.z.clamp(-limit, limit),
        )
    }
}

impl WorldQuery for ServerWorld {
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
        self.characters.get(&id).map_or(false, |c| c.is_npc())
    }

    fn target_of(&self, id: EntityId) -> Option<EntityId> {
        self.characters.get(&id).and_then(|c| c.target)
    }

    fn held_object(&self, id: EntityId) -> Option<EntityId> {
        self.characters.get(&id).and_then(|c| c.held_object)
    }

    fn holder_of(&self, object: EntityId) -> Option<EntityId> {
        self.characters
            .values()
            .find(|c| c.held_object == Some(object))
            .map(|c| c.id)
    }

    fn is_moving(&self, id: EntityId) -> bool {
        self.characters
            .get(&id)
            .map_or(false, |c| c.movement.is_moving())
    }

    fn is_performing_forced_movement(&self, id: EntityId) -> bool {
        self.characters
            .get(&id)
            .map_or(false, |c| c.movement.is_performing_forced_movement())
    }

    fn overlap_sphere(&self, center: Vec3, radius: f32) -> Vec<EntityId> {
        // keys iterate in order, so hits come out sorted by id
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

    /// The arena walls are the only static geometry.
    fn raycast_obstacle(&self, from: Vec3, to: Vec3) -> Option<Vec3> {
        raycast_arena_walls(from, to)
    }

    fn pickup_in_front(&self, id: EntityId, range: f32) -> Option<EntityId> {
        let character = self.characters.get(&id)?;
        self.objects
            .values()
            .filter(|object| {
                let offset = object.position - character.position;
                offset.dot(&character.facing) > 0.0 && offset.magnitude() <= range
            })
            .min_by(|a, b| {
                a.position
                    .distance(&character.position)
                    .total_cmp(&b.position.distance(&character.position))
            })
            .map(|object| object.id)
    }

    /// A detached player reads as unbuffed.
    fn buffed_value(&self, id: EntityId, kind: BuffableValue) -> f32 {
        self.action_player(id)
            .map_or_else(|| kind.unbuffed(), |player| player.get_buffed_value(kind, self.now))
    }

    fn is_animating(&self, id: EntityId) -> bool {
        self.action_player(id)
            .map_or(false, |player| player.active_action_info().is_some())
    }
}

impl World for ServerWorld {
    fn receive_hp(&mut self, inflicter: EntityId, target: EntityId, amount: i32) {
        if !self.characters.contains_key(&target) {
            return;
        }

        let scaled = if amount > 0 {
            self.on_gameplay_activity(target, GameplayActivity::Healed);
            amount as f32 * self.buffed_value(target, BuffableValue::PercentHealingReceived)
        } else {
            self.on_gameplay_activity(target, GameplayActivity::AttackedByEnemy);
            let scaled = amount as f32 * self.buffed_value(target, BuffableValue::PercentDamageReceived);
            self.set_animation_trigger(target, DEFAULT_HIT_REACT);
            scaled
        };

        let Some(character) = self.characters.get_mut(&target) else {
            return;
        };
        let went_down = character.set_hit_points(character.hit_points + scaled as i32);
        debug!(
            "{} took {} from {}, now at {}",
            target, scaled as i32, inflicter, character.hit_points
        );
        if went_down {
            info!("{} is {:?}", character.name, character.life_state);
            self.clear_actions(target, false);
        }
    }

    fn revive(&mut self, inflicter: EntityId, target: EntityId, hp: i32) {
        let Some(character) = self.characters.get_mut(&target) else {
            return;
        };
        if character.life_state != LifeState::Fainted {
            return;
        }
        character.set_hit_points(hp);
        character.life_state = LifeState::Alive;
        info!("{} revived by {}", character.name, inflicter);
    }

    fn look_at(&mut self, id: EntityId, point: Vec3) {
        if let Some(character) = self.characters.get_mut(&id) {
            let direction = (point - character.position).flat().normalize();
            if direction != Vec3::ZERO {
                character.facing = direction;
            }
        }
    }

    fn set_target(&mut self, id: EntityId, target: Option<EntityId>) {
        if let Some(character) = self.characters.get_mut(&id) {
            character.target = target;
        }
    }

    fn set_stealthy(&mut self, id: EntityId, stealthy: bool) {
        if let Some(character) = self.characters.get_mut(&id) {
            character.is_stealthy = stealthy;
        }
    }

    fn follow(&mut self, id: EntityId, target: EntityId) {
        if let Some(character) = self.characters.get_mut(&id) {
            character.movement.follow(target);
        }
    }

    fn cancel_move(&mut self, id: EntityId) {
        if let Some(character) = self.characters.get_mut(&id) {
            character.movement.cancel_move();
        }
    }

    fn teleport(&mut self, id: EntityId, position: Vec3) {
        if let Some(character) = self.characters.get_mut(&id) {
            character.position = Self::clamp_to_arena(position);
        }
    }

    fn start_forward_charge(&mut self, id: EntityId, speed: f32, duration: f32) {
        let until = self.now + duration;
        if let Some(character) = self.characters.get_mut(&id) {
            let facing = character.facing;
            character.movement.start_forward_charge(facing, speed, until);
        }
    }

    fn start_knockback(&mut self, id: EntityId, from: Vec3, speed: f32, duration: f32) {
        let until = self.now + duration;
        if let Some(character) = self.characters.get_mut(&id) {
            let position = character.position;
            character.movement.start_knockback(position, from, speed, until);
        }
    }

    fn set_held_object(&mut self, id: EntityId, object: Option<EntityId>) {
        if let Some(character) = self.characters.get_mut(&id) {
            character.held_object = object;
        }
    }

    fn spawn_projectile(&mut self, owner: EntityId, info: &ProjectileInfo, origin: Vec3, direction: Vec3) {
        let mut direction = direction.flat().normalize();
        if direction == Vec3::ZERO {
            direction = Vec3::FORWARD;
        }
        self.projectiles.push(Projectile {
            owner,
            info: info.clone(),
            position: origin,
            direction,
            traveled: 0.0,
            victims: Vec::new(),
        });
    }

    fn set_animation_trigger(&mut self, id: EntityId, trigger: &str) {
        if let Some(character) = self.characters.get_mut(&id) {
            character.animation_triggers.push(trigger.to_string());
        }
    }

    fn reset_animation_trigger(&mut self, id: EntityId, trigger: &str) {
        if let Some(character) = self.characters.get_mut(&id) {
            character.animation_triggers.retain(|t| t != trigger);
        }
    }

    fn roll(&mut self) -> f32 {
        self.rng.gen::<f32>()
    }

    fn client_play_action(&mut self, id: EntityId, data: &ActionRequestData) {
        self.outbox.push(Packet::PlayAction {
            character: id,
            data: data.clone(),
        });
    }

    fn client_cancel_all_actions(&mut self, id: EntityId) {
        self.outbox.push(Packet::CancelAllActions { character: id });
    }

    fn client_cancel_actions_by_id(&mut self, id: EntityId, action_id: ActionId) {
        self.outbox.push(Packet::CancelActionsById {
            character: id,
            action_id,
        });
    }

    fn client_stopped_charging_up(&mut self, id: EntityId, percent: f32) {
        self.outbox.push(Packet::StoppedChargingUp {
            character: id,
            percent,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::action::{
        ActionCatalog, ARCHER_BASE_ATTACK, BOSS_TRAMPLE, GENERAL_TARGET, ROGUE_STEALTH, STUNNED,
        TANK_BASE_ATTACK,
    };
    use std::sync::Arc;

    fn factory() -> ActionFactory {
        ActionFactory::new(Arc::new(ActionCatalog::default()))
    }

    fn run(world: &mut ServerWorld, factory: &mut ActionFactory, from: f32, to: f32, dt: f32) -> f32 {
        let mut now = from;
        while now < to {
            now += dt;
            world.update(factory, now, dt);
        }
        now
    }

    #[test]
    fn test_damage_applies_buffs_and_hit_react() {
        let mut world = ServerWorld::with_seed(1);
        let mut factory = factory();
        let tank = world.spawn_character("Tank", CharacterClass::Tank, Vec3::ZERO, Some(1));
        let imp = world.spawn_character("Imp", CharacterClass::Imp, Vec3::new(0.0, 0.0, 5.0), None);

        world.play_action(&mut factory, tank, ActionRequestData::new(STUNNED));
        world.receive_hp(imp, tank, -10);

        assert_eq!(world.character(tank).unwrap().hit_points, 130);
        assert_eq!(world.take_animation_triggers(tank).last().map(String::as_str), Some(DEFAULT_HIT_REACT));
    }

    #[test]
    fn test_zero_hit_points_faints_players_and_kills_npcs() {
        let mut world = ServerWorld::with_seed(1);
        let mut factory = factory();
        let tank = world.spawn_character("Tank", CharacterClass::Tank, Vec3::ZERO, Some(1));
        let imp = world.spawn_character("Imp", CharacterClass::Imp, Vec3::new(0.0, 0.0, 5.0), None);

        world.play_action(&mut factory, tank, ActionRequestData::new(TANK_BASE_ATTACK));
        world.receive_hp(imp, tank, -500);
        let character = world.character(tank).unwrap();
        assert_eq!(character.hit_points, 0);
        assert_eq!(character.life_state, LifeState::Fainted);
        assert!(world.action_player(tank).unwrap().queued_action_ids().is_empty());

        world.receive_hp(tank, imp, -500);
        assert_eq!(world.life_state(imp), Some(LifeState::Dead));

        // only fainted characters come back
        world.revive(tank, imp, 20);
        assert_eq!(world.life_state(imp), Some(LifeState::Dead));
        world.revive(imp, tank, 50);
        assert_eq!(world.life_state(tank), Some(LifeState::Alive));
        assert_eq!(world.character(tank).unwrap().hit_points, 50);
    }

    #[test]
    fn test_healing_raises_activity_and_clamps() {
        let mut world = ServerWorld::with_seed(1);
        let archer = world.spawn_character("Archer", CharacterClass::Archer, Vec3::ZERO, Some(1));
        world.receive_hp(archer, archer, -30);
        world.receive_hp(archer, archer, 100);
        assert_eq!(world.character(archer).unwrap().hit_points, 100);
    }

    #[test]
    fn test_activity_for_detached_player_is_deferred() {
        let mut world = ServerWorld::with_seed(1);
        let mut factory = factory();
        let rogue = world.spawn_character("Rogue", CharacterClass::Rogue, Vec3::ZERO, Some(1));
        let imp = world.spawn_character("Imp", CharacterClass::Imp, Vec3::new(0.0, 0.0, 5.0), None);

        world.play_action(&mut factory, rogue, ActionRequestData::new(ROGUE_STEALTH));
        world.update(&mut factory, 1.0, 1.0);
        assert!(world.character(rogue).unwrap().is_stealthy);

        // hit while its own player is detached
        world.with_action_player(rogue, |_, world| world.receive_hp(imp, rogue, -5));
        assert!(!world.character(rogue).unwrap().is_stealthy);

        world.update(&mut factory, 1.1, 0.1);
        assert!(world.action_player(rogue).unwrap().non_blocking_action_ids().is_empty());
    }

    #[test]
    fn test_attacking_breaks_stealth() {
        let mut world = ServerWorld::with_seed(1);
        let mut factory = factory();
        let rogue = world.spawn_character("Rogue", CharacterClass::Rogue, Vec3::ZERO, Some(1));

        world.play_action(&mut factory, rogue, ActionRequestData::new(ROGUE_STEALTH));
        world.update(&mut factory, 1.0, 1.0);
        assert!(world.character(rogue).unwrap().is_stealthy);

        world.play_action(&mut factory, rogue, ActionRequestData::new(TANK_BASE_ATTACK));
        assert!(!world.character(rogue).unwrap().is_stealthy);
    }

    #[test]
    fn test_move_interrupts_and_releases_target() {
        let mut world = ServerWorld::with_seed(1);
        let mut factory = factory();
        let tank = world.spawn_character("Tank", CharacterClass::Tank, Vec3::ZERO, Some(1));
        let imp = world.spawn_character("Imp", CharacterClass::Imp, Vec3::new(0.0, 0.0, 5.0), None);

        world.play_action(&mut factory, tank, ActionRequestData::new(GENERAL_TARGET).with_targets(vec![imp]));
        world.play_action(&mut factory, tank, ActionRequestData::new(TANK_BASE_ATTACK));
        assert_eq!(world.target_of(tank), Some(imp));

        world.move_character(tank, Vec3::new(4.0, 0.0, 0.0));

        let player = world.action_player(tank).unwrap();
        assert!(player.queued_action_ids().is_empty());
        assert!(player.non_blocking_action_ids().is_empty());
        assert_eq!(world.target_of(tank), None);
        assert!(world.is_moving(tank));
    }

    #[test]
    fn test_forced_movement_blocks_requests() {
        let mut world = ServerWorld::with_seed(1);
        let mut factory = factory();
        let tank = world.spawn_character("Tank", CharacterClass::Tank, Vec3::ZERO, Some(1));

        world.start_knockback(tank, Vec3::new(0.0, 0.0, -1.0), 10.0, 0.5);
        world.play_action(&mut factory, tank, ActionRequestData::new(TANK_BASE_ATTACK));
        world.move_character(tank, Vec3::new(4.0, 0.0, 0.0));

        assert!(world.action_player(tank).unwrap().queued_action_ids().is_empty());
        assert!(world.is_performing_forced_movement(tank));
    }

    #[test]
    fn test_arrow_hits_first_foe_once() {
        let mut world = ServerWorld::with_seed(1);
        let mut factory = factory();
        let archer = world.spawn_character("Archer", CharacterClass::Archer, Vec3::ZERO, Some(1));
        let imp = world.spawn_character("Imp", CharacterClass::Imp, Vec3::new(0.0, 0.0, 6.0), None);
        let behind = world.spawn_character("Imp", CharacterClass::Imp, Vec3::new(0.0, 0.0, 8.0), None);

        world.play_action(&mut factory, archer, ActionRequestData::new(ARCHER_BASE_ATTACK));
        run(&mut world, &mut factory, 0.0, 1.0, 0.05);

        assert_eq!(world.character(imp).unwrap().hit_points, 20);
        assert_eq!(world.character(behind).unwrap().hit_points, 40);
        assert_eq!(world.projectile_count(), 0);
    }

    #[test]
    fn test_trample_hits_and_knocks_back() {
        let mut world = ServerWorld::with_seed(1);
        let mut factory = factory();
        let boss = world.spawn_character("Boss", CharacterClass::Boss, Vec3::ZERO, None);
        let tank = world.spawn_character("Tank", CharacterClass::Tank, Vec3::new(0.0, 0.0, 6.0), Some(1));

        world.play_action(&mut factory, boss, ActionRequestData::new(BOSS_TRAMPLE).with_targets(vec![tank]));
        let mut now = 0.0;
        let mut knocked_back = false;
        while now < 2.0 {
            now += 0.02;
            world.update(&mut factory, now, 0.02);
            knocked_back |= world.is_performing_forced_movement(tank);
        }

        assert_eq!(world.character(tank).unwrap().hit_points, 110);
        assert!(knocked_back);
    }

    #[test]
    fn test_walls_stop_rays_and_bodies() {
        let mut world = ServerWorld::with_seed(1);
        let hit = world
            .raycast_obstacle(Vec3::ZERO, Vec3::new(50.0, 0.0, 0.0))
            .unwrap();
        assert_approx_eq!(hit.x, ARENA_HALF_EXTENT);
        assert!(world.raycast_obstacle(Vec3::ZERO, Vec3::new(5.0, 0.0, 5.0)).is_none());

        let tank = world.spawn_character("Tank", CharacterClass::Tank, Vec3::new(100.0, 0.0, 0.0), Some(1));
        assert_eq!(world.position(tank).unwrap().x, ARENA_HALF_EXTENT - BODY_RADIUS);
    }

    #[test]
    fn test_carried_object_follows_holder() {
        let mut world = ServerWorld::with_seed(1);
        let mut factory = factory();
        let tank = world.spawn_character("Tank", CharacterClass::Tank, Vec3::ZERO, Some(1));
        let pot = world.spawn_object(Vec3::new(0.0, 0.0, 1.0));

        assert_eq!(world.pickup_in_front(tank, 2.0), Some(pot));
        world.set_held_object(tank, Some(pot));
        world.set_destination(tank, Vec3::new(5.0, 0.0, 0.0));
        run(&mut world, &mut factory, 0.0, 2.0, 0.1);

        assert_eq!(world.holder_of(pot), Some(tank));
        assert_eq!(world.position(pot), world.position(tank));
        assert_eq!(world.object_snapshots()[0].holder, Some(tank));
    }

    #[test]
    fn test_client_notifications_land_in_outbox() {
        let mut world = ServerWorld::with_seed(1);
        world.client_cancel_all_actions(3);
        world.client_stopped_charging_up(3, 0.5);
        let packets = world.drain_outbox();
        assert_eq!(packets.len(), 2);
        match &packets[0] {
            Packet::CancelAllActions { character } => assert_eq!(*character, 3),
            other => panic!("Unexpected packet type: {:?}", other),
        }
        assert!(world.drain_outbox().is_empty());
    }

    #[test]
    fn test_despawn_returns_instances() {
        let mut world = ServerWorld::with_seed(1);
        let mut factory = factory();
        let tank = world.spawn_character("Tank", CharacterClass::Tank, Vec3::ZERO, Some(1));
        world.play_action(&mut factory, tank, ActionRequestData::new(TANK_BASE_ATTACK));

        let character = world.despawn_character(tank, &mut factory).unwrap();
        assert_eq!(character.name, "Tank");
        assert!(!world.exists(tank));
        assert_eq!(factory.pooled_count(TANK_BASE_ATTACK), 1);
    }
}
