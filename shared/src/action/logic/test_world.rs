//! A small in-memory world for exercising action hooks in unit tests.

use crate::action::{ActionContext, ActionId, ActionRequestData, BuffableValue, ProjectileInfo};
use crate::math::Vec3;
use crate::world::{EntityId, LifeState, World, WorldQuery};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Body {
    pub position: Vec3,
    pub facing: Vec3,
    /// `None` for carriable objects.
    pub life: Option<LifeState>,
    pub npc: bool,
    pub hp: i32,
    pub target: Option<EntityId>,
    pub held: Option<EntityId>,
    pub moving: bool,
    pub forced: bool,
    pub stealthy: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Hp { inflicter: EntityId, target: EntityId, amount: i32 },
    Revive { target: EntityId, hp: i32 },
    Trigger { id: EntityId, name: String },
    ResetTrigger { id: EntityId, name: String },
    Follow { id: EntityId, target: EntityId },
    CancelMove(EntityId),
    Teleport { id: EntityId, position: Vec3 },
    ForwardCharge { id: EntityId, speed: f32, duration: f32 },
    Knockback { id: EntityId },
    Projectile { owner: EntityId, damage: i32 },
    ClientPlay { id: EntityId, action_id: ActionId },
    ClientCancelAll(EntityId),
    ClientCancelById { id: EntityId, action_id: ActionId },
    StoppedCharging { id: EntityId, percent: f32 },
}

#[derive(Default)]
pub struct TestWorld {
    pub bodies: HashMap<EntityId, Body>,
    pub buffs: HashMap<(EntityId, BuffableValue), f32>,
    pub events: Vec<Event>,
    pub wall_at_x: Option<f32>,
    pub next_roll: f32,
    next_id: EntityId,
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    fn spawn(&mut self, position: Vec3, life: Option<LifeState>, npc: bool) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        self.bodies.insert(
            id,
            Body {
                position,
                facing: Vec3::FORWARD,
                life,
                npc,
                hp: 100,
                target: None,
                held: None,
                moving: false,
                forced: false,
                stealthy: false,
            },
        );
        id
    }

    pub fn spawn_player(&mut self, position: Vec3) -> EntityId {
        self.spawn(position, Some(LifeState::Alive), false)
    }

    pub fn spawn_npc(&mut self, position: Vec3) -> EntityId {
        self.spawn(position, Some(LifeState::Alive), true)
    }

    pub fn spawn_object(&mut self, position: Vec3) -> EntityId {
        self.spawn(position, None, false)
    }

    pub fn body(&self, id: EntityId) -> &Body {
        &self.bodies[&id]
    }

    pub fn body_mut(&mut self, id: EntityId) -> &mut Body {
        self.bodies.get_mut(&id).unwrap()
    }

    pub fn ctx(&mut self, character: EntityId, now: f32) -> ActionContext<'_> {
        ActionContext::new(self, character, now)
    }

    pub fn damage_to(&self, target: EntityId) -> i32 {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Hp { target: t, amount, .. } if *t == target && *amount < 0 => Some(-amount),
                _ => None,
            })
            .sum()
    }

    pub fn triggers(&self, id: EntityId) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Trigger { id: i, name } if *i == id => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn has(&self, event: &Event) -> bool {
        self.events.contains(event)
    }

    fn characters(&self) -> impl Iterator<Item = (&EntityId, &Body)> {
        self.bodies.iter().filter(|(_, b)| b.life.is_some())
    }
}

impl WorldQuery for TestWorld {
    fn exists(&self, id: EntityId) -> bool {
        self.bodies.contains_key(&id)
    }

    fn position(&self, id: EntityId) -> Option<Vec3> {
        self.bodies.get(&id).map(|b| b.position)
    }

    fn facing(&self, id: EntityId) -> Option<Vec3> {
        self.bodies.get(&id).map(|b| b.facing)
    }

    fn life_state(&self, id: EntityId) -> Option<LifeState> {
        self.bodies.get(&id).and_then(|b| b.life)
    }

    fn is_npc(&self, id: EntityId) -> bool {
        self.bodies.get(&id).map_or(false, |b| b.npc)
    }

    fn target_of(&self, id: EntityId) -> Option<EntityId> {
        self.bodies.get(&id).and_then(|b| b.target)
    }

    fn held_object(&self, id: EntityId) -> Option<EntityId> {
        self.bodies.get(&id).and_then(|b| b.held)
    }

    fn holder_of(&self, object: EntityId) -> Option<EntityId> {
        self.bodies
            .iter()
            .find(|(_, b)| b.held == Some(object))
            .map(|(id, _)| *id)
    }

    fn is_moving(&self, id: EntityId) -> bool {
        self.bodies.get(&id).map_or(false, |b| b.moving)
    }

    fn is_performing_forced_movement(&self, id: EntityId) -> bool {
        self.bodies.get(&id).map_or(false, |b| b.forced)
    }

    fn overlap_sphere(&self, center: Vec3, radius: f32) -> Vec<EntityId> {
        let mut hits: Vec<EntityId> = self
            .characters()
            .filter(|(_, b)| b.position.distance(&center) <= radius + 0.5)
            .map(|(id, _)| *id)
            .collect();
        hits.sort_unstable();
        hits
    }

    fn box_cast(&self, origin: Vec3, direction: Vec3, range: f32, half_width: f32) -> Vec<EntityId> {
        let dir = direction.flat().normalize();
        let mut hits: Vec<(f32, EntityId)> = self
            .characters()
            .filter_map(|(id, b)| {
                let offset = (b.position - origin).flat();
                let along = offset.dot(&dir);
                let lateral = (offset - dir * along).magnitude();
                (along > 0.0 && along <= range + half_width && lateral <= half_width * 2.0)
                    .then_some((along, *id))
            })
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits.into_iter().map(|(_, id)| id).collect()
    }

    fn raycast_obstacle(&self, from: Vec3, to: Vec3) -> Option<Vec3> {
        let wall = self.wall_at_x?;
        if (from.x - wall) * (to.x - wall) > 0.0 || from.x == to.x {
            return None;
        }
        let t = (wall - from.x) / (to.x - from.x);
        Some(from + (to - from) * t)
    }

    fn pickup_in_front(&self, id: EntityId, range: f32) -> Option<EntityId> {
        let body = self.bodies.get(&id)?;
        self.bodies
            .iter()
            .filter(|(_, b)| b.life.is_none())
            .filter(|(_, b)| {
                let offset = b.position - body.position;
                offset.dot(&body.facing) > 0.0 && offset.magnitude() <= range
            })
            .min_by(|a, b| {
                a.1.position
                    .distance(&body.position)
                    .total_cmp(&b.1.position.distance(&body.position))
            })
            .map(|(id, _)| *id)
    }

    fn buffed_value(&self, id: EntityId, kind: BuffableValue) -> f32 {
        self.buffs.get(&(id, kind)).copied().unwrap_or_else(|| kind.unbuffed())
    }
}

impl World for TestWorld {
    fn receive_hp(&mut self, inflicter: EntityId, target: EntityId, amount: i32) {
        if let Some(body) = self.bodies.get_mut(&target) {
            body.hp += amount;
        }
        self.events.push(Event::Hp {
            inflicter,
            target,
            amount,
        });
    }

    fn revive(&mut self, _inflicter: EntityId, target: EntityId, hp: i32) {
        if let Some(body) = self.bodies.get_mut(&target) {
            body.life = Some(LifeState::Alive);
            body.hp = hp;
        }
        self.events.push(Event::Revive { target, hp });
    }

    fn look_at(&mut self, id: EntityId, point: Vec3) {
        if let Some(body) = self.bodies.get_mut(&id) {
            let dir = (point - body.position).flat().normalize();
            if dir != Vec3::ZERO {
                body.facing = dir;
            }
        }
    }

    fn set_target(&mut self, id: EntityId, target: Option<EntityId>) {
        if let Some(body) = self.bodies.get_mut(&id) {
            body.target = target;
        }
    }

    fn set_stealthy(&mut self, id: EntityId, stealthy: bool) {
        if let Some(body) = self.bodies.get_mut(&id) {
            body.stealthy = stealthy;
        }
    }

    fn follow(&mut self, id: EntityId, target: EntityId) {
        if let Some(body) = self.bodies.get_mut(&id) {
            body.moving = true;
        }
        self.events.push(Event::Follow { id, target });
    }

    fn cancel_move(&mut self, id: EntityId) {
        if let Some(body) = self.bodies.get_mut(&id) {
            body.moving = false;
        }
        self.events.push(Event::CancelMove(id));
    }

    fn teleport(&mut self, id: EntityId, position: Vec3) {
        if let Some(body) = self.bodies.get_mut(&id) {
            body.position = position;
        }
        self.events.push(Event::Teleport { id, position });
    }

    fn start_forward_charge(&mut self, id: EntityId, speed: f32, duration: f32) {
        if let Some(body) = self.bodies.get_mut(&id) {
            body.forced = true;
        }
        self.events.push(Event::ForwardCharge { id, speed, duration });
    }

    fn start_knockback(&mut self, id: EntityId, _from: Vec3, _speed: f32, _duration: f32) {
        self.events.push(Event::Knockback { id });
    }

    fn set_held_object(&mut self, id: EntityId, object: Option<EntityId>) {
        if let Some(body) = self.bodies.get_mut(&id) {
            body.held = object;
        }
    }

    fn spawn_projectile(&mut self, owner: EntityId, info: &ProjectileInfo, _origin: Vec3, _direction: Vec3) {
        self.events.push(Event::Projectile {
            owner,
            damage: info.damage,
        });
    }

    fn set_animation_trigger(&mut self, id: EntityId, trigger: &str) {
        self.events.push(Event::Trigger {
            id,
            name: trigger.to_string(),
        });
    }

    fn reset_animation_trigger(&mut self, id: EntityId, trigger: &str) {
        self.events.push(Event::ResetTrigger {
            id,
            name: trigger.to_string(),
        });
    }

    fn roll(&mut self) -> f32 {
        self.next_roll
    }

    fn client_play_action(&mut self, id: EntityId, data: &ActionRequestData) {
        self.events.push(Event::ClientPlay {
            id,
            action_id: data.action_id,
        });
    }

    fn client_cancel_all_actions(&mut self, id: EntityId) {
        self.events.push(Event::ClientCancelAll(id));
    }

    fn client_cancel_actions_by_id(&mut self, id: EntityId, action_id: ActionId) {
        self.events.push(Event::ClientCancelById { id, action_id });
    }

    fn client_stopped_charging_up(&mut self, id: EntityId, percent: f32) {
        self.events.push(Event::StoppedCharging { id, percent });
    }
}

/// A fresh instance of a default-catalog action.
pub fn make_action(data: ActionRequestData) -> Box<crate::action::Action> {
    let catalog = std::sync::Arc::new(crate::action::ActionCatalog::default());
    crate::action::ActionFactory::new(catalog)
        .create(data)
        .unwrap()
}

/// Stamps the start time and runs `on_start`, the way the server scheduler does.
pub fn start(world: &mut TestWorld, action: &mut crate::action::Action, character: EntityId, now: f32) -> bool {
    action.set_time_started(now);
    action.on_start(&mut world.ctx(character, now))
}
