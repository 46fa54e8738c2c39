//! The world surface actions run against.
//!
//! Actions never own characters; they look them up by [`EntityId`] through
//! these traits. The server implements [`World`] over its authoritative
//! entity store; the client implements [`WorldQuery`] over replicated
//! snapshots, which is all the cosmetic client half of an action may touch.

use crate::action::{ActionId, ActionRequestData, BuffableValue, ProjectileInfo};
use crate::math::Vec3;
use serde::{Deserialize, Serialize};

/// Half the side of the square arena, in meters.
pub const ARENA_HALF_EXTENT: f32 = 30.0;
/// Radius of a character's body.
pub const BODY_RADIUS: f32 = 0.5;

/// Where the segment from `from` to `to` first crosses an arena wall.
pub fn raycast_arena_walls(from: Vec3, to: Vec3) -> Option<Vec3> {
    let delta = to - from;
    let mut first: Option<f32> = None;
    for (start, step) in [(from.x, delta.x), (from.z, delta.z)] {
        if step == 0.0 {
            continue;
        }
        let wall = ARENA_HALF_EXTENT.copysign(step);
        let t = (wall - start) / step;
        if (0.0..=1.0).contains(&t) {
            first = Some(first.map_or(t, |f: f32| f.min(t)));
        }
    }
    // the hit lands on the wall, never past it
    first.map(|t| {
        let hit = from + delta * t;
        Vec3::new(
            hit.x.clamp(-ARENA_HALF_EXTENT, ARENA_HALF_EXTENT),
            hit.y,
            hit.z.clamp(-ARENA_HALF_EXTENT, ARENA_HALF_EXTENT),
        )
    })
}

/// Network-wide identifier of a spawned entity (character or object).
pub type EntityId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifeState {
    Alive,
    Fainted,
    Dead,
}

/// Read-only queries over the world.
pub trait WorldQuery {
    fn exists(&self, id: EntityId) -> bool;
    fn position(&self, id: EntityId) -> Option<Vec3>;
    fn facing(&self, id: EntityId) -> Option<Vec3>;
    fn life_state(&self, id: EntityId) -> Option<LifeState>;
    fn is_npc(&self, id: EntityId) -> bool;
    /// The character's currently locked target.
    fn target_of(&self, id: EntityId) -> Option<EntityId>;
    fn held_object(&self, id: EntityId) -> Option<EntityId>;
    /// Which character is carrying `object`, if any.
    fn holder_of(&self, object: EntityId) -> Option<EntityId>;
    fn is_moving(&self, id: EntityId) -> bool;
    fn is_performing_forced_movement(&self, id: EntityId) -> bool;

    /// Characters whose bodies overlap the sphere.
    fn overlap_sphere(&self, center: Vec3, radius: f32) -> Vec<EntityId>;

    /// Characters hit by a box swept from `origin` along `direction`,
    /// closest first.
    fn box_cast(&self, origin: Vec3, direction: Vec3, range: f32, half_width: f32)
        -> Vec<EntityId>;

    /// Where the segment from `from` to `to` first hits static geometry.
    fn raycast_obstacle(&self, from: Vec3, to: Vec3) -> Option<Vec3>;

    /// The closest carriable object within `range` in front of `id`.
    fn pickup_in_front(&self, id: EntityId, range: f32) -> Option<EntityId>;

    /// A buffable value as currently modified by `id`'s running actions.
    fn buffed_value(&self, _id: EntityId, kind: BuffableValue) -> f32 {
        kind.unbuffed()
    }

    /// Whether the character's animation is busy with something other than
    /// idling or locomotion.
    fn is_animating(&self, _id: EntityId) -> bool {
        false
    }

    fn is_alive(&self, id: EntityId) -> bool {
        self.life_state(id) == Some(LifeState::Alive)
    }

    /// A target is valid while it exists and is alive.
    fn is_valid_target(&self, id: EntityId) -> bool {
        self.exists(id) && self.is_alive(id)
    }

    /// Whether `other` is on the opposite side of `id`.
    fn is_foe(&self, id: EntityId, other: EntityId) -> bool {
        id != other && self.is_npc(id) != self.is_npc(other)
    }
}

/// Authoritative mutation of the world, available to server-side action hooks.
pub trait World: WorldQuery {
    /// Applies a hit point change; negative values are damage. The receiver's
    /// buffs scale the amount.
    fn receive_hp(&mut self, inflicter: EntityId, target: EntityId, amount: i32);
    fn revive(&mut self, inflicter: EntityId, target: EntityId, hp: i32);

    fn look_at(&mut self, id: EntityId, point: Vec3);
    fn set_target(&mut self, id: EntityId, target: Option<EntityId>);
    fn set_stealthy(&mut self, id: EntityId, stealthy: bool);

    fn follow(&mut self, id: EntityId, target: EntityId);
    fn cancel_move(&mut self, id: EntityId);
    fn teleport(&mut self, id: EntityId, position: Vec3);
    fn start_forward_charge(&mut self, id: EntityId, speed: f32, duration: f32);
    fn start_knockback(&mut self, id: EntityId, from: Vec3, speed: f32, duration: f32);

    fn set_held_object(&mut self, id: EntityId, object: Option<EntityId>);
    fn spawn_projectile(
        &mut self,
        owner: EntityId,
        info: &ProjectileInfo,
        origin: Vec3,
        direction: Vec3,
    );

    fn set_animation_trigger(&mut self, id: EntityId, trigger: &str);
    fn reset_animation_trigger(&mut self, id: EntityId, trigger: &str);

    /// Uniform roll in `[0, 1)`.
    fn roll(&mut self) -> f32;

    fn client_play_action(&mut self, id: EntityId, data: &ActionRequestData);
    fn client_cancel_all_actions(&mut self, id: EntityId);
    fn client_cancel_actions_by_id(&mut self, id: EntityId, action_id: ActionId);
    fn client_stopped_charging_up(&mut self, id: EntityId, percent: f32);
}
