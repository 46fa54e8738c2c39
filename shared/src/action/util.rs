//! Geometry and targeting helpers used by several action kinds.

use crate::math::Vec3;
use crate::world::{EntityId, World, WorldQuery};

/// Half-width of a character's body, used for melee sweeps.
pub const BODY_HALF_WIDTH: f32 = 0.5;

/// A dash whose requested spot is closer than this uses facing instead.
const DASH_VERY_CLOSE_DISTANCE: f32 = 4.0;

/// Whether an attack from `character` with the given friendliness lands on
/// player characters (as opposed to NPCs).
pub fn hits_player_characters<W: WorldQuery + ?Sized>(world: &W, character: EntityId, is_friendly: bool) -> bool {
    is_friendly ^ world.is_npc(character)
}

/// Living characters on the requested side inside a forward melee sweep,
/// closest first.
pub fn detect_melee_foes<W: WorldQuery + ?Sized>(
    world: &W,
    character: EntityId,
    range: f32,
    hit_player_characters: bool,
) -> Vec<EntityId> {
    let (Some(origin), Some(facing)) = (world.position(character), world.facing(character)) else {
        return Vec::new();
    };
    world
        .box_cast(origin, facing, range, BODY_HALF_WIDTH)
        .into_iter()
        .filter(|&id| id != character && world.is_npc(id) != hit_player_characters)
        .collect()
}

/// Picks the foe a melee swing should land on: `preferred` if the sweep
/// reaches it, otherwise the closest damageable hit.
pub fn ideal_melee_foe<W: WorldQuery + ?Sized>(
    world: &W,
    character: EntityId,
    range: f32,
    hit_player_characters: bool,
    preferred: Option<EntityId>,
) -> Option<EntityId> {
    let mut found = None;
    for id in detect_melee_foes(world, character, range, hit_player_characters) {
        if world.is_alive(id) && (Some(id) == preferred || found.is_none()) {
            found = Some(id);
        }
    }
    found
}

/// Where a dash toward `target_spot` actually ends.
///
/// With `very_close_distance` set, a spot that is unset or within a few
/// meters is replaced by a point that far along the character's facing.
/// The result is clamped to `max_distance`, optionally stopped at the first
/// obstacle, and kept at the character's height.
pub fn dash_destination<W: WorldQuery + ?Sized>(
    world: &W,
    character: EntityId,
    target_spot: Vec3,
    stop_at_obstacles: bool,
    very_close_distance: Option<f32>,
    max_distance: Option<f32>,
) -> Vec3 {
    let origin = world.position(character).unwrap_or_default();
    let facing = world.facing(character).unwrap_or(Vec3::FORWARD);
    let mut destination = target_spot;

    if let Some(close) = very_close_distance {
        if destination == Vec3::ZERO || origin.distance(&destination) <= DASH_VERY_CLOSE_DISTANCE {
            destination = origin + facing * close;
        }
    }

    if let Some(max) = max_distance {
        let distance = origin.distance(&destination);
        if distance > max {
            destination = destination.move_towards(&origin, distance - max);
        }
    }

    if stop_at_obstacles {
        if let Some(hit) = world.raycast_obstacle(origin, destination) {
            destination = hit;
        }
    }

    destination.y = origin.y;
    destination
}

/// Fraction of the charge-up completed, in `[0, 1]`.
///
/// Once charging has stopped, the fraction is frozen at the stop time.
pub fn percent_charged_up(
    stopped_charging_time: Option<f32>,
    time_running: f32,
    time_started: f32,
    exec_time: f32,
) -> f32 {
    let charging_for = match stopped_charging_time {
        Some(stopped) => stopped - time_started,
        None => time_running,
    };
    if exec_time <= 0.0 {
        return 1.0;
    }
    (charging_for / exec_time).clamp(0.0, 1.0)
}

/// Turns `character` to face `target` on the ground plane.
pub fn face_entity(world: &mut dyn World, character: EntityId, target: EntityId) {
    let (Some(ours), Some(theirs)) = (world.position(character), world.position(target)) else {
        return;
    };
    let mut point = theirs;
    point.y = ours.y;
    if point != ours {
        world.look_at(character, point);
    }
}
