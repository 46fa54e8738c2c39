//! Scripted player input.
//!
//! There is no window to read keys from, so the local character fights on
//! its own: it picks the nearest foe and works through an ability rotation,
//! one request per interval. Charged abilities are released after a fixed
//! hold.

use crate::game::ClientWorld;
use shared::action::{ARCHER_CHARGED_SHOT, ARCHER_BASE_ATTACK, TANK_BASE_ATTACK};
use shared::{ActionCatalog, ActionId, ActionRequestData, EntityId, Vec3, WorldQuery};

/// Seconds between two requests.
pub const DEFAULT_INPUT_INTERVAL: f32 = 0.75;
/// Seconds a charged ability is held before release.
pub const CHARGE_HOLD_SECONDS: f32 = 0.6;

/// Something the local player asked for this frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InputCommand {
    Action(ActionRequestData),
    Move(Vec3),
    StopChargingUp,
}

pub struct InputManager {
    rotation: Vec<ActionId>,
    next: usize,
    interval: f32,
    last_command_at: Option<f32>,
    charge_release_at: Option<f32>,
}

impl InputManager {
    pub fn new(rotation: Vec<ActionId>, interval: f32) -> Self {
        Self {
            rotation,
            next: 0,
            interval,
            last_command_at: None,
            charge_release_at: None,
        }
    }

    pub fn is_charging(&self) -> bool {
        self.charge_release_at.is_some()
    }

    /// Produces the commands due at `now` for `local`.
    pub fn update(
        &mut self,
        now: f32,
        world: &ClientWorld,
        catalog: &ActionCatalog,
        local: EntityId,
    ) -> Vec<InputCommand> {
        let mut commands = Vec::new();

        if let Some(release_at) = self.charge_release_at {
            if now >= release_at {
                self.charge_release_at = None;
                commands.push(InputCommand::StopChargingUp);
            }
            return commands;
        }

        if !world.is_alive(local) || self.rotation.is_empty() {
            return commands;
        }
        if let Some(last) = self.last_command_at {
            if now - last < self.interval {
                return commands;
            }
        }

        let Some(foe) = world.nearest_foe(local) else {
            // Nobody to fight: drift back to the middle of the arena.
            if let Some(position) = world.position(local) {
                if position.flat().magnitude() > 1.0 {
                    self.last_command_at = Some(now);
                    commands.push(InputCommand::Move(Vec3::ZERO));
                }
            }
            return commands;
        };

        let action_id = self.rotation[self.next];
        self.next = (self.next + 1) % self.rotation.len();
        self.last_command_at = Some(now);

        let mut data = ActionRequestData::new(action_id).with_targets(vec![foe]);
        if let (Some(ours), Some(theirs)) = (world.position(local), world.position(foe)) {
            data = data.with_direction((theirs - ours).flat().normalize());
            let in_range = catalog
                .get(action_id)
                .map_or(true, |config| ours.distance(&theirs) <= config.range);
            if !in_range {
                data = data.closing();
            }
        }

        if action_id == ARCHER_CHARGED_SHOT {
            self.charge_release_at = Some(now + CHARGE_HOLD_SECONDS);
        }
        commands.push(InputCommand::Action(data));
        commands
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new(
            vec![TANK_BASE_ATTACK, ARCHER_BASE_ATTACK, ARCHER_CHARGED_SHOT],
            DEFAULT_INPUT_INTERVAL,
        )
    }
}
