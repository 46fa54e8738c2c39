use super::ActionBehavior;
use crate::action::util::face_entity;
use crate::action::{ActionContext, ActionCore, ActionLogic, ClientActionContext};
use crate::world::EntityId;

const RETICULE_FX: &str = "TargetReticule";

/// Locks the character onto a target for as long as the target stays valid.
///
/// Running a target action with no target is how a lock is cleared. Only one
/// target action runs per character; starting one cancels the others.
#[derive(Debug, Default)]
pub struct TargetAction {
    /// Client side: which entity the reticule is currently on.
    reticule_on: Option<EntityId>,
}

impl ActionBehavior for TargetAction {
    fn on_start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        // cleared even if this action does not run
        ctx.world.set_target(ctx.character, None);
        ctx.cancel_running_actions_by_logic(ActionLogic::Target, true);

        let Some(target) = core.data.primary_target() else {
            return false;
        };
        ctx.world.set_target(ctx.character, Some(target));
        face_entity(&mut *ctx.world, ctx.character, target);
        true
    }

    fn on_update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let Some(target) = core.data.primary_target() else {
            return false;
        };
        let valid = ctx.world.is_valid_target(target);
        if valid && ctx.running_action_count() == 1 && !ctx.world.is_moving(ctx.character) {
            // idle: swivel to keep facing the target
            face_entity(&mut *ctx.world, ctx.character, target);
        }
        valid
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        if ctx.world.target_of(ctx.character) == core.data.primary_target() {
            ctx.world.set_target(ctx.character, None);
        }
    }

    fn on_update_client(&mut self, _core: &mut ActionCore, ctx: &mut ClientActionContext<'_>) -> bool {
        let current = ctx.world.target_of(ctx.character);
        if current != self.reticule_on {
            if self.reticule_on.is_some() {
                ctx.stop_fx(RETICULE_FX);
            }
            if let Some(position) = current.and_then(|t| ctx.world.position(t)) {
                ctx.spawn_fx(RETICULE_FX, position);
            }
            self.reticule_on = current;
        }
        true
    }

    fn cancel_client(&mut self, _core: &mut ActionCore, ctx: &mut ClientActionContext<'_>) {
        if self.reticule_on.take().is_some() {
            ctx.stop_fx(RETICULE_FX);
        }
    }
}
