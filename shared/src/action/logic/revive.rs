use super::{fire_trigger, ActionBehavior};
use crate::action::{ActionContext, ActionCore};
use crate::world::{EntityId, LifeState};
use log::debug;

/// Brings a fainted ally back at exec time.
#[derive(Debug, Default)]
pub struct ReviveAction {
    exec_fired: bool,
    target: Option<EntityId>,
}

impl ActionBehavior for ReviveAction {
    fn on_start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let target = core.data.primary_target().filter(|&t| ctx.world.exists(t));
        let Some(target) = target else {
            debug!("Revive by {} has no target", ctx.character);
            return false;
        };
        self.target = Some(target);
        fire_trigger(ctx, &core.config.anim);
        true
    }

    fn on_update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        if !self.exec_fired && core.time_running(ctx.now) >= core.config.exec_time_seconds {
            self.exec_fired = true;
            let Some(target) = self.target else {
                return false;
            };
            if ctx.world.life_state(target) == Some(LifeState::Fainted) {
                debug_assert!(core.config.is_friendly, "revive actions must be friendly");
                ctx.world
                    .revive(ctx.character, target, core.config.amount as i32);
            } else {
                // nobody to revive any more
                self.cancel(core, ctx);
                return false;
            }
        }
        true
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        fire_trigger(ctx, &core.config.anim2);
    }
}
