use super::{fire_trigger, play_on_clients, ActionBehavior};
use crate::action::{ActionContext, ActionCore, ClientActionContext, GameplayActivity};

/// Hides the character after a short windup. Stealth ends when the action
/// runs out, when the character attacks, or when it is hit.
#[derive(Debug, Default)]
pub struct StealthModeAction {
    started: bool,
    ended: bool,
    fx_spawned: bool,
}

impl StealthModeAction {
    fn end_stealth(&mut self, core: &ActionCore, ctx: &mut ActionContext<'_>) {
        if self.ended {
            return;
        }
        self.ended = true;
        if self.started {
            ctx.world.set_stealthy(ctx.character, false);
        }
        // Cancelling client visuals by id here rather than in `cancel` keeps a
        // freshly started stealth alive when the button is pressed twice.
        ctx.world
            .client_cancel_actions_by_id(ctx.character, core.action_id());
    }
}

impl ActionBehavior for StealthModeAction {
    fn on_start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        fire_trigger(ctx, &core.config.anim);
        play_on_clients(core, ctx);
        true
    }

    fn on_update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        if !self.started && !self.ended && core.time_running(ctx.now) >= core.config.exec_time_seconds {
            self.started = true;
            ctx.world.set_stealthy(ctx.character, true);
        }
        !self.ended
    }

    fn should_become_non_blocking(&self, core: &ActionCore, now: f32) -> bool {
        core.time_running(now) >= core.config.exec_time_seconds
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        fire_trigger(ctx, &core.config.anim2);
        self.end_stealth(core, ctx);
    }

    fn on_gameplay_activity(
        &mut self,
        core: &mut ActionCore,
        ctx: &mut ActionContext<'_>,
        activity: GameplayActivity,
    ) {
        if matches!(
            activity,
            GameplayActivity::UsingAttackAction | GameplayActivity::AttackedByEnemy
        ) {
            self.end_stealth(core, ctx);
        }
    }

    fn on_update_client(&mut self, core: &mut ActionCore, ctx: &mut ClientActionContext<'_>) -> bool {
        if !self.fx_spawned && core.time_running(ctx.now) >= core.config.exec_time_seconds {
            self.fx_spawned = true;
            let position = ctx.world.position(ctx.character).unwrap_or_default();
            for fx in &core.config.spawns {
                ctx.spawn_fx(fx, position);
            }
        }
        true
    }

    fn cancel_client(&mut self, core: &mut ActionCore, ctx: &mut ClientActionContext<'_>) {
        if self.fx_spawned {
            for fx in &core.config.spawns {
                ctx.stop_fx(fx);
            }
        }
    }
}
