use super::{fire_trigger, play_on_clients, ActionBehavior};
use crate::action::{ActionContext, ActionCore};
use crate::math::Vec3;

const FAILED_PICKUP_TRIGGER: &str = "PickUpFailed";

/// Picks up the carriable object directly in front of the character.
#[derive(Debug, Default)]
pub struct PickUpAction;

impl ActionBehavior for PickUpAction {
    fn on_start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let object = ctx
            .world
            .pickup_in_front(ctx.character, core.config.range)
            .filter(|&object| ctx.world.holder_of(object).is_none());

        let Some(object) = object else {
            ctx.world
                .set_animation_trigger(ctx.character, FAILED_PICKUP_TRIGGER);
            return false;
        };

        ctx.world.set_held_object(ctx.character, Some(object));
        core.data.target_ids = Some(vec![object]);
        ctx.world.set_target(ctx.character, None);

        if core.data.direction != Vec3::ZERO {
            if let Some(pos) = ctx.world.position(ctx.character) {
                ctx.world.look_at(ctx.character, pos + core.data.direction);
            }
        }

        fire_trigger(ctx, &core.config.anim);
        play_on_clients(core, ctx);
        true
    }

    fn on_update(&mut self, _core: &mut ActionCore, _ctx: &mut ActionContext<'_>) -> bool {
        true
    }
}

/// Puts down whatever the character is carrying once exec time has passed.
#[derive(Debug, Default)]
pub struct DropAction;

impl ActionBehavior for DropAction {
    fn on_start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        if ctx.world.held_object(ctx.character).is_none() {
            return false;
        }
        core.data.target_ids = None;
        fire_trigger(ctx, &core.config.anim);
        play_on_clients(core, ctx);
        true
    }

    fn on_update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        if core.time_running(ctx.now) > core.config.exec_time_seconds {
            ctx.world.set_held_object(ctx.character, None);
            return false;
        }
        true
    }
}
