use super::{fire_trigger, play_on_clients, ActionBehavior};
use crate::action::util::{dash_destination, hits_player_characters, ideal_melee_foe};
use crate::action::{ActionContext, ActionCore, BuffableValue};
use crate::math::Vec3;

/// Pretends to dash for the action's duration, then teleports to the
/// destination and swings.
///
/// The swing uses `radius` as its reach, not `range`; `range` bounds the
/// dash itself. The character takes no damage while dashing.
#[derive(Debug, Default)]
pub struct DashAttackAction {
    target_spot: Vec3,
    dashed: bool,
}

impl ActionBehavior for DashAttackAction {
    fn on_start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let range = core.config.range;
        self.target_spot = dash_destination(
            &*ctx.world,
            ctx.character,
            core.data.position,
            true,
            Some(range),
            Some(range),
        );

        ctx.world.look_at(ctx.character, self.target_spot);
        fire_trigger(ctx, &core.config.anim);
        play_on_clients(core, ctx);
        true
    }

    fn on_update(&mut self, _core: &mut ActionCore, _ctx: &mut ActionContext<'_>) -> bool {
        true
    }

    fn end(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        fire_trigger(ctx, &core.config.anim2);

        ctx.world.teleport(ctx.character, self.target_spot);
        self.dashed = true;

        let side = hits_player_characters(&*ctx.world, ctx.character, core.config.is_friendly);
        let foe = ideal_melee_foe(
            &*ctx.world,
            ctx.character,
            core.config.radius,
            side,
            core.data.primary_target(),
        );
        if let Some(foe) = foe {
            ctx.world
                .receive_hp(ctx.character, foe, -(core.config.amount as i32));
        }
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        fire_trigger(ctx, &core.config.other_animator_variable);
        // the client moves the character's visuals itself while dashing
        ctx.world
            .client_cancel_actions_by_id(ctx.character, core.action_id());
    }

    fn buff_value(&self, _core: &ActionCore, kind: BuffableValue, value: &mut f32, _now: f32) {
        if kind == BuffableValue::PercentDamageReceived && !self.dashed {
            *value = 0.0;
        }
    }
}
