use super::{fire_trigger, play_on_clients, reset_trigger, ActionBehavior};
use crate::action::util::face_entity;
use crate::action::{
    ActionCatalog, ActionContext, ActionCore, ActionRequestData, BuffableValue, ClientActionContext,
};
use crate::world::EntityId;
use log::debug;

/// Anyone this close when the charge begins gets hit immediately.
const PHYSICAL_TOUCH_DISTANCE: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Stage {
    #[default]
    Windup,
    Charging,
    Complete,
}

/// Winds up, then charges forward, hitting and knocking back everyone it
/// runs into. The first victim takes full damage, later ones splash damage.
/// A victim whose buffs grant a chance to stun tramplers may stop the charge
/// cold, which chains the trampler into a stun.
#[derive(Debug, Default)]
pub struct TrampleAction {
    previous_stage: Stage,
    collided_already: Vec<EntityId>,
    was_stunned: bool,
}

impl TrampleAction {
    fn current_stage(core: &ActionCore, now: f32) -> Stage {
        let so_far = core.time_running(now);
        if so_far < core.config.exec_time_seconds {
            Stage::Windup
        } else if so_far < core.config.duration_seconds {
            Stage::Charging
        } else {
            Stage::Complete
        }
    }

    fn collide_with_victim(&mut self, core: &ActionCore, ctx: &mut ActionContext<'_>, victim: EntityId) {
        if victim == ctx.character || self.was_stunned {
            return;
        }
        if ctx.world.life_state(victim).is_none() || self.collided_already.contains(&victim) {
            return;
        }
        self.collided_already.push(victim);

        let chance_to_stun = ctx
            .world
            .buffed_value(victim, BuffableValue::ChanceToStunTramplers);
        if chance_to_stun > 0.0 && ctx.world.roll() < chance_to_stun {
            self.stun_self(ctx);
            return;
        }

        let damage = if self.collided_already.len() == 1 {
            core.config.amount
        } else {
            core.config.splash_damage
        };
        ctx.world.receive_hp(ctx.character, victim, -(damage as i32));

        let origin = ctx.world.position(ctx.character).unwrap_or_default();
        ctx.world.start_knockback(
            victim,
            origin,
            core.config.knockback_speed,
            core.config.knockback_duration,
        );
    }

    fn collide_with_nearby_foes(&mut self, core: &ActionCore, ctx: &mut ActionContext<'_>) {
        let origin = ctx.world.position(ctx.character).unwrap_or_default();
        for victim in ctx.world.overlap_sphere(origin, PHYSICAL_TOUCH_DISTANCE) {
            if ctx.world.is_foe(ctx.character, victim) {
                self.collide_with_victim(core, ctx, victim);
            }
        }
    }

    fn stun_self(&mut self, ctx: &mut ActionContext<'_>) {
        if !self.was_stunned {
            debug!("Trample by {} was stopped by a stun", ctx.character);
            ctx.world.cancel_move(ctx.character);
            ctx.world.client_cancel_all_actions(ctx.character);
        }
        self.was_stunned = true;
    }
}

impl ActionBehavior for TrampleAction {
    fn reset(&mut self) {
        self.previous_stage = Stage::Windup;
        self.collided_already.clear();
        self.was_stunned = false;
    }

    fn on_start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        self.previous_stage = Stage::Windup;
        if let Some(target) = core.data.primary_target() {
            face_entity(&mut *ctx.world, ctx.character, target);
        }

        // a previous run may have been cut short by a stun before it fired
        reset_trigger(ctx, &core.config.anim2);
        fire_trigger(ctx, &core.config.anim);
        play_on_clients(core, ctx);
        true
    }

    fn on_update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let stage = Self::current_stage(core, ctx.now);
        if stage != self.previous_stage && stage == Stage::Charging {
            self.collide_with_nearby_foes(core, ctx);
            ctx.world.start_forward_charge(
                ctx.character,
                core.config.move_speed,
                core.config.duration_seconds - core.config.exec_time_seconds,
            );
        }
        self.previous_stage = stage;
        stage != Stage::Complete && !self.was_stunned
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        fire_trigger(ctx, &core.config.anim2);
    }

    fn chain_into_new_action(&self, _core: &ActionCore, catalog: &ActionCatalog) -> Option<ActionRequestData> {
        self.was_stunned
            .then(|| ActionRequestData::new(catalog.stun_id))
    }

    fn collision_entered(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>, other: EntityId) {
        // victims are only picked up while charging
        if Self::current_stage(core, ctx.now) == Stage::Charging {
            self.collide_with_victim(core, ctx, other);
        }
    }

    fn on_start_client(&mut self, core: &mut ActionCore, ctx: &mut ClientActionContext<'_>) -> bool {
        let position = ctx.world.position(ctx.character).unwrap_or_default();
        for fx in &core.config.spawns {
            ctx.spawn_fx(fx, position);
        }
        true
    }

    fn cancel_client(&mut self, core: &mut ActionCore, ctx: &mut ClientActionContext<'_>) {
        for fx in &core.config.spawns {
            ctx.stop_fx(fx);
        }
    }
}
