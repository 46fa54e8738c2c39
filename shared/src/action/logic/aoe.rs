use super::{fire_trigger, play_on_clients, ActionBehavior};
use crate::action::{ActionContext, ActionCore, ClientActionContext};
use log::debug;

/// How far past its range a ground-targeted area may be placed before the
/// request is treated as bogus.
const MAX_DISTANCE_DIVERGENCE: f32 = 1.0;

/// Damages every foe inside a circle centered on the requested position.
///
/// Victims are decided at exec time, so the request is broadcast with an
/// empty target list and clients never learn them in advance.
#[derive(Debug, Default)]
pub struct AoeAction {
    did_aoe: bool,
}

impl AoeAction {
    fn perform_aoe(core: &ActionCore, ctx: &mut ActionContext<'_>) {
        let victims = ctx.world.overlap_sphere(core.data.position, core.config.radius);
        for victim in victims {
            if ctx.world.is_foe(ctx.character, victim) {
                ctx.world
                    .receive_hp(ctx.character, victim, -(core.config.amount as i32));
            }
        }
    }
}

impl ActionBehavior for AoeAction {
    fn on_start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let origin = ctx.world.position(ctx.character).unwrap_or_default();
        let distance = origin.distance(&core.data.position);
        if distance > core.config.range + MAX_DISTANCE_DIVERGENCE {
            debug!(
                "{} requested {:.1} away from {}, beyond its range",
                core.config.name, distance, ctx.character
            );
            return false;
        }

        core.data.target_ids = Some(Vec::new());
        fire_trigger(ctx, &core.config.anim);
        play_on_clients(core, ctx);
        true
    }

    fn on_update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        if !self.did_aoe && core.time_running(ctx.now) >= core.config.exec_time_seconds {
            self.did_aoe = true;
            Self::perform_aoe(core, ctx);
        }
        true
    }

    fn on_start_client(&mut self, core: &mut ActionCore, ctx: &mut ClientActionContext<'_>) -> bool {
        if let Some(fx) = core.config.spawns.first() {
            ctx.spawn_fx(fx, core.data.position);
        }
        false
    }
}
