use super::{fire_trigger, play_on_clients, reset_trigger, ActionBehavior};
use crate::action::util::{face_entity, percent_charged_up};
use crate::action::{ActionContext, ActionCore, ClientActionContext, GameplayActivity, ProjectileInfo};
use log::warn;

fn spawn_projectile(core: &ActionCore, ctx: &mut ActionContext<'_>, info: &ProjectileInfo) {
    let origin = ctx.world.position(ctx.character).unwrap_or_default();
    let direction = ctx
        .world
        .facing(ctx.character)
        .unwrap_or(crate::math::Vec3::FORWARD);
    ctx.world.spawn_projectile(ctx.character, info, origin, direction);
    log::debug!("{} launched by {}", core.config.name, ctx.character);
}

fn face_primary_target(core: &ActionCore, ctx: &mut ActionContext<'_>) {
    if let Some(target) = core.data.primary_target() {
        face_entity(&mut *ctx.world, ctx.character, target);
    }
}

/// Fires the first configured projectile at exec time.
#[derive(Debug, Default)]
pub struct LaunchProjectileAction {
    launched: bool,
}

impl LaunchProjectileAction {
    fn launch(&mut self, core: &ActionCore, ctx: &mut ActionContext<'_>) {
        if self.launched {
            return;
        }
        self.launched = true;
        match core.config.projectiles.first() {
            Some(info) => spawn_projectile(core, ctx, info),
            None => warn!("{} has no projectile configured", core.config.name),
        }
    }
}

impl ActionBehavior for LaunchProjectileAction {
    fn on_start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        face_primary_target(core, ctx);
        fire_trigger(ctx, &core.config.anim);
        play_on_clients(core, ctx);
        true
    }

    fn on_update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        if core.time_running(ctx.now) >= core.config.exec_time_seconds {
            self.launch(core, ctx);
        }
        true
    }

    fn end(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        // an action cut short by its duration still fires
        self.launch(core, ctx);
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        fire_trigger(ctx, &core.config.anim2);
    }
}

/// Charges while the button is held; the longer the charge, the stronger
/// the projectile tier fired on release. Taking a hit while charging
/// aborts the shot.
#[derive(Debug, Default)]
pub struct ChargedLaunchProjectileAction {
    stopped_charging_at: Option<f32>,
    hit_by_attack: bool,
    charge_ended_client: bool,
}

impl ChargedLaunchProjectileAction {
    fn percent_charged_up(&self, core: &ActionCore, now: f32) -> f32 {
        percent_charged_up(
            self.stopped_charging_at,
            core.time_running(now),
            core.time_started,
            core.config.exec_time_seconds,
        )
    }

    fn projectile_for_charge(&self, core: &ActionCore, now: f32) -> Option<ProjectileInfo> {
        let tiers = &core.config.projectiles;
        if tiers.is_empty() {
            return None;
        }
        let index = (self.percent_charged_up(core, now) * (tiers.len() - 1) as f32) as usize;
        tiers.get(index).cloned()
    }

    fn stop_charging_up(&mut self, core: &ActionCore, ctx: &mut ActionContext<'_>) {
        if self.stopped_charging_at.is_some() {
            return;
        }
        self.stopped_charging_at = Some(ctx.now);
        fire_trigger(ctx, &core.config.anim2);
        let percent = self.percent_charged_up(core, ctx.now);
        ctx.world.client_stopped_charging_up(ctx.character, percent);

        if !self.hit_by_attack {
            match self.projectile_for_charge(core, ctx.now) {
                Some(info) => spawn_projectile(core, ctx, &info),
                None => warn!("{} has no projectile configured", core.config.name),
            }
        }
    }

    fn shutdown_fx(core: &ActionCore, ctx: &mut ClientActionContext<'_>) {
        for fx in &core.config.spawns {
            ctx.stop_fx(fx);
        }
    }
}

impl ActionBehavior for ChargedLaunchProjectileAction {
    fn on_start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        face_primary_target(core, ctx);
        reset_trigger(ctx, &core.config.anim2);
        fire_trigger(ctx, &core.config.anim);
        play_on_clients(core, ctx);
        true
    }

    fn on_update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        if self.stopped_charging_at.is_none() && self.percent_charged_up(core, ctx.now) >= 1.0 {
            self.stop_charging_up(core, ctx);
        }
        // keeps going until explicitly released or cancelled
        self.stopped_charging_at.is_none()
    }

    fn end(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        self.stop_charging_up(core, ctx);
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        self.stop_charging_up(core, ctx);
    }

    fn on_gameplay_activity(
        &mut self,
        core: &mut ActionCore,
        ctx: &mut ActionContext<'_>,
        activity: GameplayActivity,
    ) {
        match activity {
            GameplayActivity::AttackedByEnemy => {
                self.hit_by_attack = true;
                self.stop_charging_up(core, ctx);
            }
            GameplayActivity::StoppedChargingUp => self.stop_charging_up(core, ctx),
            _ => {}
        }
    }

    fn on_start_client(&mut self, core: &mut ActionCore, ctx: &mut ClientActionContext<'_>) -> bool {
        let position = ctx.world.position(ctx.character).unwrap_or_default();
        for fx in &core.config.spawns {
            ctx.spawn_fx(fx, position);
        }
        true
    }

    fn on_update_client(&mut self, _core: &mut ActionCore, _ctx: &mut ClientActionContext<'_>) -> bool {
        !self.charge_ended_client
    }

    fn on_stopped_charging_up_client(
        &mut self,
        core: &mut ActionCore,
        ctx: &mut ClientActionContext<'_>,
        _percent: f32,
    ) {
        self.charge_ended_client = true;
        Self::shutdown_fx(core, ctx);
    }

    fn cancel_client(&mut self, core: &mut ActionCore, ctx: &mut ClientActionContext<'_>) {
        if !self.charge_ended_client {
            Self::shutdown_fx(core, ctx);
        }
    }
}
