use super::{fire_trigger, play_on_clients, reset_trigger, ActionBehavior};
use crate::action::util::{face_entity, percent_charged_up};
use crate::action::{
    ActionContext, ActionCore, BuffableValue, ClientActionContext, GameplayActivity,
};

/// A shield that grows stronger the longer it charges.
///
/// Damage reduction starts at 50% and climbs to 100% at full charge. Once
/// released, the shield lasts `effect_duration_seconds` and stops blocking
/// the queue. A fully charged shield stuns anyone who tramples into it.
#[derive(Debug, Default)]
pub struct ChargedShieldAction {
    stopped_charging_at: Option<f32>,
    /// Client side: when the server reported the release.
    client_stopped_at: Option<f32>,
}

impl ChargedShieldAction {
    fn percent_charged_up(&self, core: &ActionCore, now: f32) -> f32 {
        percent_charged_up(
            self.stopped_charging_at,
            core.time_running(now),
            core.time_started,
            core.config.exec_time_seconds,
        )
    }

    fn stop_charging_up(&mut self, core: &ActionCore, ctx: &mut ActionContext<'_>) {
        if self.stopped_charging_at.is_some() {
            return;
        }
        self.stopped_charging_at = Some(ctx.now);
        fire_trigger(ctx, &core.config.anim2);
        let percent = self.percent_charged_up(core, ctx.now);
        ctx.world.client_stopped_charging_up(ctx.character, percent);
    }

    fn charge_fx(core: &ActionCore) -> Option<&String> {
        core.config.spawns.first()
    }

    fn shield_fx(core: &ActionCore) -> Option<&String> {
        core.config.spawns.get(1)
    }
}

impl ActionBehavior for ChargedShieldAction {
    fn on_start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        if let Some(target) = core.data.primary_target() {
            face_entity(&mut *ctx.world, ctx.character, target);
        }
        reset_trigger(ctx, &core.config.anim2);
        fire_trigger(ctx, &core.config.anim);
        play_on_clients(core, ctx);
        true
    }

    fn on_update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        // reaching full charge releases implicitly
        if self.stopped_charging_at.is_none() && core.time_running(ctx.now) >= core.config.exec_time_seconds {
            self.stop_charging_up(core, ctx);
        }
        match self.stopped_charging_at {
            None => true,
            Some(stopped) => ctx.now < stopped + core.config.effect_duration_seconds,
        }
    }

    fn should_become_non_blocking(&self, _core: &ActionCore, _now: f32) -> bool {
        self.stopped_charging_at.is_some()
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        self.stop_charging_up(core, ctx);
    }

    fn buff_value(&self, core: &ActionCore, kind: BuffableValue, value: &mut f32, now: f32) {
        let percent = self.percent_charged_up(core, now);
        match kind {
            BuffableValue::PercentDamageReceived => {
                let reduction = 0.5 + (percent * percent) / 2.0;
                *value *= 1.0 - reduction;
            }
            BuffableValue::ChanceToStunTramplers if percent >= 1.0 => *value = 1.0,
            _ => {}
        }
    }

    fn on_gameplay_activity(
        &mut self,
        core: &mut ActionCore,
        ctx: &mut ActionContext<'_>,
        activity: GameplayActivity,
    ) {
        if matches!(
            activity,
            GameplayActivity::AttackedByEnemy | GameplayActivity::StoppedChargingUp
        ) {
            self.stop_charging_up(core, ctx);
        }
    }

    fn on_start_client(&mut self, core: &mut ActionCore, ctx: &mut ClientActionContext<'_>) -> bool {
        if let Some(fx) = Self::charge_fx(core) {
            let position = ctx.world.position(ctx.character).unwrap_or_default();
            ctx.spawn_fx(fx, position);
        }
        true
    }

    fn on_update_client(&mut self, core: &mut ActionCore, ctx: &mut ClientActionContext<'_>) -> bool {
        match self.client_stopped_at {
            None => true,
            Some(stopped) => ctx.now < stopped + core.config.effect_duration_seconds,
        }
    }

    fn on_stopped_charging_up_client(
        &mut self,
        core: &mut ActionCore,
        ctx: &mut ClientActionContext<'_>,
        percent: f32,
    ) {
        self.client_stopped_at = Some(ctx.now);
        if let Some(fx) = Self::charge_fx(core) {
            ctx.stop_fx(fx);
        }
        if percent >= 1.0 {
            if let Some(fx) = Self::shield_fx(core) {
                let position = ctx.world.position(ctx.character).unwrap_or_default();
                ctx.spawn_fx(fx, position);
            }
        }
    }

    fn cancel_client(&mut self, core: &mut ActionCore, ctx: &mut ClientActionContext<'_>) {
        for fx in Self::charge_fx(core).into_iter().chain(Self::shield_fx(core)) {
            ctx.stop_fx(fx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_world::{make_action, start, Event, TestWorld};
    use crate::action::{ActionRequestData, BuffableValue, ClientActionContext, GameplayActivity, VisualCue, TANK_SHIELD};
    use crate::math::Vec3;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_damage_reduction_grows_with_charge() {
        let mut world = TestWorld::new();
        let tank = world.spawn_player(Vec3::ZERO);
        let mut action = make_action(ActionRequestData::new(TANK_SHIELD));
        start(&mut world, &mut action, tank, 0.0);

        let mut at_start = 1.0;
        action.buff_value(BuffableValue::PercentDamageReceived, &mut at_start, 0.0);
        assert_approx_eq!(at_start, 0.5, 1e-5);

        let mut half = 1.0;
        action.buff_value(BuffableValue::PercentDamageReceived, &mut half, 1.0);
        assert_approx_eq!(half, 0.375, 1e-5);

        let mut stun = 0.0;
        action.buff_value(BuffableValue::ChanceToStunTramplers, &mut stun, 1.0);
        assert_eq!(stun, 0.0);
    }

    #[test]
    fn test_full_charge_blocks_all_damage_then_expires() {
        let mut world = TestWorld::new();
        let tank = world.spawn_player(Vec3::ZERO);
        let mut action = make_action(ActionRequestData::new(TANK_SHIELD));
        start(&mut world, &mut action, tank, 0.0);

        assert!(!action.should_become_non_blocking(1.0));
        assert!(action.on_update(&mut world.ctx(tank, 2.0)));
        assert!(action.should_become_non_blocking(2.0));
        assert!(world.has(&Event::StoppedCharging { id: tank, percent: 1.0 }));

        let mut damage = 1.0;
        action.buff_value(BuffableValue::PercentDamageReceived, &mut damage, 3.0);
        assert_approx_eq!(damage, 0.0, 1e-5);
        let mut stun = 0.0;
        action.buff_value(BuffableValue::ChanceToStunTramplers, &mut stun, 3.0);
        assert_eq!(stun, 1.0);

        assert!(action.on_update(&mut world.ctx(tank, 3.9)));
        assert!(!action.on_update(&mut world.ctx(tank, 4.0)));
    }

    #[test]
    fn test_hit_releases_early_and_freezes_charge() {
        let mut world = TestWorld::new();
        let tank = world.spawn_player(Vec3::ZERO);
        let mut action = make_action(ActionRequestData::new(TANK_SHIELD));
        start(&mut world, &mut action, tank, 0.0);

        action.on_gameplay_activity(&mut world.ctx(tank, 1.0), GameplayActivity::AttackedByEnemy);
        action.on_gameplay_activity(&mut world.ctx(tank, 1.5), GameplayActivity::StoppedChargingUp);

        let mut damage = 1.0;
        action.buff_value(BuffableValue::PercentDamageReceived, &mut damage, 2.5);
        assert_approx_eq!(damage, 0.375, 1e-5);
        let releases = world
            .events
            .iter()
            .filter(|e| matches!(e, Event::StoppedCharging { .. }))
            .count();
        assert_eq!(releases, 1);
    }

    #[test]
    fn test_client_swaps_charge_fx_for_shield_at_full_charge() {
        let mut world = TestWorld::new();
        let tank = world.spawn_player(Vec3::ZERO);
        let mut action = make_action(ActionRequestData::new(TANK_SHIELD));
        let mut cues = Vec::new();

        let mut ctx = ClientActionContext { world: &world, character: tank, now: 0.0, cues: &mut cues };
        action.on_start_client(&mut ctx);
        ctx.now = 2.0;
        action.on_stopped_charging_up_client(&mut ctx, 1.0);
        ctx.now = 3.0;
        assert!(action.on_update_client(&mut ctx));
        ctx.now = 4.1;
        assert!(!action.on_update_client(&mut ctx));

        assert!(cues.contains(&VisualCue::StopFx { character: tank, name: "ShieldChargeFx".to_string() }));
        assert!(cues.iter().any(|c| matches!(c, VisualCue::SpawnFx { name, .. } if name == "ShieldFullFx")));
    }
}
