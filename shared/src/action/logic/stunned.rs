use super::{fire_trigger, ActionBehavior};
use crate::action::{ActionContext, ActionCore, BuffableValue};

/// Helpless for the action's duration; damage taken is multiplied by `amount`.
#[derive(Debug, Default)]
pub struct StunnedAction;

impl ActionBehavior for StunnedAction {
    fn on_start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        fire_trigger(ctx, &core.config.anim);
        true
    }

    fn on_update(&mut self, _core: &mut ActionCore, _ctx: &mut ActionContext<'_>) -> bool {
        true
    }

    fn buff_value(&self, core: &ActionCore, kind: BuffableValue, value: &mut f32, _now: f32) {
        if kind == BuffableValue::PercentDamageReceived {
            *value *= core.config.amount;
        }
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        fire_trigger(ctx, &core.config.anim2);
    }
}
