use super::{fire_trigger, ActionBehavior};
use crate::action::{ActionContext, ActionCore};

/// Plays an animation and is immediately done.
#[derive(Debug, Default)]
pub struct EmoteAction;

impl ActionBehavior for EmoteAction {
    fn on_start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        fire_trigger(ctx, &core.config.anim);
        false
    }

    fn on_update(&mut self, _core: &mut ActionCore, _ctx: &mut ActionContext<'_>) -> bool {
        false
    }
}
