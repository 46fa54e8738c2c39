//! Concrete action behaviors, one module per logic kind.
//!
//! Each behavior is a plain state struct implementing [`ActionBehavior`];
//! [`Behavior`] closes over all of them so an [`Action`](super::Action) can
//! dispatch without trait objects.

mod aoe;
mod chase;
mod dash;
mod emote;
mod melee;
mod pickup;
mod projectile;
mod revive;
mod shield;
mod stealth;
mod stunned;
mod target;
mod trample;

#[cfg(test)]
pub(crate) mod test_world;

use super::{
    ActionCatalog, ActionContext, ActionCore, ActionLogic, ActionRequestData, BlockingMode,
    BuffableValue, ClientActionContext, GameplayActivity,
};
use crate::world::EntityId;

pub use aoe::AoeAction;
pub use chase::ChaseAction;
pub use dash::DashAttackAction;
pub use emote::EmoteAction;
pub use melee::MeleeAction;
pub use pickup::{DropAction, PickUpAction};
pub use projectile::{ChargedLaunchProjectileAction, LaunchProjectileAction};
pub use revive::ReviveAction;
pub use shield::ChargedShieldAction;
pub use stealth::StealthModeAction;
pub use stunned::StunnedAction;
pub use target::TargetAction;
pub use trample::TrampleAction;

/// The hooks every action kind may override. Only `on_start` and
/// `on_update` are mandatory.
pub trait ActionBehavior: Default {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn on_start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool;

    fn on_update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool;

    fn should_become_non_blocking(&self, core: &ActionCore, now: f32) -> bool {
        core.config.blocking_mode == BlockingMode::OnlyDuringExecTime
            && core.time_running(now) >= core.config.exec_time_seconds
    }

    fn end(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        self.cancel(core, ctx);
    }

    fn cancel(&mut self, _core: &mut ActionCore, _ctx: &mut ActionContext<'_>) {}

    fn chain_into_new_action(
        &self,
        _core: &ActionCore,
        _catalog: &ActionCatalog,
    ) -> Option<ActionRequestData> {
        None
    }

    fn collision_entered(
        &mut self,
        _core: &mut ActionCore,
        _ctx: &mut ActionContext<'_>,
        _other: EntityId,
    ) {
    }

    fn buff_value(&self, _core: &ActionCore, _kind: BuffableValue, _value: &mut f32, _now: f32) {}

    fn on_gameplay_activity(
        &mut self,
        _core: &mut ActionCore,
        _ctx: &mut ActionContext<'_>,
        _activity: GameplayActivity,
    ) {
    }

    fn on_start_client(&mut self, _core: &mut ActionCore, _ctx: &mut ClientActionContext<'_>) -> bool {
        true
    }

    fn on_update_client(&mut self, _core: &mut ActionCore, _ctx: &mut ClientActionContext<'_>) -> bool {
        true
    }

    fn end_client(&mut self, core: &mut ActionCore, ctx: &mut ClientActionContext<'_>) {
        self.cancel_client(core, ctx);
    }

    fn cancel_client(&mut self, _core: &mut ActionCore, _ctx: &mut ClientActionContext<'_>) {}

    fn on_stopped_charging_up_client(
        &mut self,
        _core: &mut ActionCore,
        _ctx: &mut ClientActionContext<'_>,
        _percent: f32,
    ) {
    }

    fn anticipate_client(&mut self, _core: &mut ActionCore, _ctx: &mut ClientActionContext<'_>) {}
}

#[derive(Debug)]
pub(crate) enum Behavior {
    Melee(MeleeAction),
    LaunchProjectile(LaunchProjectileAction),
    ChargedLaunchProjectile(ChargedLaunchProjectileAction),
    AoE(AoeAction),
    DashAttack(DashAttackAction),
    Trample(TrampleAction),
    StealthMode(StealthModeAction),
    ChargedShield(ChargedShieldAction),
    PickUp(PickUpAction),
    Drop(DropAction),
    Revive(ReviveAction),
    Target(TargetAction),
    Chase(ChaseAction),
    Stunned(StunnedAction),
    Emote(EmoteAction),
}

macro_rules! dispatch {
    ($self:expr, $b:ident => $body:expr) => {
        match $self {
            Behavior::Melee($b) => $body,
            Behavior::LaunchProjectile($b) => $body,
            Behavior::ChargedLaunchProjectile($b) => $body,
            Behavior::AoE($b) => $body,
            Behavior::DashAttack($b) => $body,
            Behavior::Trample($b) => $body,
            Behavior::StealthMode($b) => $body,
            Behavior::ChargedShield($b) => $body,
            Behavior::PickUp($b) => $body,
            Behavior::Drop($b) => $body,
            Behavior::Revive($b) => $body,
            Behavior::Target($b) => $body,
            Behavior::Chase($b) => $body,
            Behavior::Stunned($b) => $body,
            Behavior::Emote($b) => $body,
        }
    };
}

impl Behavior {
    pub(crate) fn for_logic(logic: ActionLogic) -> Self {
        match logic {
            ActionLogic::Melee => Behavior::Melee(Default::default()),
            ActionLogic::LaunchProjectile => Behavior::LaunchProjectile(Default::default()),
            ActionLogic::ChargedLaunchProjectile => {
                Behavior::ChargedLaunchProjectile(Default::default())
            }
            ActionLogic::AoE => Behavior::AoE(Default::default()),
            ActionLogic::DashAttack => Behavior::DashAttack(Default::default()),
            ActionLogic::Trample => Behavior::Trample(Default::default()),
            ActionLogic::StealthMode => Behavior::StealthMode(Default::default()),
            ActionLogic::ChargedShield => Behavior::ChargedShield(Default::default()),
            ActionLogic::PickUp => Behavior::PickUp(Default::default()),
            ActionLogic::Drop => Behavior::Drop(Default::default()),
            ActionLogic::Revive => Behavior::Revive(Default::default()),
            ActionLogic::Target => Behavior::Target(Default::default()),
            ActionLogic::Chase => Behavior::Chase(Default::default()),
            ActionLogic::Stunned => Behavior::Stunned(Default::default()),
            ActionLogic::Emote => Behavior::Emote(Default::default()),
        }
    }

    pub(crate) fn reset(&mut self) {
        dispatch!(self, b => b.reset())
    }

    pub(crate) fn on_start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        dispatch!(self, b => b.on_start(core, ctx))
    }

    pub(crate) fn on_update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        dispatch!(self, b => b.on_update(core, ctx))
    }

    pub(crate) fn should_become_non_blocking(&self, core: &ActionCore, now: f32) -> bool {
        dispatch!(self, b => b.should_become_non_blocking(core, now))
    }

    pub(crate) fn end(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        dispatch!(self, b => b.end(core, ctx))
    }

    pub(crate) fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        dispatch!(self, b => b.cancel(core, ctx))
    }

    pub(crate) fn chain_into_new_action(
        &self,
        core: &ActionCore,
        catalog: &ActionCatalog,
    ) -> Option<ActionRequestData> {
        dispatch!(self, b => b.chain_into_new_action(core, catalog))
    }

    pub(crate) fn collision_entered(
        &mut self,
        core: &mut ActionCore,
        ctx: &mut ActionContext<'_>,
        other: EntityId,
    ) {
        dispatch!(self, b => b.collision_entered(core, ctx, other))
    }

    pub(crate) fn buff_value(&self, core: &ActionCore, kind: BuffableValue, value: &mut f32, now: f32) {
        dispatch!(self, b => b.buff_value(core, kind, value, now))
    }

    pub(crate) fn on_gameplay_activity(
        &mut self,
        core: &mut ActionCore,
        ctx: &mut ActionContext<'_>,
        activity: GameplayActivity,
    ) {
        dispatch!(self, b => b.on_gameplay_activity(core, ctx, activity))
    }

    pub(crate) fn on_start_client(&mut self, core: &mut ActionCore, ctx: &mut ClientActionContext<'_>) -> bool {
        dispatch!(self, b => b.on_start_client(core, ctx))
    }

    pub(crate) fn on_update_client(&mut self, core: &mut ActionCore, ctx: &mut ClientActionContext<'_>) -> bool {
        dispatch!(self, b => b.on_update_client(core, ctx))
    }

    pub(crate) fn end_client(&mut self, core: &mut ActionCore, ctx: &mut ClientActionContext<'_>) {
        dispatch!(self, b => b.end_client(core, ctx))
    }

    pub(crate) fn cancel_client(&mut self, core: &mut ActionCore, ctx: &mut ClientActionContext<'_>) {
        dispatch!(self, b => b.cancel_client(core, ctx))
    }

    pub(crate) fn on_stopped_charging_up_client(
        &mut self,
        core: &mut ActionCore,
        ctx: &mut ClientActionContext<'_>,
        percent: f32,
    ) {
        dispatch!(self, b => b.on_stopped_charging_up_client(core, ctx, percent))
    }

    pub(crate) fn anticipate_client(&mut self, core: &mut ActionCore, ctx: &mut ClientActionContext<'_>) {
        dispatch!(self, b => b.anticipate_client(core, ctx))
    }
}

/// Fires an optional animation trigger on `ctx.character`.
pub(crate) fn fire_trigger(ctx: &mut ActionContext<'_>, trigger: &Option<String>) {
    if let Some(name) = trigger {
        ctx.world.set_animation_trigger(ctx.character, name);
    }
}

/// Resets an optional animation trigger on `ctx.character`.
pub(crate) fn reset_trigger(ctx: &mut ActionContext<'_>, trigger: &Option<String>) {
    if let Some(name) = trigger {
        ctx.world.reset_animation_trigger(ctx.character, name);
    }
}

/// Tells clients to visualize the action as it is now.
pub(crate) fn play_on_clients(core: &ActionCore, ctx: &mut ActionContext<'_>) {
    ctx.world.client_play_action(ctx.character, &core.data);
}
