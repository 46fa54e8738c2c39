//! The action engine shared by both peers.
//!
//! An [`Action`] is one in-flight invocation of an ability. It carries two
//! halves that share the same instance and request data:
//!
//! - the authoritative server half (`on_start`, `on_update`, `end`, `cancel`,
//!   buffs, gameplay reactions), driven by the server's action player and
//!   allowed to mutate the [`World`];
//! - the cosmetic client half (`on_start_client`, `on_update_client`,
//!   `end_client`, `cancel_client`, anticipation), driven by the client's
//!   action player and only allowed to read the world and emit
//!   [`VisualCue`]s.
//!
//! Lifecycle (server): Created -> Starting -> Blocking/NonBlocking running
//! -> Ending -> Pooled. An action whose `on_start` returns `false` goes
//! straight back to the pool and never sees `end` or `cancel`.
//!
//! Instances are checked out of an [`ActionFactory`] and returned to it
//! once no collection holds them anymore.

mod config;
mod factory;
pub mod logic;
mod request;
pub mod util;

pub use config::*;
pub use factory::ActionFactory;
pub use request::ActionRequestData;

use crate::math::Vec3;
use crate::world::{EntityId, World, WorldQuery};
use logic::Behavior;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default trigger played on a character that takes a hit.
pub const DEFAULT_HIT_REACT: &str = "HitReact1";

/// Values running actions may scale or override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuffableValue {
    PercentHealingReceived,
    PercentDamageReceived,
    ChanceToStunTramplers,
}

impl BuffableValue {
    /// The value before any action has had a say.
    pub fn unbuffed(self) -> f32 {
        match self {
            BuffableValue::PercentHealingReceived => 1.0,
            BuffableValue::PercentDamageReceived => 1.0,
            BuffableValue::ChanceToStunTramplers => 0.0,
        }
    }
}

/// Gameplay events broadcast to a character's running actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameplayActivity {
    AttackedByEnemy,
    Healed,
    StoppedChargingUp,
    UsingAttackAction,
}

/// Cosmetic output of the client half of an action.
#[derive(Debug, Clone, PartialEq)]
pub enum VisualCue {
    Trigger { character: EntityId, name: String },
    SpawnFx { character: EntityId, name: String, position: Vec3 },
    StopFx { character: EntityId, name: String },
    HitReact { target: EntityId, name: String },
}

/// The other actions running on the same character as the one being called.
///
/// The server's action player hands this to a hook so an action can inspect
/// or cancel its siblings while it is itself detached from the player.
pub trait RunningActions {
    /// Number of queued and non-blocking actions, not counting the caller.
    fn count(&self) -> usize;

    /// Cancels sibling actions running `logic`. Stops after the first match
    /// unless `cancel_all` is set.
    fn cancel_by_logic(
        &mut self,
        logic: ActionLogic,
        cancel_all: bool,
        world: &mut dyn World,
        character: EntityId,
        now: f32,
    );
}

/// Everything a server-side hook may touch.
pub struct ActionContext<'a> {
    pub world: &'a mut dyn World,
    /// The character running the action.
    pub character: EntityId,
    /// Simulation time in seconds.
    pub now: f32,
    peers: Option<&'a mut dyn RunningActions>,
}

impl<'a> ActionContext<'a> {
    pub fn new(world: &'a mut dyn World, character: EntityId, now: f32) -> Self {
        Self {
            world,
            character,
            now,
            peers: None,
        }
    }

    pub fn with_peers(mut self, peers: &'a mut dyn RunningActions) -> Self {
        self.peers = Some(peers);
        self
    }

    /// Running actions on this character, the caller included.
    pub fn running_action_count(&self) -> usize {
        self.peers.as_ref().map_or(0, |p| p.count()) + 1
    }

    pub fn cancel_running_actions_by_logic(&mut self, logic: ActionLogic, cancel_all: bool) {
        if let Some(peers) = self.peers.as_mut() {
            peers.cancel_by_logic(logic, cancel_all, &mut *self.world, self.character, self.now);
        }
    }
}

/// Everything a client-side hook may touch.
pub struct ClientActionContext<'a> {
    pub world: &'a dyn WorldQuery,
    pub character: EntityId,
    pub now: f32,
    pub cues: &'a mut Vec<VisualCue>,
}

impl ClientActionContext<'_> {
    pub fn trigger(&mut self, name: &str) {
        self.cues.push(VisualCue::Trigger {
            character: self.character,
            name: name.to_string(),
        });
    }

    pub fn spawn_fx(&mut self, name: &str, position: Vec3) {
        self.cues.push(VisualCue::SpawnFx {
            character: self.character,
            name: name.to_string(),
            position,
        });
    }

    pub fn stop_fx(&mut self, name: &str) {
        self.cues.push(VisualCue::StopFx {
            character: self.character,
            name: name.to_string(),
        });
    }
}

/// State shared by every action kind.
#[derive(Debug)]
pub struct ActionCore {
    pub config: Arc<ActionConfig>,
    pub data: ActionRequestData,
    pub time_started: f32,
    anticipated: bool,
    serial: u64,
}

impl ActionCore {
    pub fn time_running(&self, now: f32) -> f32 {
        now - self.time_started
    }

    pub fn action_id(&self) -> ActionId {
        self.config.id
    }
}

/// One pooled, in-flight action invocation.
#[derive(Debug)]
pub struct Action {
    core: ActionCore,
    behavior: Behavior,
}

impl Action {
    pub(crate) fn new(config: Arc<ActionConfig>) -> Self {
        let behavior = Behavior::for_logic(config.logic);
        Self {
            core: ActionCore {
                config,
                data: ActionRequestData::default(),
                time_started: 0.0,
                anticipated: false,
                serial: 0,
            },
            behavior,
        }
    }

    pub(crate) fn initialize(&mut self, data: ActionRequestData, serial: u64) {
        self.core.data = data;
        self.core.serial = serial;
    }

    /// Clears all per-invocation state before the instance is pooled.
    pub fn reset(&mut self) {
        self.core.data = ActionRequestData::default();
        self.core.time_started = 0.0;
        self.core.anticipated = false;
        self.core.serial = 0;
        self.behavior.reset();
    }

    pub fn action_id(&self) -> ActionId {
        self.core.config.id
    }

    pub fn config(&self) -> &ActionConfig {
        &self.core.config
    }

    pub fn data(&self) -> &ActionRequestData {
        &self.core.data
    }

    pub fn data_mut(&mut self) -> &mut ActionRequestData {
        &mut self.core.data
    }

    pub fn time_started(&self) -> f32 {
        self.core.time_started
    }

    pub fn set_time_started(&mut self, now: f32) {
        self.core.time_started = now;
    }

    pub fn time_running(&self, now: f32) -> f32 {
        self.core.time_running(now)
    }

    /// Identity of this checkout; changes every time the instance leaves the pool.
    pub fn serial(&self) -> u64 {
        self.core.serial
    }

    pub fn is_anticipated(&self) -> bool {
        self.core.anticipated
    }

    pub fn logic(&self) -> ActionLogic {
        self.core.config.logic
    }

    // ---- server half ----

    /// Returns `false` if the action declined to run.
    pub fn on_start(&mut self, ctx: &mut ActionContext<'_>) -> bool {
        self.behavior.on_start(&mut self.core, ctx)
    }

    /// Returns `false` once the action wants to stop.
    pub fn on_update(&mut self, ctx: &mut ActionContext<'_>) -> bool {
        self.behavior.on_update(&mut self.core, ctx)
    }

    pub fn should_become_non_blocking(&self, now: f32) -> bool {
        self.behavior.should_become_non_blocking(&self.core, now)
    }

    pub fn end(&mut self, ctx: &mut ActionContext<'_>) {
        self.behavior.end(&mut self.core, ctx)
    }

    pub fn cancel(&mut self, ctx: &mut ActionContext<'_>) {
        self.behavior.cancel(&mut self.core, ctx)
    }

    /// A follow-up request to play once this action has ended.
    pub fn chain_into_new_action(&self, catalog: &ActionCatalog) -> Option<ActionRequestData> {
        self.behavior.chain_into_new_action(&self.core, catalog)
    }

    pub fn collision_entered(&mut self, ctx: &mut ActionContext<'_>, other: EntityId) {
        self.behavior.collision_entered(&mut self.core, ctx, other)
    }

    pub fn buff_value(&self, kind: BuffableValue, value: &mut f32, now: f32) {
        self.behavior.buff_value(&self.core, kind, value, now)
    }

    pub fn on_gameplay_activity(&mut self, ctx: &mut ActionContext<'_>, activity: GameplayActivity) {
        self.behavior.on_gameplay_activity(&mut self.core, ctx, activity)
    }

    // ---- client half ----

    /// Starts the server-confirmed visualization. Returns `false` if the
    /// action has nothing further to show.
    pub fn on_start_client(&mut self, ctx: &mut ClientActionContext<'_>) -> bool {
        self.core.anticipated = false;
        self.core.time_started = ctx.now;
        self.behavior.on_start_client(&mut self.core, ctx)
    }

    pub fn on_update_client(&mut self, ctx: &mut ClientActionContext<'_>) -> bool {
        self.behavior.on_update_client(&mut self.core, ctx)
    }

    pub fn end_client(&mut self, ctx: &mut ClientActionContext<'_>) {
        self.behavior.end_client(&mut self.core, ctx)
    }

    pub fn cancel_client(&mut self, ctx: &mut ClientActionContext<'_>) {
        self.behavior.cancel_client(&mut self.core, ctx)
    }

    pub fn on_stopped_charging_up_client(&mut self, ctx: &mut ClientActionContext<'_>, percent: f32) {
        self.behavior
            .on_stopped_charging_up_client(&mut self.core, ctx, percent)
    }

    /// Starts playing feedback the moment local input occurs, before the
    /// server has confirmed anything.
    pub fn anticipate_action_client(&mut self, ctx: &mut ClientActionContext<'_>) {
        self.core.anticipated = true;
        self.core.time_started = ctx.now;
        if let Some(anim) = self.core.config.anim_anticipation.clone() {
            ctx.trigger(&anim);
        }
        self.behavior.anticipate_client(&mut self.core, ctx)
    }

    /// Whether the local client should play `data` before the server confirms it.
    ///
    /// Closing actions whose target is out of local range decline: the
    /// server has to chase first. Target actions never anticipate; the
    /// client runs a single one of those on its own.
    pub fn should_client_anticipate(
        world: &dyn WorldQuery,
        character: EntityId,
        data: &ActionRequestData,
        config: &ActionConfig,
    ) -> bool {
        if !world.is_alive(character) {
            return false;
        }

        let mut target_eligible = true;
        if data.should_close {
            if let Some(target) = data.primary_target() {
                if let (Some(target_pos), Some(our_pos)) =
                    (world.position(target), world.position(character))
                {
                    target_eligible =
                        target_pos.distance_squared(&our_pos) < config.range * config.range;
                }
            }
        }

        target_eligible && config.logic != ActionLogic::Target
    }
}
