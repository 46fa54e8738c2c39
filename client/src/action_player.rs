//! Client-side mirror of a character's actions.
//!
//! Plays the cosmetic half of every action the server confirms for one
//! character, and for the locally controlled character also plays actions
//! the moment input happens ("anticipation"). A confirmation arriving for an
//! anticipated action reuses the instance already playing so its effects
//! are not shown twice.

use log::debug;
use shared::action::{Action, ActionFactory, ActionId, ActionRequestData, ClientActionContext, VisualCue};
use shared::{EntityId, WorldQuery};
use std::sync::Arc;

/// Anticipated actions the server never confirms are dropped after this.
pub const ANTICIPATION_TIMEOUT_SECONDS: f32 = 1.0;

pub struct ClientActionPlayer {
    character: EntityId,
    playing: Vec<Box<Action>>,
}

fn context<'a>(
    world: &'a dyn WorldQuery,
    character: EntityId,
    now: f32,
    cues: &'a mut Vec<VisualCue>,
) -> ClientActionContext<'a> {
    ClientActionContext {
        world,
        character,
        now,
        cues,
    }
}

impl ClientActionPlayer {
    pub fn new(character: EntityId) -> Self {
        Self {
            character,
            playing: Vec::new(),
        }
    }

    pub fn character(&self) -> EntityId {
        self.character
    }

    pub fn playing_count(&self) -> usize {
        self.playing.len()
    }

    pub fn is_playing(&self, action_id: ActionId) -> bool {
        self.find_action(action_id, false).is_some()
    }

    pub fn is_anticipating(&self, action_id: ActionId) -> bool {
        self.find_action(action_id, true).is_some()
    }

    /// Whether something is still occupying the character's animation:
    /// an action inside its blocking window.
    pub fn is_animating(&self, now: f32) -> bool {
        self.playing.iter().any(|action| {
            let blocking = action.config().blocking_time();
            blocking > 0.0 && action.time_running(now) < blocking
        })
    }

    fn find_action(&self, action_id: ActionId, anticipated_only: bool) -> Option<usize> {
        self.playing
            .iter()
            .position(|a| a.action_id() == action_id && (!anticipated_only || a.is_anticipated()))
    }

    /// Advances every playing action. Actions that finish, outlive their
    /// duration or wait too long for confirmation are removed; the last
    /// kind is cancelled rather than ended.
    pub fn on_update(
        &mut self,
        factory: &mut ActionFactory,
        world: &dyn WorldQuery,
        now: f32,
        cues: &mut Vec<VisualCue>,
    ) {
        let mut i = self.playing.len();
        while i > 0 {
            i -= 1;
            let mut ctx = context(world, self.character, now, cues);
            let action = &mut self.playing[i];

            let anticipated = action.is_anticipated();
            let keep_going = anticipated || action.on_update_client(&mut ctx);
            let running = action.time_running(now);
            let duration = action.config().duration_seconds;
            let expired = duration > 0.0 && running >= duration;
            let timed_out = anticipated && running >= ANTICIPATION_TIMEOUT_SECONDS;

            if keep_going && !expired && !timed_out {
                continue;
            }
            if timed_out {
                debug!(
                    "Anticipated {} on {} was never confirmed",
                    action.config().name,
                    self.character
                );
                action.cancel_client(&mut ctx);
            } else {
                action.end_client(&mut ctx);
            }
            let finished = self.playing.remove(i);
            factory.return_action(finished);
        }
    }

    /// Plays a server-confirmed action, reusing a matching anticipated
    /// instance if one is playing.
    pub fn play_action(
        &mut self,
        factory: &mut ActionFactory,
        world: &dyn WorldQuery,
        data: ActionRequestData,
        now: f32,
        cues: &mut Vec<VisualCue>,
    ) {
        let mut ctx = context(world, self.character, now, cues);
        match self.find_action(data.action_id, true) {
            Some(index) => {
                let action = &mut self.playing[index];
                *action.data_mut() = data;
                if !action.on_start_client(&mut ctx) {
                    let finished = self.playing.remove(index);
                    factory.return_action(finished);
                }
            }
            None => {
                let Some(mut action) = factory.create(data) else {
                    return;
                };
                if action.on_start_client(&mut ctx) {
                    self.playing.push(action);
                } else {
                    factory.return_action(action);
                }
            }
        }
    }

    /// Starts showing `data` before the server has confirmed it, if the
    /// character is free and the action allows it. Returns whether it did.
    pub fn anticipate_action(
        &mut self,
        factory: &mut ActionFactory,
        world: &dyn WorldQuery,
        data: &ActionRequestData,
        now: f32,
        cues: &mut Vec<VisualCue>,
    ) -> bool {
        if world.is_animating(self.character) {
            return false;
        }
        let Some(config) = factory.catalog().get(data.action_id).map(Arc::clone) else {
            return false;
        };
        if !Action::should_client_anticipate(world, self.character, data, &config) {
            return false;
        }
        let Some(mut action) = factory.create(data.clone()) else {
            return false;
        };
        action.anticipate_action_client(&mut context(world, self.character, now, cues));
        self.playing.push(action);
        true
    }

    pub fn cancel_all_actions(
        &mut self,
        factory: &mut ActionFactory,
        world: &dyn WorldQuery,
        now: f32,
        cues: &mut Vec<VisualCue>,
    ) {
        let mut ctx = context(world, self.character, now, cues);
        for mut action in self.playing.drain(..) {
            action.cancel_client(&mut ctx);
            factory.return_action(action);
        }
    }

    pub fn cancel_all_actions_with_same_prototype_id(
        &mut self,
        factory: &mut ActionFactory,
        world: &dyn WorldQuery,
        action_id: ActionId,
        now: f32,
        cues: &mut Vec<VisualCue>,
    ) {
        let mut ctx = context(world, self.character, now, cues);
        let mut i = self.playing.len();
        while i > 0 {
            i -= 1;
            if self.playing[i].action_id() == action_id {
                let mut action = self.playing.remove(i);
                action.cancel_client(&mut ctx);
                factory.return_action(action);
            }
        }
    }

    pub fn on_stopped_charging_up(
        &mut self,
        world: &dyn WorldQuery,
        percent: f32,
        now: f32,
        cues: &mut Vec<VisualCue>,
    ) {
        let mut ctx = context(world, self.character, now, cues);
        for action in self.playing.iter_mut() {
            action.on_stopped_charging_up_client(&mut ctx, percent);
        }
    }

    /// Returns every playing instance to the pool without running any hooks.
    pub fn release_all(&mut self, factory: &mut ActionFactory) {
        for action in self.playing.drain(..) {
            factory.return_action(action);
        }
    }
}
