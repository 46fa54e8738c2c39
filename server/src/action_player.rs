//! Authoritative action scheduling for one character.
//!
//! Every character owns a [`ServerActionPlayer`]. It keeps a blocking queue,
//! whose head is the one action currently occupying the character, plus a set
//! of non-blocking actions that keep running alongside it. Requests that would
//! make the queue too deep are dropped, actions still on cooldown are skipped,
//! and targeted requests get target and chase actions synthesized ahead of
//! them.

use log::debug;
use shared::action::{
    Action, ActionConfig, ActionContext, ActionFactory, ActionLogic, ActionRequestData, BlockingMode,
    BuffableValue, GameplayActivity, RunningActions,
};
use shared::{ActionId, EntityId, World};
use std::collections::{HashMap, VecDeque};

/// Seconds of estimated blocking work a queue may hold before new requests
/// are dropped.
pub const MAX_QUEUE_TIME_DEPTH: f32 = 1.6;

/// The collections an action can see while one of its siblings is detached
/// from the player to run a hook.
struct Peers<'a> {
    queue: &'a mut VecDeque<Box<Action>>,
    /// Whether `queue.front()` has been started.
    head_running: &'a mut bool,
    non_blocking: &'a mut Vec<Box<Action>>,
    released: &'a mut Vec<Box<Action>>,
}

impl Peers<'_> {
    fn cancel_matching(
        &mut self,
        logic: ActionLogic,
        cancel_all: bool,
        except: Option<u64>,
        world: &mut dyn World,
        character: EntityId,
        now: f32,
    ) {
        let matches = |action: &Action| action.logic() == logic && Some(action.serial()) != except;

        for index in (0..self.non_blocking.len()).rev() {
            if !matches(&self.non_blocking[index]) {
                continue;
            }
            let mut action = self.non_blocking.remove(index);
            action.cancel(&mut ActionContext::new(&mut *world, character, now));
            self.released.push(action);
            if !cancel_all {
                break;
            }
        }

        if *self.head_running && self.queue.front().map_or(false, |head| matches(head)) {
            if let Some(mut action) = self.queue.pop_front() {
                action.cancel(&mut ActionContext::new(&mut *world, character, now));
                self.released.push(action);
                // the next queued action starts on the following update
                *self.head_running = false;
            }
        }
    }
}

impl RunningActions for Peers<'_> {
    fn count(&self) -> usize {
        self.non_blocking.len() + usize::from(*self.head_running && !self.queue.is_empty())
    }

    fn cancel_by_logic(
        &mut self,
        logic: ActionLogic,
        cancel_all: bool,
        world: &mut dyn World,
        character: EntityId,
        now: f32,
    ) {
        self.cancel_matching(logic, cancel_all, None, world, character, now);
    }
}

/// Runs one character's blocking queue and non-blocking actions.
#[derive(Debug)]
pub struct ServerActionPlayer {
    character: EntityId,
    queue: VecDeque<Box<Action>>,
    head_running: bool,
    non_blocking: Vec<Box<Action>>,
    /// When each action id last started successfully, for cooldowns.
    last_used: HashMap<ActionId, f32>,
    /// A follow-up produced by an ended action, played on the next update.
    pending_chain: Option<ActionRequestData>,
    /// Finished actions waiting to go back to the factory.
    released: Vec<Box<Action>>,
}

impl ServerActionPlayer {
    pub fn new(character: EntityId) -> Self {
        Self {
            character,
            queue: VecDeque::new(),
            head_running: false,
            non_blocking: Vec::new(),
            last_used: HashMap::new(),
            pending_chain: None,
            released: Vec::new(),
        }
    }

    pub fn character(&self) -> EntityId {
        self.character
    }

    /// Queues a request, interrupting the current head first if the request
    /// is not queueing and the head allows it.
    ///
    /// Requests arriving while the queue is already [`MAX_QUEUE_TIME_DEPTH`]
    /// seconds deep are dropped without any effect.
    pub fn play_action(
        &mut self,
        world: &mut dyn World,
        factory: &mut ActionFactory,
        data: ActionRequestData,
        now: f32,
    ) {
        let interrupts_head = !data.should_queue
            && self.queue.front().map_or(false, |head| {
                let config = head.config();
                config.action_interruptible || config.can_be_interrupted_by(data.action_id)
            });
        if interrupts_head {
            self.clear_actions(&mut *world, now, false);
        }

        let depth = self.queue_time_depth(now);
        if depth >= MAX_QUEUE_TIME_DEPTH {
            debug!(
                "Dropping {} for {}: queue is {:.2}s deep",
                data.action_id, self.character, depth
            );
            return;
        }

        let Some(action) = factory.create(data) else {
            return;
        };
        self.queue.push_back(action);
        if self.queue.len() == 1 {
            self.start_action(world, factory, now);
        }
        self.recycle(factory);
    }

    /// Cancels the head and drops everything queued behind it. The head's
    /// cooldown is forgotten so it can be used again right away.
    pub fn clear_actions(&mut self, world: &mut dyn World, now: f32, cancel_non_blocking: bool) {
        if let Some(head) = self.queue.front() {
            self.last_used.remove(&head.action_id());
        }
        if self.head_running {
            self.run_head(&mut *world, now, |action, ctx| action.cancel(ctx));
        }
        self.head_running = false;
        self.released.extend(self.queue.drain(..));

        if cancel_non_blocking {
            for mut action in std::mem::take(&mut self.non_blocking) {
                action.cancel(&mut ActionContext::new(&mut *world, self.character, now));
                self.released.push(action);
            }
        }
    }

    /// Advances every running action by one tick.
    pub fn update(&mut self, world: &mut dyn World, factory: &mut ActionFactory, now: f32) {
        if let Some(chained) = self.pending_chain.take() {
            self.play_action(&mut *world, factory, chained, now);
        }

        // the head may have been cancelled out from under the queue
        if !self.head_running && !self.queue.is_empty() {
            self.start_action(&mut *world, factory, now);
        }

        if self.head_running && self.queue.front().map_or(false, |head| head.should_become_non_blocking(now)) {
            self.demote_head(&mut *world, factory, now);
        }

        if self.head_running {
            let keep_going = self
                .run_head(&mut *world, now, |action, ctx| Self::update_action(action, ctx))
                .unwrap_or(false);
            if !keep_going {
                self.advance_queue(&mut *world, factory, now, true);
            }
        }

        self.visit_non_blocking(&mut *world, now, |action, ctx| {
            let keep_going = Self::update_action(action, ctx);
            if !keep_going {
                action.end(ctx);
            }
            keep_going
        });

        self.recycle(factory);
    }

    /// Starts from the unbuffed value and lets the head and every
    /// non-blocking action modify it in turn.
    pub fn get_buffed_value(&self, kind: BuffableValue, now: f32) -> f32 {
        let mut value = kind.unbuffed();
        for action in self.running() {
            action.buff_value(kind, &mut value, now);
        }
        value
    }

    /// Tells the head and every non-blocking action about a gameplay event.
    pub fn on_gameplay_activity(&mut self, world: &mut dyn World, activity: GameplayActivity, now: f32) {
        if self.head_running {
            self.run_head(&mut *world, now, |action, ctx| {
                action.on_gameplay_activity(ctx, activity)
            });
        }
        self.visit_non_blocking(world, now, |action, ctx| {
            action.on_gameplay_activity(ctx, activity);
            true
        });
    }

    /// Cancels running actions of the given kind, skipping the action whose
    /// serial is `except`. Stops after the first non-blocking match unless
    /// `cancel_all` is set.
    pub fn cancel_running_actions_by_logic(
        &mut self,
        world: &mut dyn World,
        now: f32,
        logic: ActionLogic,
        cancel_all: bool,
        except: Option<u64>,
    ) {
        let character = self.character;
        let mut peers = Peers {
            queue: &mut self.queue,
            head_running: &mut self.head_running,
            non_blocking: &mut self.non_blocking,
            released: &mut self.released,
        };
        peers.cancel_matching(logic, cancel_all, except, world, character, now);
    }

    /// Forwards a physical collision to the head action.
    pub fn collision_entered(&mut self, world: &mut dyn World, now: f32, other: EntityId) {
        if self.head_running {
            self.run_head(world, now, |action, ctx| action.collision_entered(ctx, other));
        }
    }

    /// The request behind the blocking action currently running, if any.
    pub fn active_action_info(&self) -> Option<&ActionRequestData> {
        self.queue.front().filter(|_| self.head_running).map(|head| head.data())
    }

    pub fn active_action_config(&self) -> Option<&ActionConfig> {
        self.queue.front().filter(|_| self.head_running).map(|head| head.config())
    }

    /// Running actions: the head (if started) plus every non-blocking one.
    pub fn running_action_count(&self) -> usize {
        self.running().count()
    }

    /// Estimated seconds until the queue drains.
    pub fn queue_time_depth(&self, now: f32) -> f32 {
        let Some(head) = self.queue.front() else {
            return 0.0;
        };
        let total: f32 = self.queue.iter().map(|a| a.config().blocking_time()).sum();
        let elapsed = if self.head_running { head.time_running(now) } else { 0.0 };
        total - elapsed
    }

    pub fn queued_action_ids(&self) -> Vec<ActionId> {
        self.queue.iter().map(|a| a.action_id()).collect()
    }

    pub fn queued_requests(&self) -> impl Iterator<Item = &ActionRequestData> {
        self.queue.iter().map(|a| a.data())
    }

    pub fn non_blocking_action_ids(&self) -> Vec<ActionId> {
        self.non_blocking.iter().map(|a| a.action_id()).collect()
    }

    pub fn last_used(&self, id: ActionId) -> Option<f32> {
        self.last_used.get(&id).copied()
    }

    /// Hands every instance back to the factory without running any hook.
    /// Used when the character leaves the world.
    pub fn release_all(&mut self, factory: &mut ActionFactory) {
        self.head_running = false;
        self.pending_chain = None;
        self.released.extend(self.queue.drain(..));
        self.released.extend(self.non_blocking.drain(..));
        self.recycle(factory);
    }

    fn running(&self) -> impl Iterator<Item = &Action> {
        self.queue
            .front()
            .filter(|_| self.head_running)
            .into_iter()
            .chain(self.non_blocking.iter())
            .map(|action| action.as_ref())
    }

    fn update_action(action: &mut Action, ctx: &mut ActionContext<'_>) -> bool {
        let keep_going = action.on_update(ctx);
        let duration = action.config().duration_seconds;
        // non-positive durations never expire
        let expired = duration > 0.0 && action.time_running(ctx.now) >= duration;
        keep_going && !expired
    }

    /// Starts the head, skipping anything on cooldown or declining to start,
    /// until one is running or the queue is empty.
    fn start_action(&mut self, world: &mut dyn World, factory: &mut ActionFactory, now: f32) {
        while !self.head_running {
            let Some(head) = self.queue.front() else {
                return;
            };

            let reuse = head.config().reuse_time_seconds;
            let on_cooldown = reuse > 0.0
                && self
                    .last_used
                    .get(&head.action_id())
                    .map_or(false, |&used| now - used < reuse);
            if on_cooldown {
                debug!("{} skipped {}: still on cooldown", self.character, head.action_id());
                self.discard_head();
                if !self.may_start_next() {
                    return;
                }
                continue;
            }

            let base = self.synthesize_target_if_necessary(&*world, factory, 0);
            self.synthesize_chase_if_necessary(factory, base);

            let Some(head) = self.queue.front_mut() else {
                return;
            };
            head.set_time_started(now);
            let started = self
                .run_head(&mut *world, now, |action, ctx| action.on_start(ctx))
                .unwrap_or(false);
            if !started {
                // declined actions never see end or cancel
                self.discard_head();
                if !self.may_start_next() {
                    return;
                }
                continue;
            }
            self.head_running = true;

            let Some(head) = self.queue.front() else {
                return;
            };
            let config = head.config();
            if config.action_interruptible && !world.is_performing_forced_movement(self.character) {
                world.cancel_move(self.character);
            }
            self.last_used.insert(head.action_id(), now);

            if config.exec_time_seconds == 0.0 && config.blocking_mode == BlockingMode::OnlyDuringExecTime {
                // never occupies the head, not even for a tick
                if let Some(action) = self.queue.pop_front() {
                    self.non_blocking.push(action);
                }
                self.head_running = false;
                if !self.may_start_next() {
                    return;
                }
            }
        }
    }

    /// Locks onto the request's single target first when it differs from the
    /// current one. Returns the base action's new index.
    fn synthesize_target_if_necessary(
        &mut self,
        world: &dyn World,
        factory: &mut ActionFactory,
        base: usize,
    ) -> usize {
        let Some(targets) = self.queue.get(base).and_then(|a| a.data().target_ids.clone()) else {
            return base;
        };
        if targets.len() != 1 || Some(targets[0]) == world.target_of(self.character) {
            return base;
        }

        let data = ActionRequestData::new(factory.catalog().target_id).with_targets(targets);
        match factory.create(data) {
            Some(target_action) => {
                self.queue.insert(base, target_action);
                base + 1
            }
            None => base,
        }
    }

    /// Closes distance to the request's target first when it asked to.
    fn synthesize_chase_if_necessary(&mut self, factory: &mut ActionFactory, base: usize) {
        let Some(base_action) = self.queue.get_mut(base) else {
            return;
        };
        if !base_action.data().should_close {
            return;
        }
        let Some(targets) = base_action.data().target_ids.clone() else {
            return;
        };

        let mut data = ActionRequestData::new(factory.catalog().chase_id).with_targets(targets);
        data.amount = base_action.config().range;
        // only ever chase once per request
        base_action.data_mut().should_close = false;

        if let Some(chase) = factory.create(data) {
            self.queue.insert(base, chase);
        }
    }

    /// Moves the running head to the non-blocking set and starts the next one.
    fn demote_head(&mut self, world: &mut dyn World, factory: &mut ActionFactory, now: f32) {
        if let Some(action) = self.queue.pop_front() {
            self.non_blocking.push(action);
        }
        self.head_running = false;
        if self.may_start_next() {
            self.start_action(world, factory, now);
        }
    }

    /// Removes the head, ending it first if `call_end`, and starts the next
    /// one unless a chained follow-up takes precedence.
    fn advance_queue(&mut self, world: &mut dyn World, factory: &mut ActionFactory, now: f32, call_end: bool) {
        if call_end && self.head_running {
            let chained = self.run_head(&mut *world, now, |action, ctx| {
                action.end(ctx);
                action.chain_into_new_action(factory.catalog())
            });
            if let Some(Some(chained)) = chained {
                self.pending_chain = Some(chained);
            }
        }
        self.discard_head();
        if self.may_start_next() {
            self.start_action(world, factory, now);
        }
    }

    fn discard_head(&mut self) {
        if let Some(action) = self.queue.pop_front() {
            self.released.push(action);
        }
        self.head_running = false;
    }

    /// A pending chained action supersedes the queue unless it queues itself.
    fn may_start_next(&self) -> bool {
        self.pending_chain.as_ref().map_or(true, |chained| chained.should_queue)
    }

    /// Runs `hook` on the head with the rest of the player visible as its
    /// peers. The head is detached for the duration, so nothing behind it
    /// counts as running.
    fn run_head<R>(
        &mut self,
        world: &mut dyn World,
        now: f32,
        hook: impl FnOnce(&mut Action, &mut ActionContext<'_>) -> R,
    ) -> Option<R> {
        let mut action = self.queue.pop_front()?;
        let mut rest_running = false;
        let result = {
            let mut peers = Peers {
                queue: &mut self.queue,
                head_running: &mut rest_running,
                non_blocking: &mut self.non_blocking,
                released: &mut self.released,
            };
            let mut ctx = ActionContext::new(world, self.character, now).with_peers(&mut peers);
            hook(&mut *action, &mut ctx)
        };
        self.queue.push_front(action);
        Some(result)
    }

    /// Runs `hook` on each non-blocking action, newest first. Actions for
    /// which it returns `false` are released.
    fn visit_non_blocking(
        &mut self,
        world: &mut dyn World,
        now: f32,
        mut hook: impl FnMut(&mut Action, &mut ActionContext<'_>) -> bool,
    ) {
        let serials: Vec<u64> = self.non_blocking.iter().rev().map(|a| a.serial()).collect();
        for serial in serials {
            // an earlier hook may have cancelled this one
            let Some(index) = self.non_blocking.iter().position(|a| a.serial() == serial) else {
                continue;
            };
            let mut action = self.non_blocking.remove(index);
            let keep = {
                let mut peers = Peers {
                    queue: &mut self.queue,
                    head_running: &mut self.head_running,
                    non_blocking: &mut self.non_blocking,
                    released: &mut self.released,
                };
                let mut ctx =
                    ActionContext::new(&mut *world, self.character, now).with_peers(&mut peers);
                hook(&mut *action, &mut ctx)
            };
            if keep {
                let index = index.min(self.non_blocking.len());
                self.non_blocking.insert(index, action);
            } else {
                self.released.push(action);
            }
        }
    }

    fn recycle(&mut self, factory: &mut ActionFactory) {
        for action in self.released.drain(..) {
            factory.return_action(action);
        }
    }
}
