use super::ActionBehavior;
use crate::action::{ActionContext, ActionCore};
use crate::world::EntityId;
use log::debug;

/// Walks toward the first target until within `data.amount` of it.
///
/// Synthesized ahead of actions that asked to close distance first.
#[derive(Debug, Default)]
pub struct ChaseAction {
    target: Option<EntityId>,
}

impl ChaseAction {
    /// Stops the chase once the target is gone or within reach.
    fn stop_if_done(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let target_pos = self.target.and_then(|t| ctx.world.position(t));
        let (Some(target_pos), Some(our_pos)) = (target_pos, ctx.world.position(ctx.character)) else {
            self.cancel(core, ctx);
            return true;
        };

        let reach = core.data.amount;
        if reach * reach > our_pos.distance_squared(&target_pos) {
            self.cancel(core, ctx);
            // face the target even when no movement was needed
            ctx.world.look_at(ctx.character, target_pos);
            return true;
        }
        false
    }
}

impl ActionBehavior for ChaseAction {
    fn on_start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let target = core.data.primary_target().filter(|&t| ctx.world.exists(t));
        let Some(target) = target else {
            debug!("Chase by {} has no target to follow", ctx.character);
            return false;
        };
        self.target = Some(target);

        if self.stop_if_done(core, ctx) {
            return false;
        }
        ctx.world.follow(ctx.character, target);
        true
    }

    fn on_update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        if self.stop_if_done(core, ctx) {
            return false;
        }
        if let Some(target) = self.target {
            if !ctx.world.is_performing_forced_movement(ctx.character) {
                ctx.world.follow(ctx.character, target);
            }
        }
        true
    }

    fn cancel(&mut self, _core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        if !ctx.world.is_performing_forced_movement(ctx.character) {
            ctx.world.cancel_move(ctx.character);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_world::{make_action, start, Event, TestWorld};
    use crate::action::{ActionRequestData, GENERAL_CHASE};
    use crate::math::Vec3;

    fn chase_to(target: u64, amount: f32) -> ActionRequestData {
        let mut data = ActionRequestData::new(GENERAL_CHASE).with_targets(vec![target]);
        data.amount = amount;
        data
    }

    #[test]
    fn test_follows_until_within_reach() {
        let mut world = TestWorld::new();
        let tank = world.spawn_player(Vec3::ZERO);
        let imp = world.spawn_npc(Vec3::new(0.0, 0.0, 10.0));
        let mut action = make_action(chase_to(imp, 2.0));

        assert!(start(&mut world, &mut action, tank, 0.0));
        assert!(world.has(&Event::Follow { id: tank, target: imp }));

        world.body_mut(tank).position = Vec3::new(0.0, 0.0, 8.5);
        assert!(!action.on_update(&mut world.ctx(tank, 1.0)));
        assert!(world.has(&Event::CancelMove(tank)));
    }

    #[test]
    fn test_already_in_reach_declines_but_faces_target() {
        let mut world = TestWorld::new();
        let tank = world.spawn_player(Vec3::ZERO);
        let imp = world.spawn_npc(Vec3::new(1.0, 0.0, 0.0));
        let mut action = make_action(chase_to(imp, 2.0));

        assert!(!start(&mut world, &mut action, tank, 0.0));
        assert_eq!(world.body(tank).facing, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_missing_target_declines() {
        let mut world = TestWorld::new();
        let tank = world.spawn_player(Vec3::ZERO);
        let mut action = make_action(chase_to(999, 2.0));

        assert!(!start(&mut world, &mut action, tank, 0.0));
        assert!(world.events.is_empty());
    }

    #[test]
    fn test_vanished_target_stops_chase() {
        let mut world = TestWorld::new();
        let tank = world.spawn_player(Vec3::ZERO);
        let imp = world.spawn_npc(Vec3::new(0.0, 0.0, 10.0));
        let mut action = make_action(chase_to(imp, 2.0));
        start(&mut world, &mut action, tank, 0.0);

        world.bodies.remove(&imp);
        assert!(!action.on_update(&mut world.ctx(tank, 0.5)));
    }
}
