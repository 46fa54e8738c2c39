use super::{fire_trigger, play_on_clients, ActionBehavior};
use crate::action::util::{hits_player_characters, ideal_melee_foe};
use crate::action::{ActionContext, ActionCore, ClientActionContext, VisualCue};
use crate::world::EntityId;

/// Extra reach the client allows before skipping the hit reaction.
const CLIENT_RANGE_PADDING: f32 = 3.0;

/// A swing that lands on the closest foe in front of the attacker at exec time.
///
/// The foe found when the swing starts is only a hint: whoever is actually in
/// reach when the blow lands takes the damage.
#[derive(Debug, Default)]
pub struct MeleeAction {
    execution_fired: bool,
    provisional_target: Option<EntityId>,
    impact_played: bool,
}

impl MeleeAction {
    fn detect_foe(core: &ActionCore, ctx: &ActionContext<'_>, hint: Option<EntityId>) -> Option<EntityId> {
        let side = hits_player_characters(&*ctx.world, ctx.character, core.config.is_friendly);
        ideal_melee_foe(&*ctx.world, ctx.character, core.config.range, side, hint)
    }

    fn play_hit_react(&mut self, core: &ActionCore, ctx: &mut ClientActionContext<'_>) {
        if self.impact_played {
            return;
        }
        self.impact_played = true;

        let (Some(target), Some(react)) = (core.data.primary_target(), core.config.react_anim.as_ref()) else {
            return;
        };
        let (Some(ours), Some(theirs)) = (ctx.world.position(ctx.character), ctx.world.position(target)) else {
            return;
        };
        let padded = core.config.range + CLIENT_RANGE_PADDING;
        if ours.distance_squared(&theirs) < padded * padded {
            ctx.cues.push(VisualCue::HitReact {
                target,
                name: react.clone(),
            });
        }
    }
}

impl ActionBehavior for MeleeAction {
    fn on_start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let hint = core
            .data
            .primary_target()
            .or_else(|| ctx.world.target_of(ctx.character));
        if let Some(foe) = Self::detect_foe(core, ctx, hint) {
            self.provisional_target = Some(foe);
            core.data.target_ids = Some(vec![foe]);
        }

        if core.data.direction != crate::math::Vec3::ZERO {
            if let Some(pos) = ctx.world.position(ctx.character) {
                ctx.world.look_at(ctx.character, pos + core.data.direction);
            }
        }

        fire_trigger(ctx, &core.config.anim);
        play_on_clients(core, ctx);
        true
    }

    fn on_update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        if !self.execution_fired && core.time_running(ctx.now) >= core.config.exec_time_seconds {
            self.execution_fired = true;
            if let Some(foe) = Self::detect_foe(core, ctx, self.provisional_target) {
                ctx.world
                    .receive_hp(ctx.character, foe, -(core.config.amount as i32));
            }
        }
        true
    }

    fn on_update_client(&mut self, core: &mut ActionCore, ctx: &mut ClientActionContext<'_>) -> bool {
        if core.time_running(ctx.now) >= core.config.exec_time_seconds {
            self.play_hit_react(core, ctx);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_world::{make_action, start, Event, TestWorld};
    use crate::action::{ActionRequestData, ClientActionContext, VisualCue, TANK_BASE_ATTACK};
    use crate::math::Vec3;

    #[test]
    fn test_damage_lands_at_exec_time() {
        let mut world = TestWorld::new();
        let tank = world.spawn_player(Vec3::ZERO);
        let imp = world.spawn_npc(Vec3::new(0.0, 0.0, 1.5));
        let mut action = make_action(ActionRequestData::new(TANK_BASE_ATTACK));

        assert!(start(&mut world, &mut action, tank, 0.0));
        assert_eq!(action.data().target_ids, Some(vec![imp]));
        assert!(world.has(&Event::ClientPlay { id: tank, action_id: TANK_BASE_ATTACK }));

        assert!(action.on_update(&mut world.ctx(tank, 0.1)));
        assert_eq!(world.damage_to(imp), 0);

        assert!(action.on_update(&mut world.ctx(tank, 0.2)));
        assert!(action.on_update(&mut world.ctx(tank, 0.3)));
        assert_eq!(world.damage_to(imp), 30);
    }

    #[test]
    fn test_foe_that_stepped_away_is_not_hit() {
        let mut world = TestWorld::new();
        let tank = world.spawn_player(Vec3::ZERO);
        let imp = world.spawn_npc(Vec3::new(0.0, 0.0, 1.5));
        let mut action = make_action(ActionRequestData::new(TANK_BASE_ATTACK));
        start(&mut world, &mut action, tank, 0.0);

        world.body_mut(imp).position = Vec3::new(0.0, 0.0, 10.0);
        action.on_update(&mut world.ctx(tank, 0.25));

        assert_eq!(world.damage_to(imp), 0);
    }

    #[test]
    fn test_client_hit_react_plays_once_in_range() {
        let mut world = TestWorld::new();
        let tank = world.spawn_player(Vec3::ZERO);
        let imp = world.spawn_npc(Vec3::new(0.0, 0.0, 1.5));
        let mut action = make_action(ActionRequestData::new(TANK_BASE_ATTACK).with_targets(vec![imp]));
        let mut cues = Vec::new();

        let mut ctx = ClientActionContext { world: &world, character: tank, now: 0.0, cues: &mut cues };
        assert!(action.on_start_client(&mut ctx));
        ctx.now = 0.3;
        action.on_update_client(&mut ctx);
        action.on_update_client(&mut ctx);

        let reacts: Vec<_> = cues
            .iter()
            .filter(|c| matches!(c, VisualCue::HitReact { .. }))
            .collect();
        assert_eq!(reacts.len(), 1);
    }
}
