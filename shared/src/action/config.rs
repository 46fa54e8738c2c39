//! Immutable action prototypes.
//!
//! Every ability a character can use is described by one [`ActionConfig`] in
//! the [`ActionCatalog`]. The catalog is indexed by [`ActionId`], which is the
//! handle carried on the wire in [`ActionRequestData`](super::ActionRequestData).

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Index into the action prototype table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct ActionId(pub u16);

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which behavior an action instance runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionLogic {
    Melee,
    LaunchProjectile,
    ChargedLaunchProjectile,
    AoE,
    DashAttack,
    Trample,
    StealthMode,
    ChargedShield,
    PickUp,
    Drop,
    Revive,
    Target,
    Chase,
    Stunned,
    Emote,
}

/// How long an action occupies the head of a character's blocking queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockingMode {
    /// Blocks the queue until the action ends.
    EntireDuration,
    /// Blocks only until `exec_time_seconds` has elapsed, then keeps running
    /// alongside whatever starts next.
    OnlyDuringExecTime,
}

/// Tuning for one projectile tier fired by a projectile action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileInfo {
    pub speed: f32,
    pub range: f32,
    pub damage: i32,
    pub max_victims: u32,
    pub radius: f32,
}

/// Immutable description of an action prototype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    pub id: ActionId,
    pub name: String,
    pub logic: ActionLogic,
    /// Damage, heal or multiplier; meaning depends on `logic`.
    pub amount: f32,
    pub mana_cost: f32,
    pub range: f32,
    /// Non-positive means the action has no fixed duration.
    pub duration_seconds: f32,
    pub exec_time_seconds: f32,
    pub effect_duration_seconds: f32,
    pub reuse_time_seconds: f32,
    pub anim_anticipation: Option<String>,
    pub anim: Option<String>,
    pub anim2: Option<String>,
    pub react_anim: Option<String>,
    pub other_animator_variable: Option<String>,
    pub splash_damage: f32,
    pub move_speed: f32,
    pub knockback_speed: f32,
    pub knockback_duration: f32,
    pub radius: f32,
    pub projectiles: Vec<ProjectileInfo>,
    pub spawns: Vec<String>,
    /// Movement and non-queued requests may interrupt this action.
    pub action_interruptible: bool,
    /// Specific actions that may interrupt this one even when it is not
    /// generally interruptible.
    pub interruptible_by: Vec<ActionId>,
    pub blocking_mode: BlockingMode,
    pub is_friendly: bool,
}

impl ActionConfig {
    /// A prototype with neutral tuning, used as the base for the catalog
    /// entries and for tests.
    pub fn new(id: ActionId, name: &str, logic: ActionLogic) -> Self {
        Self {
            id,
            name: name.to_string(),
            logic,
            amount: 0.0,
            mana_cost: 0.0,
            range: 0.0,
            duration_seconds: 0.0,
            exec_time_seconds: 0.0,
            effect_duration_seconds: 0.0,
            reuse_time_seconds: 0.0,
            anim_anticipation: None,
            anim: None,
            anim2: None,
            react_anim: None,
            other_animator_variable: None,
            splash_damage: 0.0,
            move_speed: 0.0,
            knockback_speed: 0.0,
            knockback_duration: 0.0,
            radius: 0.0,
            projectiles: Vec::new(),
            spawns: Vec::new(),
            action_interruptible: false,
            interruptible_by: Vec::new(),
            blocking_mode: BlockingMode::EntireDuration,
            is_friendly: false,
        }
    }

    pub fn can_be_interrupted_by(&self, id: ActionId) -> bool {
        self.interruptible_by.contains(&id)
    }

    /// Seconds this action contributes to a blocking queue's estimated depth.
    pub fn blocking_time(&self) -> f32 {
        match self.blocking_mode {
            BlockingMode::OnlyDuringExecTime => self.exec_time_seconds,
            BlockingMode::EntireDuration => self.duration_seconds,
        }
    }
}

/// The static action-prototype table.
///
/// The ids of the three prototypes the scheduler synthesizes on its own
/// (chase, target, stun) are recorded so callers never hard-code them.
#[derive(Debug, Clone)]
pub struct ActionCatalog {
    actions: Vec<Arc<ActionConfig>>,
    pub chase_id: ActionId,
    pub target_id: ActionId,
    pub stun_id: ActionId,
}

impl ActionCatalog {
    /// Builds a catalog from prototypes whose `id` fields must equal their
    /// position in the list.
    pub fn new(
        actions: Vec<ActionConfig>,
        chase_id: ActionId,
        target_id: ActionId,
        stun_id: ActionId,
    ) -> Self {
        debug_assert!(actions
            .iter()
            .enumerate()
            .all(|(i, a)| a.id.0 as usize == i));
        Self {
            actions: actions.into_iter().map(Arc::new).collect(),
            chase_id,
            target_id,
            stun_id,
        }
    }

    pub fn get(&self, id: ActionId) -> Option<&Arc<ActionConfig>> {
        self.actions.get(id.0 as usize)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Arc<ActionConfig>> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ActionConfig>> {
        self.actions.iter()
    }
}

pub const GENERAL_CHASE: ActionId = ActionId(0);
pub const GENERAL_TARGET: ActionId = ActionId(1);
pub const STUNNED: ActionId = ActionId(2);
pub const EMOTE: ActionId = ActionId(3);
pub const TANK_BASE_ATTACK: ActionId = ActionId(4);
pub const ARCHER_BASE_ATTACK: ActionId = ActionId(5);
pub const ARCHER_CHARGED_SHOT: ActionId = ActionId(6);
pub const ARCHER_VOLLEY: ActionId = ActionId(7);
pub const TANK_SHIELD: ActionId = ActionId(8);
pub const ROGUE_DASH: ActionId = ActionId(9);
pub const ROGUE_STEALTH: ActionId = ActionId(10);
pub const BOSS_TRAMPLE: ActionId = ActionId(11);
pub const PICK_UP: ActionId = ActionId(12);
pub const DROP: ActionId = ActionId(13);
pub const GENERAL_REVIVE: ActionId = ActionId(14);

fn anim(name: &str) -> Option<String> {
    Some(name.to_string())
}

impl Default for ActionCatalog {
    fn default() -> Self {
        let mut chase = ActionConfig::new(GENERAL_CHASE, "GeneralChase", ActionLogic::Chase);
        chase.action_interruptible = true;
        chase.is_friendly = true;

        let mut target = ActionConfig::new(GENERAL_TARGET, "GeneralTarget", ActionLogic::Target);
        target.blocking_mode = BlockingMode::OnlyDuringExecTime;
        target.is_friendly = true;

        let mut stunned = ActionConfig::new(STUNNED, "Stunned", ActionLogic::Stunned);
        stunned.amount = 2.0;
        stunned.duration_seconds = 3.0;
        stunned.anim = anim("Stunned");
        stunned.anim2 = anim("StunEnd");
        stunned.is_friendly = true;

        let mut emote = ActionConfig::new(EMOTE, "Emote1", ActionLogic::Emote);
        emote.anim = anim("Emote1");
        emote.blocking_mode = BlockingMode::OnlyDuringExecTime;
        emote.action_interruptible = true;
        emote.is_friendly = true;

        let mut tank_attack =
            ActionConfig::new(TANK_BASE_ATTACK, "TankBaseAttack", ActionLogic::Melee);
        tank_attack.amount = 30.0;
        tank_attack.range = 2.2;
        tank_attack.duration_seconds = 0.5;
        tank_attack.exec_time_seconds = 0.2;
        tank_attack.reuse_time_seconds = 0.5;
        tank_attack.anim_anticipation = anim("AnticipateMove");
        tank_attack.anim = anim("Attack1");
        tank_attack.react_anim = anim("HitReact1");
        tank_attack.action_interruptible = true;

        let mut archer_attack = ActionConfig::new(
            ARCHER_BASE_ATTACK,
            "ArcherBaseAttack",
            ActionLogic::LaunchProjectile,
        );
        archer_attack.range = 12.0;
        archer_attack.duration_seconds = 0.6;
        archer_attack.exec_time_seconds = 0.3;
        archer_attack.reuse_time_seconds = 0.6;
        archer_attack.anim_anticipation = anim("AnticipateMove");
        archer_attack.anim = anim("Attack1");
        archer_attack.projectiles = vec![ProjectileInfo {
            speed: 30.0,
            range: 12.0,
            damage: 20,
            max_victims: 1,
            radius: 0.5,
        }];
        archer_attack.action_interruptible = true;

        let mut charged_shot = ActionConfig::new(
            ARCHER_CHARGED_SHOT,
            "ArcherChargedShot",
            ActionLogic::ChargedLaunchProjectile,
        );
        charged_shot.range = 15.0;
        charged_shot.exec_time_seconds = 1.2;
        charged_shot.anim = anim("ChargeUp");
        charged_shot.anim2 = anim("ChargeRelease");
        charged_shot.spawns = vec!["ChargeUpFx".to_string()];
        charged_shot.projectiles = vec![
            ProjectileInfo {
                speed: 25.0,
                range: 15.0,
                damage: 15,
                max_victims: 1,
                radius: 0.5,
            },
            ProjectileInfo {
                speed: 30.0,
                range: 15.0,
                damage: 30,
                max_victims: 2,
                radius: 0.6,
            },
            ProjectileInfo {
                speed: 40.0,
                range: 18.0,
                damage: 60,
                max_victims: 4,
                radius: 0.8,
            },
        ];

        let mut volley = ActionConfig::new(ARCHER_VOLLEY, "ArcherVolley", ActionLogic::AoE);
        volley.amount = 25.0;
        volley.range = 15.0;
        volley.radius = 3.0;
        volley.duration_seconds = 1.0;
        volley.exec_time_seconds = 0.6;
        volley.reuse_time_seconds = 3.0;
        volley.anim = anim("Volley");
        volley.spawns = vec!["VolleyFx".to_string()];

        let mut shield =
            ActionConfig::new(TANK_SHIELD, "TankShieldBuff", ActionLogic::ChargedShield);
        shield.exec_time_seconds = 2.0;
        shield.effect_duration_seconds = 2.0;
        shield.anim = anim("ShieldCharge");
        shield.anim2 = anim("ShieldRelease");
        shield.spawns = vec!["ShieldChargeFx".to_string(), "ShieldFullFx".to_string()];
        shield.is_friendly = true;

        let mut dash = ActionConfig::new(ROGUE_DASH, "RogueDashAttack", ActionLogic::DashAttack);
        dash.amount = 40.0;
        dash.range = 8.0;
        dash.radius = 2.0;
        dash.duration_seconds = 0.4;
        dash.reuse_time_seconds = 2.0;
        dash.anim = anim("DashStart");
        dash.anim2 = anim("DashEnd");
        dash.other_animator_variable = anim("DashCancel");

        let mut stealth =
            ActionConfig::new(ROGUE_STEALTH, "RogueStealthMode", ActionLogic::StealthMode);
        stealth.duration_seconds = 15.0;
        stealth.exec_time_seconds = 1.0;
        stealth.reuse_time_seconds = 3.0;
        stealth.anim = anim("Stealth");
        stealth.anim2 = anim("StealthCancel");
        stealth.spawns = vec!["StealthFx".to_string()];
        stealth.is_friendly = true;

        let mut trample = ActionConfig::new(BOSS_TRAMPLE, "BossTrample", ActionLogic::Trample);
        trample.amount = 40.0;
        trample.splash_damage = 15.0;
        trample.exec_time_seconds = 1.0;
        trample.duration_seconds = 3.0;
        trample.move_speed = 12.0;
        trample.knockback_speed = 10.0;
        trample.knockback_duration = 0.4;
        trample.anim = anim("TrampleStart");
        trample.anim2 = anim("TrampleStop");
        trample.spawns = vec!["TrampleFx".to_string()];

        let mut pick_up = ActionConfig::new(PICK_UP, "PickUp", ActionLogic::PickUp);
        pick_up.range = 2.0;
        pick_up.duration_seconds = 1.0;
        pick_up.anim = anim("PickUp");
        pick_up.is_friendly = true;

        let mut drop = ActionConfig::new(DROP, "Drop", ActionLogic::Drop);
        drop.exec_time_seconds = 0.5;
        drop.anim = anim("Drop");
        drop.is_friendly = true;

        let mut revive = ActionConfig::new(GENERAL_REVIVE, "GeneralRevive", ActionLogic::Revive);
        revive.amount = 50.0;
        revive.range = 2.0;
        revive.exec_time_seconds = 1.0;
        revive.duration_seconds = 2.0;
        revive.anim = anim("Revive");
        revive.anim2 = anim("ReviveCancel");
        revive.action_interruptible = true;
        revive.is_friendly = true;

        Self::new(
            vec![
                chase,
                target,
                stunned,
                emote,
                tank_attack,
                archer_attack,
                charged_shot,
                volley,
                shield,
                dash,
                stealth,
                trample,
                pick_up,
                drop,
                revive,
            ],
            GENERAL_CHASE,
            GENERAL_TARGET,
            STUNNED,
        )
    }
}
