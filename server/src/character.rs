//! Authoritative character state.

use crate::action_player::ServerActionPlayer;
use crate::movement::Movement;
use serde::{Deserialize, Serialize};
use shared::protocol::CharacterSnapshot;
use shared::{ClientId, EntityId, LifeState, Vec3};

/// Playable classes and the NPC kinds populating the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacterClass {
    Tank,
    Archer,
    Rogue,
    Imp,
    Boss,
}

impl CharacterClass {
    const PLAYABLE: [CharacterClass; 3] = [CharacterClass::Tank, CharacterClass::Archer, CharacterClass::Rogue];

    pub fn base_hp(self) -> i32 {
        match self {
            CharacterClass::Tank => 150,
            CharacterClass::Archer => 100,
            CharacterClass::Rogue => 110,
            CharacterClass::Imp => 40,
            CharacterClass::Boss => 600,
        }
    }

    pub fn move_speed(self) -> f32 {
        match self {
            CharacterClass::Tank => 5.0,
            CharacterClass::Archer => 5.5,
            CharacterClass::Rogue => 6.5,
            CharacterClass::Imp => 4.0,
            CharacterClass::Boss => 3.5,
        }
    }

    pub fn is_npc(self) -> bool {
        matches!(self, CharacterClass::Imp | CharacterClass::Boss)
    }

    /// A stable playable class for a player, so a reconnecting player comes
    /// back as the same class.
    pub fn for_player(player_id: &str) -> Self {
        let hash = player_id
            .bytes()
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
        Self::PLAYABLE[hash % Self::PLAYABLE.len()]
    }
}

#[derive(Debug)]
pub struct ServerCharacter {
    pub id: EntityId,
    pub name: String,
    pub class: CharacterClass,
    pub hit_points: i32,
    pub life_state: LifeState,
    pub position: Vec3,
    pub facing: Vec3,
    pub target: Option<EntityId>,
    pub held_object: Option<EntityId>,
    pub is_stealthy: bool,
    pub movement: Movement,
    /// The connection controlling this character; `None` for NPCs.
    pub client_id: Option<ClientId>,
    /// Animation triggers fired since the last drain.
    pub animation_triggers: Vec<String>,
    /// Detached while one of its own hooks is running.
    pub(crate) actions: Option<ServerActionPlayer>,
}

impl ServerCharacter {
    pub fn new(
        id: EntityId,
        name: &str,
        class: CharacterClass,
        position: Vec3,
        client_id: Option<ClientId>,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            class,
            hit_points: class.base_hp(),
            life_state: LifeState::Alive,
            position,
            facing: Vec3::FORWARD,
            target: None,
            held_object: None,
            is_stealthy: false,
            movement: Movement::new(class.move_speed()),
            client_id,
            animation_triggers: Vec::new(),
            actions: Some(ServerActionPlayer::new(id)),
        }
    }

    pub fn is_npc(&self) -> bool {
        self.class.is_npc()
    }

    pub fn is_alive(&self) -> bool {
        self.life_state == LifeState::Alive
    }

    /// Characters only take orders while alive and in control of their legs.
    pub fn can_act(&self) -> bool {
        self.is_alive() && !self.movement.is_performing_forced_movement()
    }

    /// Sets hit points within `0..=base_hp`, updating the life state when
    /// they run out. Returns `true` if the character just went down.
    pub fn set_hit_points(&mut self, hit_points: i32) -> bool {
        self.hit_points = hit_points.clamp(0, self.class.base_hp());
        if self.hit_points > 0 {
            return false;
        }
        let was_alive = self.is_alive();
        // players can be revived, NPCs cannot
        self.life_state = if self.is_npc() {
            LifeState::Dead
        } else {
            LifeState::Fainted
        };
        self.movement.cancel_move();
        was_alive
    }

    pub fn snapshot(&self) -> CharacterSnapshot {
        CharacterSnapshot {
            id: self.id,
            name: self.name.clone(),
            is_npc: self.is_npc(),
            position: self.position,
            facing: self.facing,
            hit_points: self.hit_points,
            life_state: self.life_state,
            target: self.target,
            held_object: self.held_object,
            is_stealthy: self.is_stealthy,
            is_moving: self.movement.is_moving(),
            forced_movement: self.movement.is_performing_forced_movement(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_players_faint_and_npcs_die() {
        let mut tank = ServerCharacter::new(1, "Tank", CharacterClass::Tank, Vec3::ZERO, Some(4));
        assert!(tank.set_hit_points(-20));
        assert_eq!(tank.hit_points, 0);
        assert_eq!(tank.life_state, LifeState::Fainted);
        assert!(!tank.can_act());

        let mut imp = ServerCharacter::new(2, "Imp", CharacterClass::Imp, Vec3::ZERO, None);
        assert!(imp.set_hit_points(0));
        assert_eq!(imp.life_state, LifeState::Dead);
        // already down
        assert!(!imp.set_hit_points(0));
    }

    #[test]
    fn test_hit_points_clamped_to_class_max() {
        let mut archer = ServerCharacter::new(1, "Archer", CharacterClass::Archer, Vec3::ZERO, Some(1));
        archer.set_hit_points(500);
        assert_eq!(archer.hit_points, 100);
    }

    #[test]
    fn test_forced_movement_blocks_acting() {
        let mut rogue = ServerCharacter::new(1, "Rogue", CharacterClass::Rogue, Vec3::ZERO, Some(1));
        assert!(rogue.can_act());
        rogue.movement.start_knockback(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 5.0, 1.0);
        assert!(!rogue.can_act());
    }

    #[test]
    fn test_class_for_player_is_stable() {
        let class = CharacterClass::for_player("player-1");
        assert_eq!(CharacterClass::for_player("player-1"), class);
        assert!(!class.is_npc());
    }
}
