//! Character locomotion on the arena floor.
//!
//! Movement is a small state machine stepped once per tick: walking to a
//! point, following another character, and the two forced moves actions
//! impose (a forward charge and a knockback). While a forced move runs the
//! character cannot act or be steered.

use shared::{EntityId, Vec3};

/// A follower stops this far from the character it follows.
const FOLLOW_STOP_DISTANCE: f32 = 1.0;

///Represents what a character's legs are doing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MovementState {
    #[default]
    Idle,
    PathFollowing {
        destination: Vec3,
    },
    Following {
        target: EntityId,
    },
    Charging {
        direction: Vec3,
        speed: f32,
        until: f32,
    },
    Knockback {
        velocity: Vec3,
        until: f32,
    },
}

#[derive(Debug, Clone)]
pub struct Movement {
    pub state: MovementState,
    /// Walking speed in meters per second.
    pub speed: f32,
}

impl Movement {
    pub fn new(speed: f32) -> Self {
        Self {
            state: MovementState::Idle,
            speed,
        }
    }

    pub fn is_moving(&self) -> bool {
        self.state != MovementState::Idle
    }

    pub fn is_performing_forced_movement(&self) -> bool {
        matches!(
            self.state,
            MovementState::Charging { .. } | MovementState::Knockback { .. }
        )
    }

    pub fn set_destination(&mut self, destination: Vec3) {
        self.state = MovementState::PathFollowing { destination };
    }

    pub fn follow(&mut self, target: EntityId) {
        self.state = MovementState::Following { target };
    }

    pub fn cancel_move(&mut self) {
        self.state = MovementState::Idle;
    }

    pub fn start_forward_charge(&mut self, facing: Vec3, speed: f32, until: f32) {
        self.state = MovementState::Charging {
            direction: facing.flat().normalize(),
            speed,
            until,
        };
    }

    /// Pushes the character directly away from `from`.
    pub fn start_knockback(&mut self, position: Vec3, from: Vec3, speed: f32, until: f32) {
        let mut direction = (position - from).flat().normalize();
        if direction == Vec3::ZERO {
            direction = Vec3::FORWARD;
        }
        self.state = MovementState::Knockback {
            velocity: direction.scale(speed),
            until,
        };
    }

    ///Advances the movement by `dt` seconds.
    /// Returns the new position and facing. `follow_target` is the current
    /// position of the followed character, if there is one.
    pub fn step(
        &mut self,
        position: Vec3,
        facing: Vec3,
        follow_target: Option<Vec3>,
        dt: f32,
        now: f32,
    ) -> (Vec3, Vec3) {
        match self.state {
            MovementState::Idle => (position, facing),
            MovementState::PathFollowing { destination } => {
                let destination = Vec3::new(destination.x, position.y, destination.z);
                let next = position.move_towards(&destination, self.speed * dt);
                if next == destination {
                    self.state = MovementState::Idle;
                }
                (next, Self::face_along(position, next, facing))
            }
            MovementState::Following { .. } => {
                let Some(target) = follow_target else {
                    self.state = MovementState::Idle;
                    return (position, facing);
                };
                let target = Vec3::new(target.x, position.y, target.z);
                let gap = position.distance(&target) - FOLLOW_STOP_DISTANCE;
                if gap <= 0.0 {
                    return (position, Self::face_along(position, target, facing));
                }
                let next = position.move_towards(&target, (self.speed * dt).min(gap));
                (next, Self::face_along(position, target, facing))
            }
            MovementState::Charging {
                direction,
                speed,
                until,
            } => {
                if now >= until {
                    self.state = MovementState::Idle;
                    return (position, facing);
                }
                (position + direction.scale(speed * dt), facing)
            }
            MovementState::Knockback { velocity, until } => {
                if now >= until {
                    self.state = MovementState::Idle;
                    return (position, facing);
                }
                (position + velocity.scale(dt), facing)
            }
        }
    }

    fn face_along(from: Vec3, to: Vec3, fallback: Vec3) -> Vec3 {
        let direction = (to - from).flat().normalize();
        if direction == Vec3::ZERO {
            fallback
        } else {
            direction
        }
    }
}
