use super::config::ActionId;
use crate::math::Vec3;
use crate::world::EntityId;
use serde::{Deserialize, Serialize};

/// One action invocation, as requested by a client and echoed by the server
/// to every client that should visualize it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionRequestData {
    pub action_id: ActionId,
    pub position: Vec3,
    pub direction: Vec3,
    /// `None` means the request is untargeted.
    pub target_ids: Option<Vec<EntityId>>,
    /// Meaning depends on the action (chase stop distance, for example).
    pub amount: f32,
    /// Wait behind the current queue instead of interrupting it.
    pub should_queue: bool,
    /// Close to within range of the first target before running.
    pub should_close: bool,
    /// Stop the character's movement before playing.
    pub cancel_movement: bool,
}

impl ActionRequestData {
    pub fn new(action_id: ActionId) -> Self {
        Self {
            action_id,
            ..Self::default()
        }
    }

    pub fn with_targets(mut self, targets: Vec<EntityId>) -> Self {
        self.target_ids = Some(targets);
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_direction(mut self, direction: Vec3) -> Self {
        self.direction = direction;
        self
    }

    pub fn queued(mut self) -> Self {
        self.should_queue = true;
        self
    }

    pub fn closing(mut self) -> Self {
        self.should_close = true;
        self
    }

    /// First requested target, if any.
    pub fn primary_target(&self) -> Option<EntityId> {
        self.target_ids.as_ref().and_then(|t| t.first().copied())
    }
}

/// Identity comparison: the queueing flags describe how a request is
/// scheduled, not which action it is, so they are not compared.
impl PartialEq for ActionRequestData {
    fn eq(&self, other: &Self) -> bool {
        self.action_id == other.action_id
            && self.position == other.position
            && self.direction == other.direction
            && self.amount == other.amount
            && self.target_ids == other.target_ids
            && self.cancel_movement == other.cancel_movement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_ignores_queueing_flags() {
        let a = ActionRequestData::new(ActionId(4)).with_targets(vec![7]);
        let mut b = a.clone();
        b.should_queue = true;
        b.should_close = true;

        assert_eq!(a, b);
    }

    #[test]
    fn test_equality_compares_cancel_movement() {
        let a = ActionRequestData::new(ActionId(4)).with_targets(vec![7]);
        let mut b = a.clone();
        b.cancel_movement = true;

        assert_ne!(a, b);
    }

    #[test]
    fn test_equality_compares_targets() {
        let a = ActionRequestData::new(ActionId(4)).with_targets(vec![7]);
        let b = ActionRequestData::new(ActionId(4)).with_targets(vec![8]);
        let untargeted = ActionRequestData::new(ActionId(4));

        assert_ne!(a, b);
        assert_ne!(a, untargeted);
        assert_eq!(untargeted, ActionRequestData::new(ActionId(4)));
    }

    #[test]
    fn test_primary_target() {
        let untargeted = ActionRequestData::new(ActionId(1));
        assert_eq!(untargeted.primary_target(), None);

        let empty = ActionRequestData::new(ActionId(1)).with_targets(vec![]);
        assert_eq!(empty.primary_target(), None);

        let targeted = ActionRequestData::new(ActionId(1)).with_targets(vec![3, 4]);
        assert_eq!(targeted.primary_target(), Some(3));
    }

    #[test]
    fn test_request_wire_encoding() {
        let request = ActionRequestData::new(ActionId(9))
            .with_position(Vec3::new(1.0, 0.0, 2.0))
            .with_targets(vec![11])
            .closing();

        let bytes = bincode::serialize(&request).unwrap();
        let decoded: ActionRequestData = bincode::deserialize(&bytes).unwrap();

        assert_eq!(decoded, request);
        assert!(decoded.should_close);
        assert!(!decoded.should_queue);
    }
}
