use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

/// Identifies one connected client machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub u32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_squared(self, other: Vec2) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }

    pub fn dot(self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Transform {
    pub position: Vec2,
    pub rotation_radians: Option<f32>,
}

impl Transform {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            rotation_radians: None,
        }
    }

    /// Unit look direction. An unrotated transform faces +x.
    pub fn facing(&self) -> Vec2 {
        let angle = self.rotation_radians.unwrap_or(0.0);
        Vec2 {
            x: angle.cos(),
            y: angle.sin(),
        }
    }
}

/// Whether a world instance is the authoritative server copy or a client replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetRole {
    Authority,
    Client(PeerId),
}

impl NetRole {
    pub fn has_authority(self) -> bool {
        matches!(self, Self::Authority)
    }

    pub fn peer(self) -> Option<PeerId> {
        match self {
            Self::Authority => None,
            Self::Client(peer) => Some(peer),
        }
    }
}

#[derive(Debug, Default)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_hands_out_sequential_ids() {
        let mut allocator = EntityIdAllocator::default();
        assert_eq!(allocator.allocate(), EntityId(0));
        assert_eq!(allocator.allocate(), EntityId(1));
        assert_eq!(allocator.allocate(), EntityId(2));
    }

    #[test]
    fn facing_defaults_to_positive_x() {
        let facing = Transform::default().facing();
        assert!((facing.x - 1.0).abs() < 1e-6);
        assert!(facing.y.abs() < 1e-6);
    }

    #[test]
    fn facing_follows_rotation() {
        let transform = Transform {
            position: Vec2::ZERO,
            rotation_radians: Some(std::f32::consts::FRAC_PI_2),
        };
        let facing = transform.facing();
        assert!(facing.x.abs() < 1e-6);
        assert!((facing.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn distance_squared_is_symmetric() {
        let a = Vec2::new(1.0, 2.0);
        let b = Vec2::new(4.0, 6.0);
        assert_eq!(a.distance_squared(b), 25.0);
        assert_eq!(b.distance_squared(a), 25.0);
    }

    #[test]
    fn only_authority_role_has_authority() {
        assert!(NetRole::Authority.has_authority());
        assert!(!NetRole::Client(PeerId(3)).has_authority());
        assert_eq!(NetRole::Client(PeerId(3)).peer(), Some(PeerId(3)));
        assert_eq!(NetRole::Authority.peer(), None);
    }
}
