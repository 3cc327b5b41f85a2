use glam::Vec2;
use uuid::Uuid;

pub mod enemy;
pub mod loot;
pub mod player;
pub mod portal;
pub mod projectile;

pub use enemy::*;
pub use loot::*;
pub use player::*;
pub use portal::*;
pub use projectile::*;

pub use emberfall_shared::EntityId;

/// Mints a fresh globally-unique entity id.
pub fn new_entity_id() -> EntityId {
    Uuid::new_v4()
}

/// Circle-circle overlap test used by combat resolution.
pub fn circles_overlap(a: Vec2, ra: f32, b: Vec2, rb: f32) -> bool {
    a.distance_squared(b) <= (ra + rb) * (ra + rb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ids_are_unique() {
        let a = new_entity_id();
        let b = new_entity_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_circle_overlap() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(1.0, 0.0);
        assert!(circles_overlap(a, 0.6, b, 0.5));
        assert!(!circles_overlap(a, 0.3, b, 0.3));
    }
}
