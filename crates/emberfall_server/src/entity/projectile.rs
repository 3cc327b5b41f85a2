use glam::Vec2;

use emberfall_shared::PROJECTILE_MAX_HITS;

use crate::entity::EntityId;
use crate::map::GameMap;

/// Which team fired a projectile; it only collides with the other side.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Side {
    Player,
    Enemy,
}

/// Everything needed to materialize a projectile, produced by weapons and
/// enemy attacks and turned into a live entity by the instance.
#[derive(Clone, Debug)]
pub struct ProjectileSpawn {
    pub owner: EntityId,
    pub side: Side,
    pub def_id: String,
    pub pos: Vec2,
    pub angle: f32,
    pub speed: f32,
    pub radius: f32,
    pub damage: i32,
    pub pierce: bool,
    pub lifetime: f64,
}

// ============================================================================
// PROJECTILE ENTITY
// ============================================================================

pub struct Projectile {
    pub id: EntityId,
    pub owner: EntityId,
    pub side: Side,
    pub def_id: String,
    pub pos: Vec2,
    pub vel: Vec2,
    pub radius: f32,
    pub damage: i32,
    pub pierce: bool,
    pub lifetime: f64,
    pub spawned_at: f64,
    hits: Vec<EntityId>,
    pub removed: bool,
}

impl Projectile {
    pub fn from_spawn(id: EntityId, spawn: ProjectileSpawn, now: f64) -> Self {
        Self {
            id,
            owner: spawn.owner,
            side: spawn.side,
            def_id: spawn.def_id,
            pos: spawn.pos,
            vel: Vec2::new(spawn.angle.cos(), spawn.angle.sin()) * spawn.speed,
            radius: spawn.radius,
            damage: spawn.damage,
            pierce: spawn.pierce,
            lifetime: spawn.lifetime,
            spawned_at: now,
            hits: Vec::new(),
            removed: false,
        }
    }

    /// Ballistic step; dies on wall tiles and on lifetime exhaustion.
    pub fn update(&mut self, dt: f64, now: f64, map: &GameMap) {
        self.pos += self.vel * dt as f32;
        if now - self.spawned_at >= self.lifetime || map.point_blocks_projectiles(self.pos) {
            self.removed = true;
        }
    }

    pub fn angle(&self) -> f32 {
        self.vel.y.atan2(self.vel.x)
    }

    pub fn has_hit(&self, id: EntityId) -> bool {
        self.hits.contains(&id)
    }

    /// Records a hit; returns false when the set is full, which stops a
    /// long-lived piercing projectile from growing without bound.
    pub fn record_hit(&mut self, id: EntityId) -> bool {
        if self.hits.len() >= PROJECTILE_MAX_HITS {
            return false;
        }
        self.hits.push(id);
        if !self.pierce {
            self.removed = true;
        }
        true
    }

    pub fn hit_count(&self) -> usize {
        self.hits.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::new_entity_id;
    use emberfall_shared::Tile;

    fn spawn() -> ProjectileSpawn {
        ProjectileSpawn {
            owner: new_entity_id(),
            side: Side::Player,
            def_id: "staff_bolt".into(),
            pos: Vec2::new(2.0, 2.0),
            angle: 0.0,
            speed: 10.0,
            radius: 0.25,
            damage: 20,
            pierce: false,
            lifetime: 0.5,
        }
    }

    #[test]
    fn test_dies_on_lifetime() {
        let map = {
            let mut m = crate::map::GameMap::new(32, 32);
            m.fill(0, 0, 32, 32, Tile::Floor);
            m
        };
        let mut p = Projectile::from_spawn(new_entity_id(), spawn(), 0.0);
        p.update(0.4, 0.4, &map);
        assert!(!p.removed);
        p.update(0.15, 0.55, &map);
        assert!(p.removed);
    }

    #[test]
    fn test_dies_on_wall() {
        let mut map = crate::map::GameMap::new(32, 32);
        map.fill(0, 0, 32, 32, Tile::Floor);
        map.set(3, 2, Tile::Wall);
        let mut p = Projectile::from_spawn(new_entity_id(), spawn(), 0.0);
        p.update(0.15, 0.15, &map); // reaches x=3.5 inside the wall tile
        assert!(p.removed);
    }

    #[test]
    fn test_non_piercing_removes_on_first_hit() {
        let mut p = Projectile::from_spawn(new_entity_id(), spawn(), 0.0);
        let victim = new_entity_id();
        assert!(p.record_hit(victim));
        assert!(p.removed);
        assert_eq!(p.hit_count(), 1);
        assert!(p.has_hit(victim));
    }

    #[test]
    fn test_piercing_hit_set_is_bounded() {
        let mut s = spawn();
        s.pierce = true;
        let mut p = Projectile::from_spawn(new_entity_id(), s, 0.0);
        for _ in 0..PROJECTILE_MAX_HITS {
            assert!(p.record_hit(new_entity_id()));
        }
        assert!(!p.removed);
        assert!(!p.record_hit(new_entity_id()));
        assert_eq!(p.hit_count(), PROJECTILE_MAX_HITS);
    }
}
