use glam::Vec2;
use rand::Rng;

use emberfall_shared::{MapPayload, Tile};

// ============================================================================
// SPAWN REGIONS
// ============================================================================

/// A rectangle of the map that continuously repopulates itself with enemies.
#[derive(Clone, Debug)]
pub struct SpawnRegion {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    /// Enemy definition ids with relative weights.
    pub weights: Vec<(String, f32)>,
    /// Population cap counted over enemies inside the rectangle.
    pub max_alive: usize,
    /// Spawns per second once under the cap.
    pub rate: f32,
}

impl SpawnRegion {
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.x as f32
            && p.x < (self.x + self.w) as f32
            && p.y >= self.y as f32
            && p.y < (self.y + self.h) as f32
    }

    /// Weighted draw from the region's enemy table.
    pub fn pick_enemy(&self, rng: &mut impl Rng) -> Option<&str> {
        let total: f32 = self.weights.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return None;
        }
        let mut roll = rng.gen_range(0.0..total);
        for (id, weight) in &self.weights {
            if roll < *weight {
                return Some(id);
            }
            roll -= weight;
        }
        self.weights.last().map(|(id, _)| id.as_str())
    }
}

// ============================================================================
// MAP
// ============================================================================

/// Immutable-per-instance tile grid with walkability queries.
#[derive(Clone, Debug)]
pub struct GameMap {
    width: u32,
    height: u32,
    tiles: Vec<Tile>,
    pub regions: Vec<SpawnRegion>,
}

impl GameMap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tiles: vec![Tile::Void; (width * height) as usize],
            regions: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: i32, y: i32) -> Tile {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return Tile::Void;
        }
        self.tiles[(y as u32 * self.width + x as u32) as usize]
    }

    pub fn set(&mut self, x: i32, y: i32, tile: Tile) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        self.tiles[(y as u32 * self.width + x as u32) as usize] = tile;
    }

    pub fn is_walkable(&self, x: i32, y: i32) -> bool {
        self.get(x, y).is_walkable()
    }

    /// Walkability of the tile under a world-space point.
    pub fn point_walkable(&self, p: Vec2) -> bool {
        self.is_walkable(p.x.floor() as i32, p.y.floor() as i32)
    }

    /// Whether a wall tile sits under the point (projectile kill check).
    pub fn point_blocks_projectiles(&self, p: Vec2) -> bool {
        self.get(p.x.floor() as i32, p.y.floor() as i32).blocks_projectiles()
    }

    /// A circle of `radius` can stand at `p` when the center and all four
    /// radius corners rest on walkable tiles.
    pub fn can_stand(&self, p: Vec2, radius: f32) -> bool {
        self.point_walkable(p)
            && self.point_walkable(p + Vec2::new(radius, radius))
            && self.point_walkable(p + Vec2::new(radius, -radius))
            && self.point_walkable(p + Vec2::new(-radius, radius))
            && self.point_walkable(p + Vec2::new(-radius, -radius))
    }

    /// The position new players are placed at: the centroid of the spawn
    /// tiles, or the map center when the map has none.
    pub fn spawn_point(&self) -> Vec2 {
        let mut sum = Vec2::ZERO;
        let mut count = 0u32;
        let mut first = None;
        for y in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                if self.get(x, y) == Tile::Spawn {
                    let center = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                    sum += center;
                    count += 1;
                    first.get_or_insert(center);
                }
            }
        }
        if count == 0 {
            return Vec2::new(self.width as f32 / 2.0, self.height as f32 / 2.0);
        }
        let centroid = sum / count as f32;
        if self.point_walkable(centroid) {
            centroid
        } else {
            first.unwrap()
        }
    }

    /// Samples a random walkable position inside a region rectangle,
    /// giving up after 20 attempts (dense wall regions stay quiet).
    pub fn random_point_in(&self, region: &SpawnRegion, rng: &mut impl Rng) -> Option<Vec2> {
        for _ in 0..20 {
            let x = rng.gen_range(region.x as f32..(region.x + region.w) as f32);
            let y = rng.gen_range(region.y as f32..(region.y + region.h) as f32);
            let p = Vec2::new(x, y);
            if self.point_walkable(p) {
                return Some(p);
            }
        }
        None
    }

    pub fn to_payload(&self) -> MapPayload {
        MapPayload {
            width: self.width,
            height: self.height,
            tiles: self.tiles.iter().map(|t| t.code()).collect(),
        }
    }

    /// Fills a rectangle with a tile, clipped to the map bounds.
    pub fn fill(&mut self, x: i32, y: i32, w: i32, h: i32, tile: Tile) {
        for ty in y..y + h {
            for tx in x..x + w {
                self.set(tx, ty, tile);
            }
        }
    }

    /// Turns every void cell bordering a walkable cell into a wall so the
    /// carved interior is fully rimmed.
    pub fn rim_with_walls(&mut self) {
        let mut walls = Vec::new();
        for y in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                if self.get(x, y) != Tile::Void {
                    continue;
                }
                'scan: for dy in -1..=1 {
                    for dx in -1..=1 {
                        if self.get(x + dx, y + dy).is_walkable() {
                            walls.push((x, y));
                            break 'scan;
                        }
                    }
                }
            }
        }
        for (x, y) in walls {
            self.set(x, y, Tile::Wall);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn open_map() -> GameMap {
        let mut map = GameMap::new(10, 10);
        map.fill(0, 0, 10, 10, Tile::Floor);
        map
    }

    #[test]
    fn test_out_of_bounds_is_void() {
        let map = open_map();
        assert_eq!(map.get(-1, 0), Tile::Void);
        assert_eq!(map.get(0, 10), Tile::Void);
        assert!(!map.is_walkable(10, 10));
    }

    #[test]
    fn test_can_stand_respects_radius_corners() {
        let mut map = open_map();
        map.set(6, 5, Tile::Wall);
        // Center clear of the wall: fine.
        assert!(map.can_stand(Vec2::new(5.0, 5.5), 0.35));
        // Nudged so a radius corner pokes into the wall tile.
        assert!(!map.can_stand(Vec2::new(5.8, 5.5), 0.35));
    }

    #[test]
    fn test_spawn_point_prefers_spawn_tiles() {
        let mut map = open_map();
        map.set(2, 3, Tile::Spawn);
        map.set(3, 3, Tile::Spawn);
        let spawn = map.spawn_point();
        assert!((spawn.x - 3.0).abs() < 0.01);
        assert!((spawn.y - 3.5).abs() < 0.01);
    }

    #[test]
    fn test_region_sampling_avoids_walls() {
        let mut map = GameMap::new(10, 10);
        // Only one walkable tile in the region.
        map.set(1, 1, Tile::Floor);
        let region = SpawnRegion {
            x: 0,
            y: 0,
            w: 4,
            h: 4,
            weights: vec![("pirate".into(), 1.0)],
            max_alive: 4,
            rate: 1.0,
        };
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..50 {
            if let Some(p) = map.random_point_in(&region, &mut rng) {
                assert!(map.point_walkable(p));
            }
        }
    }

    #[test]
    fn test_weighted_pick_honors_zero_weight() {
        let region = SpawnRegion {
            x: 0,
            y: 0,
            w: 1,
            h: 1,
            weights: vec![("pirate".into(), 0.0), ("demon".into(), 1.0)],
            max_alive: 1,
            rate: 1.0,
        };
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        for _ in 0..50 {
            assert_eq!(region.pick_enemy(&mut rng), Some("demon"));
        }
    }
}
