use glam::Vec2;
use rand::Rng;

use emberfall_shared::Tile;

use crate::game_data::DungeonDefinition;
use crate::map::{GameMap, SpawnRegion};

// ============================================================================
// FIXED LAYOUTS
// ============================================================================

/// The safe hub: open floor, a water fountain, spawn pad south of center.
pub fn nexus_map() -> GameMap {
    let mut map = GameMap::new(48, 48);
    map.fill(1, 1, 46, 46, Tile::Floor);
    map.fill(22, 22, 4, 4, Tile::Water);
    map.fill(21, 30, 6, 4, Tile::Spawn);
    map.rim_with_walls();
    map
}

/// World coordinates the nexus portals sit at.
pub fn nexus_portal_positions() -> (Vec2, Vec2) {
    let realm = Vec2::new(24.0, 14.0);
    let vault = Vec2::new(31.0, 14.0);
    (realm, vault)
}

/// The open hostile world: a large field with terrain blotches and four
/// quadrant spawn regions that get harder away from the center.
pub fn realm_map(rng: &mut impl Rng) -> GameMap {
    let size: i32 = 128;
    let mut map = GameMap::new(size as u32, size as u32);
    map.fill(1, 1, size - 2, size - 2, Tile::Floor);

    // Scatter lakes and lava pools.
    for _ in 0..24 {
        let w = rng.gen_range(3..8);
        let h = rng.gen_range(3..8);
        let x = rng.gen_range(4..size - 4 - w);
        let y = rng.gen_range(4..size - 4 - h);
        let center = size / 2;
        // Keep the spawn field clear.
        if (x - center).abs() < 12 && (y - center).abs() < 12 {
            continue;
        }
        let tile = if rng.gen_bool(0.6) { Tile::Water } else { Tile::Lava };
        map.fill(x, y, w, h, tile);
    }

    let center = size / 2;
    map.fill(center - 3, center - 3, 6, 6, Tile::Spawn);
    map.rim_with_walls();

    let half = size / 2;
    let quadrant = |x: i32, y: i32, weights: Vec<(String, f32)>, max_alive, rate| SpawnRegion {
        x,
        y,
        w: half - 4,
        h: half - 4,
        weights,
        max_alive,
        rate,
    };
    map.regions = vec![
        quadrant(
            2,
            2,
            vec![("pirate".into(), 0.8), ("pirate_brute".into(), 0.2)],
            10,
            0.25,
        ),
        quadrant(
            half + 2,
            2,
            vec![("sand_snake".into(), 0.7), ("dune_scorpion".into(), 0.3)],
            10,
            0.25,
        ),
        quadrant(
            2,
            half + 2,
            vec![("dune_scorpion".into(), 0.6), ("pirate".into(), 0.4)],
            8,
            0.2,
        ),
        quadrant(
            half + 2,
            half + 2,
            vec![("demon".into(), 0.3), ("pirate_brute".into(), 0.7)],
            6,
            0.1,
        ),
    ];
    map
}

/// A vault: one small sealed room, spawn pad at the south wall.
pub fn vault_map() -> GameMap {
    let mut map = GameMap::new(12, 12);
    map.fill(1, 1, 10, 10, Tile::Floor);
    map.fill(5, 8, 2, 2, Tile::Spawn);
    map.rim_with_walls();
    map
}

/// Where the vault chest entity sits.
pub fn vault_chest_position() -> Vec2 {
    Vec2::new(6.0, 4.0)
}

// ============================================================================
// PROCEDURAL DUNGEONS
// ============================================================================

#[derive(Clone, Copy, Debug)]
struct Room {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
}

impl Room {
    fn center(&self) -> (i32, i32) {
        (self.x + self.w / 2, self.y + self.h / 2)
    }

    fn center_pos(&self) -> Vec2 {
        let (cx, cy) = self.center();
        Vec2::new(cx as f32 + 0.5, cy as f32 + 0.5)
    }

    fn intersects_with_buffer(&self, other: &Room, buffer: i32) -> bool {
        self.x - buffer < other.x + other.w
            && self.x + self.w + buffer > other.x
            && self.y - buffer < other.y + other.h
            && self.y + self.h + buffer > other.y
    }

    fn in_bounds(&self, width: i32, height: i32) -> bool {
        self.x >= 1 && self.y >= 1 && self.x + self.w < width - 1 && self.y + self.h < height - 1
    }
}

/// Output of dungeon generation: the carved map plus the boss room center,
/// which the instance records for return-portal placement.
pub struct DungeonLayout {
    pub map: GameMap,
    pub boss_center: Vec2,
}

/// Branching room-and-corridor generation:
/// a start room seeds at left-center, then 12..18 rooms branch with a
/// direction bias to the right; the rightmost room becomes the boss room.
pub fn dungeon_map(def: &DungeonDefinition, rng: &mut impl Rng) -> DungeonLayout {
    let width: i32 = 120;
    let height: i32 = 80;
    let mut map = GameMap::new(width as u32, height as u32);

    let start_size = rng.gen_range(8..=14);
    let start = Room {
        x: 3,
        y: (height - start_size) / 2,
        w: start_size,
        h: start_size,
    };
    let mut rooms = vec![start];
    // parent[i] is the room the corridor to room i comes from
    let mut parents = vec![0usize];

    let target_rooms = rng.gen_range(12..=18);
    let mut attempts = 0;
    while rooms.len() < target_rooms && attempts < 400 {
        attempts += 1;
        let base_idx = rng.gen_range(0..rooms.len());
        let base = rooms[base_idx];
        let w = rng.gen_range(8..=14);
        let h = rng.gen_range(8..=14);
        let gap = rng.gen_range(6..=12);

        let roll: f32 = rng.gen();
        let candidate = if roll < 0.6 {
            // right
            Room { x: base.x + base.w + gap, y: base.center().1 - h / 2, w, h }
        } else if roll < 0.8 {
            // down
            Room { x: base.center().0 - w / 2, y: base.y + base.h + gap, w, h }
        } else {
            // up
            Room { x: base.center().0 - w / 2, y: base.y - gap - h, w, h }
        };

        if !candidate.in_bounds(width, height) {
            continue;
        }
        if rooms.iter().any(|r| candidate.intersects_with_buffer(r, 2)) {
            continue;
        }
        rooms.push(candidate);
        parents.push(base_idx);
    }

    // The rightmost room is the boss room; grow it to at least 12x12.
    let boss_idx = rooms
        .iter()
        .enumerate()
        .max_by_key(|(_, r)| r.x + r.w)
        .map(|(i, _)| i)
        .unwrap_or(0);
    {
        let room = &mut rooms[boss_idx];
        if room.w < 12 {
            room.x -= (12 - room.w) / 2;
            room.w = 12;
        }
        if room.h < 12 {
            room.y -= (12 - room.h) / 2;
            room.h = 12;
        }
        room.x = room.x.clamp(1, width - room.w - 1);
        room.y = room.y.clamp(1, height - room.h - 1);
    }

    // Corridors first so room tiles (and the boss floor) win the overlap.
    for (i, &parent) in parents.iter().enumerate().skip(1) {
        carve_corridor(&mut map, rooms[parent].center(), rooms[i].center());
    }
    for (i, room) in rooms.iter().enumerate() {
        let tile = if i == boss_idx { Tile::BossFloor } else { Tile::Floor };
        map.fill(room.x, room.y, room.w, room.h, tile);
    }

    // Start room interior doubles as the player spawn pad.
    map.fill(start.x + 1, start.y + 1, start.w - 2, start.h - 2, Tile::Spawn);
    map.rim_with_walls();

    // Populate regions: minions and guardians in ordinary rooms, the boss
    // plus a guardian escort in the boss room.
    let minion_weights: Vec<(String, f32)> =
        def.minions.iter().map(|id| (id.to_string(), 1.0)).collect();
    let guardian_weights: Vec<(String, f32)> =
        def.guardians.iter().map(|id| (id.to_string(), 1.0)).collect();

    for (i, room) in rooms.iter().enumerate() {
        if i == 0 {
            continue;
        }
        if i == boss_idx {
            map.regions.push(SpawnRegion {
                x: room.x,
                y: room.y,
                w: room.w,
                h: room.h,
                weights: vec![(def.boss.to_string(), 1.0)],
                max_alive: 1,
                rate: 1.0 / 120.0,
            });
            map.regions.push(SpawnRegion {
                x: room.x,
                y: room.y,
                w: room.w,
                h: room.h,
                weights: guardian_weights.clone(),
                max_alive: 2,
                rate: 0.05,
            });
        } else {
            map.regions.push(SpawnRegion {
                x: room.x,
                y: room.y,
                w: room.w,
                h: room.h,
                weights: minion_weights.clone(),
                max_alive: 4,
                rate: 0.2,
            });
            map.regions.push(SpawnRegion {
                x: room.x,
                y: room.y,
                w: room.w,
                h: room.h,
                weights: guardian_weights.clone(),
                max_alive: 1,
                rate: 0.05,
            });
        }
    }

    DungeonLayout {
        map,
        boss_center: rooms[boss_idx].center_pos(),
    }
}

/// A 2-tile-wide L-corridor: horizontal leg first, then vertical.
fn carve_corridor(map: &mut GameMap, from: (i32, i32), to: (i32, i32)) {
    let (x0, y0) = from;
    let (x1, y1) = to;
    let (lo, hi) = if x0 <= x1 { (x0, x1) } else { (x1, x0) };
    for x in lo..=hi {
        map.set(x, y0, Tile::Floor);
        map.set(x, y0 + 1, Tile::Floor);
    }
    let (lo, hi) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
    for y in lo..=hi {
        map.set(x1, y, Tile::Floor);
        map.set(x1 + 1, y, Tile::Floor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_data::DungeonDatabase;
    use rand::SeedableRng;

    #[test]
    fn test_nexus_has_spawn_pad_inside_walls() {
        let map = nexus_map();
        let spawn = map.spawn_point();
        assert!(map.point_walkable(spawn));
        assert!(map.can_stand(spawn, 0.35));
    }

    #[test]
    fn test_realm_has_four_regions() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let map = realm_map(&mut rng);
        assert_eq!(map.regions.len(), 4);
        assert!(map.point_walkable(map.spawn_point()));
    }

    #[test]
    fn test_dungeon_generation_is_connected_and_bounded() {
        let dungeons = DungeonDatabase::default();
        let def = dungeons.get("demon_lair").unwrap();
        for seed in 0..20 {
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let layout = dungeon_map(def, &mut rng);
            let map = &layout.map;

            // Spawn pad exists and is walkable.
            let spawn = map.spawn_point();
            assert!(map.point_walkable(spawn), "seed {}", seed);

            // Boss room carved with boss floor at its center.
            let bx = layout.boss_center.x.floor() as i32;
            let by = layout.boss_center.y.floor() as i32;
            assert_eq!(map.get(bx, by), Tile::BossFloor, "seed {}", seed);

            // Flood fill from spawn reaches the boss room center.
            let mut seen =
                vec![false; (map.width() * map.height()) as usize];
            let mut stack = vec![(spawn.x.floor() as i32, spawn.y.floor() as i32)];
            while let Some((x, y)) = stack.pop() {
                if x < 0 || y < 0 || x >= map.width() as i32 || y >= map.height() as i32 {
                    continue;
                }
                let idx = (y as u32 * map.width() + x as u32) as usize;
                if seen[idx] || !map.is_walkable(x, y) {
                    continue;
                }
                seen[idx] = true;
                stack.extend([(x + 1, y), (x - 1, y), (x, y + 1), (x, y - 1)]);
            }
            let boss_idx = (by as u32 * map.width() + bx as u32) as usize;
            assert!(seen[boss_idx], "seed {}: boss room unreachable", seed);

            // Regions exist: at least the two boss-room regions.
            assert!(map.regions.len() >= 2, "seed {}", seed);
            assert!(map
                .regions
                .iter()
                .any(|r| r.weights.iter().any(|(id, _)| id == "cube_overlord")));
        }
    }
}
