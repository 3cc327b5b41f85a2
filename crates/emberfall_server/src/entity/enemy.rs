use std::collections::HashMap;

use glam::Vec2;
use rand::Rng;

use emberfall_shared::ENEMY_TARGET_RANGE;

use crate::entity::{EntityId, ProjectileSpawn, Side};
use crate::game_data::{AttackDefinition, Behavior, EnemyDefinition, GameData};
use crate::map::GameMap;

/// What an enemy knows about a player when aiming: position plus the
/// observed movement for predictive shots.
#[derive(Clone, Copy, Debug)]
pub struct TargetInfo {
    pub id: EntityId,
    pub pos: Vec2,
    pub move_dir: Vec2,
    pub speed: f32,
}

// ============================================================================
// ENEMY ENTITY
// ============================================================================

pub struct Enemy {
    pub id: EntityId,
    pub def_id: String,
    pub pos: Vec2,
    pub radius: f32,
    pub hp: i32,
    pub max_hp: i32,
    /// Weak reference by id; never keeps a player alive.
    pub target: Option<EntityId>,
    attack_last_fired: Vec<f64>,
    wander_target: Option<Vec2>,
    wander_timer: f64,
    orbit_angle: f32,
    pub phase_index: usize,
    phase_timer: f64,
    pub resting: bool,
    /// Attacker id -> cumulative damage, for loot attribution.
    pub damage_by_player: HashMap<EntityId, i64>,
    pub removed: bool,
}

impl Enemy {
    pub fn from_def(id: EntityId, def: &EnemyDefinition, pos: Vec2) -> Self {
        Self {
            id,
            def_id: def.id.to_string(),
            pos,
            radius: def.radius,
            hp: def.max_hp,
            max_hp: def.max_hp,
            target: None,
            attack_last_fired: vec![f64::NEG_INFINITY; def.attacks.len()],
            wander_target: None,
            wander_timer: 0.0,
            orbit_angle: 0.0,
            phase_index: 0,
            phase_timer: 0.0,
            resting: false,
            damage_by_player: HashMap::new(),
            removed: false,
        }
    }

    pub fn hp_percent(&self) -> f32 {
        100.0 * self.hp as f32 / self.max_hp as f32
    }

    pub fn record_damage(&mut self, attacker: EntityId, amount: i64) {
        *self.damage_by_player.entry(attacker).or_insert(0) += amount;
    }

    /// One simulation step: acquire a target, run the behavior, advance the
    /// phase machine, and fire any attacks that are off cooldown.
    pub fn update(
        &mut self,
        dt: f64,
        now: f64,
        def: &EnemyDefinition,
        targets: &[TargetInfo],
        map: &GameMap,
        data: &GameData,
        rng: &mut impl Rng,
    ) -> Vec<ProjectileSpawn> {
        let target = self.acquire_target(targets);
        self.run_behavior(dt, def, target.as_ref(), map, rng);
        if !def.phases.is_empty() {
            self.update_phase(dt, def);
        }
        self.fire_attacks(now, def, target.as_ref(), data)
    }

    /// Nearest player within range wins; none clears the reference.
    fn acquire_target(&mut self, targets: &[TargetInfo]) -> Option<TargetInfo> {
        let nearest = targets
            .iter()
            .map(|t| (t, self.pos.distance(t.pos)))
            .filter(|(_, d)| *d <= ENEMY_TARGET_RANGE)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(t, _)| *t);
        self.target = nearest.map(|t| t.id);
        nearest
    }

    // ------------------------------------------------------------------------
    // Behavior
    // ------------------------------------------------------------------------

    fn run_behavior(
        &mut self,
        dt: f64,
        def: &EnemyDefinition,
        target: Option<&TargetInfo>,
        map: &GameMap,
        rng: &mut impl Rng,
    ) {
        match def.behavior {
            Behavior::Wander => self.wander(dt, def, map, rng),
            Behavior::Chase { range } => match target {
                Some(t) if self.pos.distance(t.pos) <= range => self.chase(dt, def, t, map),
                _ => self.wander(dt, def, map, rng),
            },
            Behavior::Orbit { range, orbit_speed } => match target {
                Some(t) => self.orbit(dt, def, t, range, orbit_speed, map),
                None => self.wander(dt, def, map, rng),
            },
            Behavior::Stationary => {}
        }
    }

    /// Jittery axis-sign stepping toward a random nearby point.
    fn wander(&mut self, dt: f64, def: &EnemyDefinition, map: &GameMap, rng: &mut impl Rng) {
        if def.speed <= 0.0 {
            return;
        }
        self.wander_timer -= dt;
        let reached = self
            .wander_target
            .map(|t| self.pos.distance(t) < 0.2)
            .unwrap_or(true);
        if self.wander_timer <= 0.0 || reached {
            self.wander_target = Some(
                self.pos
                    + Vec2::new(rng.gen_range(-3.0..=3.0), rng.gen_range(-3.0..=3.0)),
            );
            self.wander_timer = rng.gen_range(1.0..3.0);
        }
        let Some(target) = self.wander_target else {
            return;
        };
        let diff = target - self.pos;
        let step = Vec2::new(diff.x.signum(), diff.y.signum()) * def.speed * dt as f32;
        if !self.try_move(self.pos + step, map) {
            // Stuck against geometry; pick a new point next tick.
            self.wander_timer = 0.0;
        }
    }

    /// Close distance but hold back half the opening attack's range.
    fn chase(&mut self, dt: f64, def: &EnemyDefinition, target: &TargetInfo, map: &GameMap) {
        let hold_back = def
            .attacks
            .first()
            .map(|a| (a.range * 0.5).max(2.0))
            .unwrap_or(2.0);
        let dist = self.pos.distance(target.pos);
        if dist <= hold_back || def.speed <= 0.0 {
            return;
        }
        let dir = (target.pos - self.pos) / dist;
        let step = dir * def.speed * dt as f32;
        self.try_move(self.pos + step, map);
    }

    /// Circle the target at `range`, closing first when too far out.
    fn orbit(
        &mut self,
        dt: f64,
        def: &EnemyDefinition,
        target: &TargetInfo,
        range: f32,
        orbit_speed: f32,
        map: &GameMap,
    ) {
        if def.speed <= 0.0 {
            return;
        }
        let dist = self.pos.distance(target.pos);
        if dist > range + 1.0 {
            let dir = (target.pos - self.pos) / dist;
            self.try_move(self.pos + dir * def.speed * dt as f32, map);
            return;
        }
        self.orbit_angle += orbit_speed * dt as f32;
        let desired =
            target.pos + range * Vec2::new(self.orbit_angle.cos(), self.orbit_angle.sin());
        let diff = desired - self.pos;
        if diff.length_squared() > f32::EPSILON {
            let step = diff.normalize() * def.speed * dt as f32;
            self.try_move(self.pos + step, map);
        }
    }

    fn try_move(&mut self, to: Vec2, map: &GameMap) -> bool {
        if map.can_stand(to, self.radius) {
            self.pos = to;
            true
        } else {
            false
        }
    }

    // ------------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------------

    /// Selects the phase from the current hp percentage, then walks the
    /// attack/rest cycle of that phase.
    fn update_phase(&mut self, dt: f64, def: &EnemyDefinition) {
        let hp_pct = self.hp_percent();
        let mut index = 0;
        for (i, phase) in def.phases.iter().enumerate() {
            if phase.hp_percent >= hp_pct {
                index = i;
            }
        }
        if index != self.phase_index {
            self.phase_index = index;
            self.phase_timer = 0.0;
            self.resting = false;
        }
        let phase = &def.phases[self.phase_index];
        self.phase_timer += dt;
        if self.resting {
            if self.phase_timer >= phase.rest_duration as f64 {
                self.resting = false;
                self.phase_timer = 0.0;
            }
        } else if self.phase_timer >= phase.attack_duration as f64 {
            self.resting = true;
            self.phase_timer = 0.0;
        }
    }

    // ------------------------------------------------------------------------
    // Attacks
    // ------------------------------------------------------------------------

    fn fire_attacks(
        &mut self,
        now: f64,
        def: &EnemyDefinition,
        target: Option<&TargetInfo>,
        data: &GameData,
    ) -> Vec<ProjectileSpawn> {
        let Some(target) = target else {
            return Vec::new();
        };
        if !def.phases.is_empty() && self.resting {
            return Vec::new();
        }
        let mut spawns = Vec::new();
        for (idx, attack) in def.attacks.iter().enumerate() {
            if !def.phases.is_empty()
                && !def.phases[self.phase_index].attack_indices.contains(&idx)
            {
                continue;
            }
            if now - self.attack_last_fired[idx] < 1.0 / attack.rate_of_fire as f64 {
                continue;
            }
            if self.pos.distance(target.pos) > attack.range {
                continue;
            }
            self.attack_last_fired[idx] = now;
            spawns.extend(self.fire_fan(attack, target, data));
        }
        spawns
    }

    /// Spawns the attack's projectile fan. An odd count centers one shot on
    /// the aim; an even count straddles it by half the arc gap, leaving a
    /// safe corridor straight at the target.
    fn fire_fan(
        &self,
        attack: &AttackDefinition,
        target: &TargetInfo,
        data: &GameData,
    ) -> Vec<ProjectileSpawn> {
        let Some(projectile) = data.projectiles.get(attack.projectile) else {
            return Vec::new();
        };
        let aim_at = if attack.predictive {
            let time_of_flight = self.pos.distance(target.pos) / projectile.speed;
            target.pos + target.move_dir * target.speed * time_of_flight
        } else {
            target.pos
        };
        let aim = aim_at - self.pos;
        let base_angle = aim.y.atan2(aim.x);
        let gap = attack.arc_gap_deg.to_radians();
        let n = attack.num_projectiles;
        (0..n)
            .map(|i| {
                let offset = (i as f32 - (n as f32 - 1.0) / 2.0) * gap;
                ProjectileSpawn {
                    owner: self.id,
                    side: Side::Enemy,
                    def_id: attack.projectile.to_string(),
                    pos: self.pos,
                    angle: base_angle + offset,
                    speed: projectile.speed,
                    radius: projectile.radius,
                    damage: projectile.damage,
                    pierce: false,
                    lifetime: (attack.range / projectile.speed) as f64,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::new_entity_id;
    use crate::map::GameMap;
    use emberfall_shared::Tile;
    use rand::SeedableRng;

    fn open_map() -> GameMap {
        let mut map = GameMap::new(64, 64);
        map.fill(0, 0, 64, 64, Tile::Floor);
        map
    }

    fn target_at(pos: Vec2) -> TargetInfo {
        TargetInfo {
            id: new_entity_id(),
            pos,
            move_dir: Vec2::ZERO,
            speed: 0.0,
        }
    }

    #[test]
    fn test_target_acquisition_takes_nearest_in_range() {
        let data = GameData::default();
        let def = data.enemies.get("pirate").unwrap();
        let mut enemy = Enemy::from_def(new_entity_id(), def, Vec2::new(10.0, 10.0));
        let near = target_at(Vec2::new(12.0, 10.0));
        let far = target_at(Vec2::new(18.0, 10.0));
        let out_of_range = target_at(Vec2::new(40.0, 10.0));
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        enemy.update(
            0.05,
            0.0,
            def,
            &[far, near, out_of_range],
            &open_map(),
            &data,
            &mut rng,
        );
        assert_eq!(enemy.target, Some(near.id));

        enemy.update(0.05, 0.1, def, &[out_of_range], &open_map(), &data, &mut rng);
        assert_eq!(enemy.target, None);
    }

    #[test]
    fn test_chase_holds_back() {
        let data = GameData::default();
        let def = data.enemies.get("pirate").unwrap();
        let mut enemy = Enemy::from_def(new_entity_id(), def, Vec2::new(10.0, 10.0));
        let target = target_at(Vec2::new(20.0, 10.0));
        let map = open_map();
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        for i in 0..2000 {
            enemy.update(0.05, i as f64 * 0.05, def, &[target], &map, &data, &mut rng);
        }
        // Holds at max(2, firstAttack.range * 0.5) = 3 tiles from the target.
        let dist = enemy.pos.distance(target.pos);
        assert!(dist >= 2.8, "closed too far: {}", dist);
        assert!(dist <= 4.5, "did not close: {}", dist);
    }

    #[test]
    fn test_phase_gating_over_ten_seconds() {
        let data = GameData::default();
        let def = data.enemies.get("cube_overlord").unwrap();
        let mut enemy = Enemy::from_def(new_entity_id(), def, Vec2::new(10.0, 10.0));
        let target = target_at(Vec2::new(12.0, 10.0));
        let map = open_map();
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);

        let mut beam_windows = 0u32;
        let mut was_resting = true;
        let mut fired_other_attacks = false;
        for i in 0..200 {
            let now = i as f64 * 0.05;
            let spawns = enemy.update(0.05, now, def, &[target], &map, &data, &mut rng);
            for spawn in &spawns {
                match spawn.def_id.as_str() {
                    "overlord_beam" => {}
                    _ => fired_other_attacks = true,
                }
            }
            if was_resting != enemy.resting && !enemy.resting {
                beam_windows += 1;
            }
            was_resting = enemy.resting;
        }
        // attack 3s / rest 2s => exactly two complete attack windows in 10s
        // (the first window starts at t=0 and is counted on entry below).
        assert_eq!(enemy.phase_index, 0);
        assert!(!fired_other_attacks, "attack 1 must be phase-gated");
        assert_eq!(beam_windows, 2, "expected two fresh attack windows");
    }

    #[test]
    fn test_phase_switches_on_hp_threshold() {
        let data = GameData::default();
        let def = data.enemies.get("cube_overlord").unwrap();
        let mut enemy = Enemy::from_def(new_entity_id(), def, Vec2::new(10.0, 10.0));
        let target = target_at(Vec2::new(12.0, 10.0));
        let map = open_map();
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);

        enemy.hp = (enemy.max_hp as f32 * 0.60) as i32;
        enemy.update(0.05, 0.0, def, &[target], &map, &data, &mut rng);
        assert_eq!(enemy.phase_index, 1);

        enemy.hp = (enemy.max_hp as f32 * 0.20) as i32;
        enemy.update(0.05, 0.1, def, &[target], &map, &data, &mut rng);
        assert_eq!(enemy.phase_index, 2);
    }

    #[test]
    fn test_even_fan_leaves_safe_corridor() {
        let data = GameData::default();
        let def = data.enemies.get("demon").unwrap();
        let attack = &def.attacks[1]; // 6 projectiles
        let enemy = Enemy::from_def(new_entity_id(), def, Vec2::new(0.0, 0.0));
        let target = target_at(Vec2::new(4.0, 0.0));
        let spawns = enemy.fire_fan(attack, &target, &data);
        assert_eq!(spawns.len(), 6);
        // No projectile flies straight at the target (angle 0).
        for spawn in &spawns {
            assert!(spawn.angle.abs() > 1e-3);
        }
        // Symmetric around the aim.
        let sum: f32 = spawns.iter().map(|s| s.angle).sum();
        assert!(sum.abs() < 1e-3);
    }

    #[test]
    fn test_odd_fan_centers_on_target() {
        let data = GameData::default();
        let def = data.enemies.get("pirate_brute").unwrap();
        let attack = &def.attacks[0]; // 3 projectiles
        let enemy = Enemy::from_def(new_entity_id(), def, Vec2::new(0.0, 0.0));
        let target = target_at(Vec2::new(4.0, 0.0));
        let spawns = enemy.fire_fan(attack, &target, &data);
        assert!(spawns.iter().any(|s| s.angle.abs() < 1e-6));
    }

    #[test]
    fn test_predictive_aim_leads_target() {
        let data = GameData::default();
        let def = data.enemies.get("dune_scorpion").unwrap();
        let attack = &def.attacks[0];
        assert!(attack.predictive);
        let enemy = Enemy::from_def(new_entity_id(), def, Vec2::new(0.0, 0.0));
        let moving = TargetInfo {
            id: new_entity_id(),
            pos: Vec2::new(4.0, 0.0),
            move_dir: Vec2::new(0.0, 1.0),
            speed: 5.0,
        };
        let spawns = enemy.fire_fan(attack, &moving, &data);
        // Fan is even (2 shots) so both straddle the led aim point; the mean
        // angle equals the lead angle, which is above the direct line.
        let mean: f32 = spawns.iter().map(|s| s.angle).sum::<f32>() / spawns.len() as f32;
        assert!(mean > 0.1);
    }
}
