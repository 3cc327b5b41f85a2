use std::collections::HashMap;

// ============================================================================
// ENEMY DEFINITIONS
// ============================================================================

pub struct EnemyDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub max_hp: i32,
    pub defense: i32,
    /// Exp awarded to the killing shot's owner.
    pub exp: u32,
    pub radius: f32,
    /// Tiles per second.
    pub speed: f32,
    pub behavior: Behavior,
    pub attacks: Vec<AttackDefinition>,
    /// Bosses only; ordered descending by hp threshold. Empty = no phases.
    pub phases: Vec<PhaseDefinition>,
    pub loot: Vec<LootDrop>,
    /// Chance to open a dungeon on death (the realm demon's 10%).
    pub dungeon_portal: Option<PortalDrop>,
    pub boss: bool,
}

#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    Wander,
    /// Close distance while holding back half the first attack's range.
    Chase { range: f32 },
    /// Circle the target at `range`, advancing `orbit_speed` rad/s.
    Orbit { range: f32, orbit_speed: f32 },
    Stationary,
}

pub struct AttackDefinition {
    pub projectile: &'static str,
    pub num_projectiles: u32,
    /// Fan spacing, degrees.
    pub arc_gap_deg: f32,
    /// Shots per second.
    pub rate_of_fire: f32,
    /// Tiles; also the projectile's flight range.
    pub range: f32,
    /// Lead the target using its observed input direction and speed.
    pub predictive: bool,
}

pub struct PhaseDefinition {
    /// Phase is active while `100 * hp / max_hp <= hp_percent` of the previous
    /// phase and `>` of the next; stored descending, selection takes the last
    /// index whose threshold is still >= the current percentage.
    pub hp_percent: f32,
    pub attack_indices: Vec<usize>,
    pub attack_duration: f32,
    pub rest_duration: f32,
}

pub struct LootDrop {
    pub item: &'static str,
    /// Independent roll per kill.
    pub chance: f32,
}

pub struct PortalDrop {
    pub dungeon: &'static str,
    pub chance: f32,
}

pub struct EnemyDatabase {
    pub enemies: HashMap<String, EnemyDefinition>,
}

impl Default for EnemyDatabase {
    fn default() -> Self {
        let mut enemies = HashMap::new();
        let mut add = |def: EnemyDefinition| {
            enemies.insert(def.id.to_string(), def);
        };

        // ------------------------------------------------------- realm fodder
        add(EnemyDefinition {
            id: "pirate",
            name: "Pirate",
            max_hp: 100,
            defense: 2,
            exp: 20,
            radius: 0.5,
            speed: 2.5,
            behavior: Behavior::Chase { range: 10.0 },
            attacks: vec![AttackDefinition {
                projectile: "pirate_shot",
                num_projectiles: 1,
                arc_gap_deg: 0.0,
                rate_of_fire: 1.0,
                range: 6.0,
                predictive: false,
            }],
            phases: vec![],
            loot: vec![
                LootDrop { item: "starter_sword", chance: 0.08 },
                LootDrop { item: "ring_of_attack", chance: 0.03 },
            ],
            dungeon_portal: None,
            boss: false,
        });

        add(EnemyDefinition {
            id: "pirate_brute",
            name: "Pirate Brute",
            max_hp: 300,
            defense: 6,
            exp: 55,
            radius: 0.7,
            speed: 1.8,
            behavior: Behavior::Chase { range: 9.0 },
            attacks: vec![AttackDefinition {
                projectile: "brute_slug",
                num_projectiles: 3,
                arc_gap_deg: 14.0,
                rate_of_fire: 0.6,
                range: 5.0,
                predictive: false,
            }],
            phases: vec![],
            loot: vec![
                LootDrop { item: "chain_mail", chance: 0.1 },
                LootDrop { item: "steel_sword", chance: 0.04 },
            ],
            dungeon_portal: None,
            boss: false,
        });

        add(EnemyDefinition {
            id: "sand_snake",
            name: "Sand Snake",
            max_hp: 60,
            defense: 0,
            exp: 12,
            radius: 0.4,
            speed: 4.0,
            behavior: Behavior::Orbit { range: 3.0, orbit_speed: 1.2 },
            attacks: vec![AttackDefinition {
                projectile: "snake_venom",
                num_projectiles: 1,
                arc_gap_deg: 0.0,
                rate_of_fire: 1.4,
                range: 4.5,
                predictive: false,
            }],
            phases: vec![],
            loot: vec![LootDrop { item: "ring_of_speed", chance: 0.03 }],
            dungeon_portal: None,
            boss: false,
        });

        add(EnemyDefinition {
            id: "dune_scorpion",
            name: "Dune Scorpion",
            max_hp: 140,
            defense: 4,
            exp: 25,
            radius: 0.5,
            speed: 3.0,
            behavior: Behavior::Orbit { range: 4.0, orbit_speed: 0.9 },
            attacks: vec![AttackDefinition {
                projectile: "stinger",
                num_projectiles: 2,
                arc_gap_deg: 20.0,
                rate_of_fire: 1.1,
                range: 5.0,
                predictive: true,
            }],
            phases: vec![],
            loot: vec![
                LootDrop { item: "padded_leather", chance: 0.08 },
                LootDrop { item: "ring_of_defense", chance: 0.03 },
            ],
            dungeon_portal: None,
            boss: false,
        });

        // The realm demon is the dungeon gatekeeper: 10% portal drop on death.
        add(EnemyDefinition {
            id: "demon",
            name: "Demon",
            max_hp: 800,
            defense: 10,
            exp: 150,
            radius: 0.9,
            speed: 2.2,
            behavior: Behavior::Chase { range: 12.0 },
            attacks: vec![
                AttackDefinition {
                    projectile: "demon_fireball",
                    num_projectiles: 1,
                    arc_gap_deg: 0.0,
                    rate_of_fire: 0.8,
                    range: 7.0,
                    predictive: true,
                },
                AttackDefinition {
                    projectile: "imp_spark",
                    num_projectiles: 6,
                    arc_gap_deg: 60.0,
                    rate_of_fire: 0.5,
                    range: 5.0,
                    predictive: false,
                },
            ],
            phases: vec![],
            loot: vec![
                LootDrop { item: "ember_staff", chance: 0.06 },
                LootDrop { item: "bone_wand", chance: 0.06 },
                LootDrop { item: "ring_of_health", chance: 0.05 },
            ],
            dungeon_portal: Some(PortalDrop { dungeon: "demon_lair", chance: 0.1 }),
            boss: false,
        });

        // ----------------------------------------------------- dungeon fodder
        add(EnemyDefinition {
            id: "imp",
            name: "Imp",
            max_hp: 80,
            defense: 2,
            exp: 18,
            radius: 0.4,
            speed: 4.5,
            behavior: Behavior::Wander,
            attacks: vec![AttackDefinition {
                projectile: "imp_spark",
                num_projectiles: 1,
                arc_gap_deg: 0.0,
                rate_of_fire: 1.6,
                range: 5.0,
                predictive: false,
            }],
            phases: vec![],
            loot: vec![LootDrop { item: "ring_of_magic", chance: 0.02 }],
            dungeon_portal: None,
            boss: false,
        });

        add(EnemyDefinition {
            id: "flame_guardian",
            name: "Flame Guardian",
            max_hp: 450,
            defense: 12,
            exp: 90,
            radius: 0.8,
            speed: 0.0,
            behavior: Behavior::Stationary,
            attacks: vec![AttackDefinition {
                projectile: "guardian_flame",
                num_projectiles: 4,
                arc_gap_deg: 90.0,
                rate_of_fire: 0.9,
                range: 6.0,
                predictive: false,
            }],
            phases: vec![],
            loot: vec![
                LootDrop { item: "plate_mail", chance: 0.08 },
                LootDrop { item: "drake_hide", chance: 0.08 },
            ],
            dungeon_portal: None,
            boss: false,
        });

        // ------------------------------------------------------------- bosses
        add(EnemyDefinition {
            id: "cube_overlord",
            name: "Cube Overlord",
            max_hp: 6000,
            defense: 20,
            exp: 1200,
            radius: 1.4,
            speed: 1.5,
            behavior: Behavior::Orbit { range: 6.0, orbit_speed: 0.5 },
            attacks: vec![
                AttackDefinition {
                    projectile: "overlord_beam",
                    num_projectiles: 1,
                    arc_gap_deg: 0.0,
                    rate_of_fire: 1.2,
                    range: 9.0,
                    predictive: true,
                },
                AttackDefinition {
                    projectile: "overlord_burst",
                    num_projectiles: 8,
                    arc_gap_deg: 45.0,
                    rate_of_fire: 0.5,
                    range: 6.0,
                    predictive: false,
                },
                AttackDefinition {
                    projectile: "overlord_spiral",
                    num_projectiles: 12,
                    arc_gap_deg: 30.0,
                    rate_of_fire: 0.7,
                    range: 7.0,
                    predictive: false,
                },
            ],
            phases: vec![
                PhaseDefinition {
                    hp_percent: 100.0,
                    attack_indices: vec![0],
                    attack_duration: 3.0,
                    rest_duration: 2.0,
                },
                PhaseDefinition {
                    hp_percent: 66.0,
                    attack_indices: vec![0, 1],
                    attack_duration: 4.0,
                    rest_duration: 1.5,
                },
                PhaseDefinition {
                    hp_percent: 33.0,
                    attack_indices: vec![0, 1, 2],
                    attack_duration: 6.0,
                    rest_duration: 1.0,
                },
            ],
            loot: vec![
                LootDrop { item: "archon_staff", chance: 0.25 },
                LootDrop { item: "verdant_bow", chance: 0.25 },
                LootDrop { item: "dragonfang", chance: 0.25 },
                LootDrop { item: "seraph_wand", chance: 0.25 },
                LootDrop { item: "crown_of_the_overlord", chance: 0.1 },
                LootDrop { item: "ring_of_health", chance: 0.5 },
            ],
            dungeon_portal: None,
            boss: true,
        });

        Self { enemies }
    }
}

impl EnemyDatabase {
    pub fn get(&self, id: &str) -> Option<&EnemyDefinition> {
        super::lookup(&self.enemies, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pirate_matches_combat_numbers() {
        let db = EnemyDatabase::default();
        let pirate = db.get("pirate").unwrap();
        assert_eq!(pirate.max_hp, 100);
        assert_eq!(pirate.defense, 2);
        assert_eq!(pirate.exp, 20);
    }

    #[test]
    fn test_demon_opens_dungeons() {
        let db = EnemyDatabase::default();
        let demon = db.get("demon").unwrap();
        let portal = demon.dungeon_portal.as_ref().unwrap();
        assert_eq!(portal.dungeon, "demon_lair");
        assert!((portal.chance - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_phases_are_descending_by_threshold() {
        let db = EnemyDatabase::default();
        for enemy in db.enemies.values() {
            for pair in enemy.phases.windows(2) {
                assert!(
                    pair[0].hp_percent > pair[1].hp_percent,
                    "{} phases out of order",
                    enemy.id
                );
            }
            if !enemy.phases.is_empty() {
                assert!(enemy.boss, "{} has phases but is not a boss", enemy.id);
            }
        }
    }
}
