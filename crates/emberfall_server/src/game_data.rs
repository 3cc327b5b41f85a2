use std::collections::HashMap;

pub mod classes;
pub mod dungeons;
pub mod enemies;
pub mod items;

pub use classes::*;
pub use dungeons::*;
pub use enemies::*;
pub use items::*;

// ============================================================================
// STAT VOCABULARY
// ============================================================================

/// A stat a buff or ring bonus can apply to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum StatKind {
    Attack,
    Defense,
    Speed,
    Dexterity,
    Vitality,
    Wisdom,
    MaxHp,
    MaxMp,
}

/// The six base stats every character carries.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct StatBlock {
    pub attack: i32,
    pub defense: i32,
    pub speed: i32,
    pub dexterity: i32,
    pub vitality: i32,
    pub wisdom: i32,
}

impl StatBlock {
    pub const fn new(
        attack: i32,
        defense: i32,
        speed: i32,
        dexterity: i32,
        vitality: i32,
        wisdom: i32,
    ) -> Self {
        Self {
            attack,
            defense,
            speed,
            dexterity,
            vitality,
            wisdom,
        }
    }

    pub fn get(&self, kind: StatKind) -> i32 {
        match kind {
            StatKind::Attack => self.attack,
            StatKind::Defense => self.defense,
            StatKind::Speed => self.speed,
            StatKind::Dexterity => self.dexterity,
            StatKind::Vitality => self.vitality,
            StatKind::Wisdom => self.wisdom,
            // hp/mp bonuses are not part of the base block
            StatKind::MaxHp | StatKind::MaxMp => 0,
        }
    }

    pub fn add(&mut self, other: &StatBlock) {
        self.attack += other.attack;
        self.defense += other.defense;
        self.speed += other.speed;
        self.dexterity += other.dexterity;
        self.vitality += other.vitality;
        self.wisdom += other.wisdom;
    }
}

// ============================================================================
// CONTENT TABLES
// ============================================================================

/// Every immutable definition table, built once at startup and shared
/// read-only behind an `Arc` for the rest of the process lifetime.
pub struct GameData {
    pub classes: ClassDatabase,
    pub items: ItemDatabase,
    pub projectiles: ProjectileDatabase,
    pub enemies: EnemyDatabase,
    pub dungeons: DungeonDatabase,
}

impl Default for GameData {
    fn default() -> Self {
        Self {
            classes: ClassDatabase::default(),
            items: ItemDatabase::default(),
            projectiles: ProjectileDatabase::default(),
            enemies: EnemyDatabase::default(),
            dungeons: DungeonDatabase::default(),
        }
    }
}

impl GameData {
    /// Sanity-checks cross-references between tables. Called once at boot;
    /// a broken table is a programmer error, so this panics.
    pub fn validate(&self) {
        for class in self.classes.classes.values() {
            for item_id in class.starting_equipment.iter().flatten() {
                assert!(
                    self.items.get(item_id).is_some(),
                    "class {} starts with unknown item {}",
                    class.id,
                    item_id
                );
            }
        }
        for item in self.items.items.values() {
            if let ItemKind::Weapon(w) = &item.kind {
                assert!(
                    self.projectiles.get(w.projectile).is_some(),
                    "weapon {} fires unknown projectile {}",
                    item.id,
                    w.projectile
                );
            }
        }
        for enemy in self.enemies.enemies.values() {
            for attack in &enemy.attacks {
                assert!(
                    self.projectiles.get(attack.projectile).is_some(),
                    "enemy {} fires unknown projectile {}",
                    enemy.id,
                    attack.projectile
                );
            }
            for drop in &enemy.loot {
                assert!(
                    self.items.get(drop.item).is_some(),
                    "enemy {} drops unknown item {}",
                    enemy.id,
                    drop.item
                );
            }
            for phase in &enemy.phases {
                for &idx in &phase.attack_indices {
                    assert!(idx < enemy.attacks.len(), "enemy {} phase attack oob", enemy.id);
                }
            }
            if let Some(portal) = &enemy.dungeon_portal {
                assert!(
                    self.dungeons.get(portal.dungeon).is_some(),
                    "enemy {} drops unknown dungeon {}",
                    enemy.id,
                    portal.dungeon
                );
            }
        }
        for dungeon in self.dungeons.dungeons.values() {
            for id in dungeon
                .minions
                .iter()
                .chain(dungeon.guardians.iter())
                .chain(std::iter::once(&dungeon.boss))
            {
                assert!(
                    self.enemies.get(id).is_some(),
                    "dungeon {} references unknown enemy {}",
                    dungeon.id,
                    id
                );
            }
        }
    }
}

/// Shared lookup shape for all of the id-keyed tables.
pub(crate) fn lookup<'a, T>(map: &'a HashMap<String, T>, id: &str) -> Option<&'a T> {
    map.get(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_tables_are_consistent() {
        GameData::default().validate();
    }

    #[test]
    fn test_stat_block_lookup() {
        let stats = StatBlock::new(1, 2, 3, 4, 5, 6);
        assert_eq!(stats.get(StatKind::Attack), 1);
        assert_eq!(stats.get(StatKind::Wisdom), 6);
        assert_eq!(stats.get(StatKind::MaxHp), 0);
    }
}
