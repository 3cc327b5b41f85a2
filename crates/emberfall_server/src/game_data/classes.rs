use std::collections::HashMap;

use super::items::{AbilityType, ArmorType, WeaponType};
use super::StatBlock;
use emberfall_shared::EQUIP_SLOTS;

// ============================================================================
// CLASS DEFINITIONS
// ============================================================================

pub struct ClassDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub weapon_type: WeaponType,
    pub ability_type: AbilityType,
    pub armor_type: ArmorType,
    pub base_hp: i32,
    pub base_mp: i32,
    pub hp_per_level: i32,
    pub mp_per_level: i32,
    pub base_stats: StatBlock,
    /// Added to the base block on every level-up.
    pub stat_growth: StatBlock,
    pub starting_equipment: [Option<&'static str>; EQUIP_SLOTS],
}

pub struct ClassDatabase {
    pub classes: HashMap<String, ClassDefinition>,
}

impl Default for ClassDatabase {
    fn default() -> Self {
        let mut classes = HashMap::new();
        let mut add = |def: ClassDefinition| {
            classes.insert(def.id.to_string(), def);
        };

        add(ClassDefinition {
            id: "wizard",
            name: "Wizard",
            weapon_type: WeaponType::Staff,
            ability_type: AbilityType::Spell,
            armor_type: ArmorType::Robe,
            base_hp: 100,
            base_mp: 100,
            hp_per_level: 20,
            mp_per_level: 10,
            base_stats: StatBlock::new(15, 0, 10, 10, 5, 15),
            stat_growth: StatBlock::new(2, 0, 1, 1, 1, 2),
            starting_equipment: [
                Some("starter_staff"),
                Some("magic_missile"),
                Some("apprentice_robe"),
                None,
            ],
        });

        add(ClassDefinition {
            id: "archer",
            name: "Archer",
            weapon_type: WeaponType::Bow,
            ability_type: AbilityType::Quiver,
            armor_type: ArmorType::Leather,
            base_hp: 130,
            base_mp: 80,
            hp_per_level: 22,
            mp_per_level: 8,
            base_stats: StatBlock::new(12, 2, 12, 14, 8, 8),
            stat_growth: StatBlock::new(2, 0, 1, 2, 1, 1),
            starting_equipment: [
                Some("starter_bow"),
                Some("quiver_of_thorns"),
                Some("padded_leather"),
                None,
            ],
        });

        add(ClassDefinition {
            id: "knight",
            name: "Knight",
            weapon_type: WeaponType::Sword,
            ability_type: AbilityType::Shield,
            armor_type: ArmorType::Heavy,
            base_hp: 200,
            base_mp: 60,
            hp_per_level: 28,
            mp_per_level: 5,
            base_stats: StatBlock::new(10, 8, 8, 8, 12, 5),
            stat_growth: StatBlock::new(1, 1, 1, 1, 2, 0),
            starting_equipment: [
                Some("starter_sword"),
                Some("iron_shield"),
                Some("chain_mail"),
                None,
            ],
        });

        add(ClassDefinition {
            id: "priest",
            name: "Priest",
            weapon_type: WeaponType::Wand,
            ability_type: AbilityType::Tome,
            armor_type: ArmorType::Robe,
            base_hp: 110,
            base_mp: 120,
            hp_per_level: 18,
            mp_per_level: 12,
            base_stats: StatBlock::new(10, 0, 11, 9, 6, 18),
            stat_growth: StatBlock::new(1, 0, 1, 1, 1, 3),
            starting_equipment: [
                Some("starter_wand"),
                Some("tome_of_mending"),
                Some("apprentice_robe"),
                None,
            ],
        });

        Self { classes }
    }
}

impl ClassDatabase {
    pub fn get(&self, id: &str) -> Option<&ClassDefinition> {
        super::lookup(&self.classes, id)
    }
}

/// Exp needed to leave `level`: `floor(100 * 1.2^(level-1))`.
pub fn exp_for_next_level(level: u32) -> u64 {
    (100.0 * 1.2f64.powi(level as i32 - 1)).floor() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exp_curve() {
        assert_eq!(exp_for_next_level(1), 100);
        assert_eq!(exp_for_next_level(2), 120);
        assert_eq!(exp_for_next_level(3), 144);
        // Monotonic over the whole level range.
        for level in 1..20 {
            assert!(exp_for_next_level(level + 1) > exp_for_next_level(level));
        }
    }

    #[test]
    fn test_wizard_speed_stat_yields_five_tiles_per_second() {
        // effective speed = 4 + speed * 0.1; the wall-slide scenario assumes 5.0
        let db = ClassDatabase::default();
        let wizard = db.get("wizard").unwrap();
        assert_eq!(wizard.base_stats.speed, 10);
        assert_eq!(wizard.base_stats.attack, 15);
    }

    #[test]
    fn test_every_class_starts_with_weapon_ability_armor() {
        let db = ClassDatabase::default();
        for class in db.classes.values() {
            assert!(class.starting_equipment[0].is_some(), "{} has no weapon", class.id);
            assert!(class.starting_equipment[1].is_some(), "{} has no ability", class.id);
            assert!(class.starting_equipment[2].is_some(), "{} has no armor", class.id);
        }
    }
}
