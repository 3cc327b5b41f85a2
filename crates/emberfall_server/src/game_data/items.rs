use std::collections::HashMap;

use super::StatKind;

// ============================================================================
// EQUIPMENT TYPE VOCABULARY
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WeaponType {
    Staff,
    Bow,
    Sword,
    Wand,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AbilityType {
    Spell,
    Quiver,
    Shield,
    Tome,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArmorType {
    Robe,
    Leather,
    Heavy,
}

// ============================================================================
// ITEM DEFINITIONS
// ============================================================================

pub struct ItemDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub tier: u8,
    pub kind: ItemKind,
    /// Soulbound items only drop in private bags and never trade hands.
    pub soulbound: bool,
}

pub enum ItemKind {
    Weapon(WeaponDef),
    Ability(AbilityDef),
    Armor(ArmorDef),
    Ring(RingDef),
}

pub struct WeaponDef {
    pub weapon_type: WeaponType,
    pub damage_min: i32,
    pub damage_max: i32,
    /// Base shots per second before dexterity scaling.
    pub rate_of_fire: f32,
    pub num_projectiles: u32,
    /// Fan spacing between projectiles, degrees.
    pub arc_gap_deg: f32,
    /// Tiles; projectile lifetime is `range / projectile speed`.
    pub range: f32,
    pub pierce: bool,
    pub projectile: &'static str,
}

pub struct AbilityDef {
    pub ability_type: AbilityType,
    pub mp_cost: i32,
    pub cooldown: f32,
    pub effect: AbilityEffect,
}

#[derive(Clone, Copy, Debug)]
pub enum AbilityEffect {
    /// Area damage centered `range` tiles along the caster's aim.
    Damage { range: f32, radius: f32, amount: i32 },
    Buff { stat: StatKind, amount: i32, duration: f32 },
    Heal { amount: i32 },
    /// Blink up to `range` tiles along the aim, clipped to walkable ground.
    Teleport { range: f32 },
}

pub struct ArmorDef {
    pub armor_type: ArmorType,
    pub defense: i32,
}

pub struct RingDef {
    pub bonuses: &'static [(StatKind, i32)],
}

impl ItemDefinition {
    pub fn as_weapon(&self) -> Option<&WeaponDef> {
        match &self.kind {
            ItemKind::Weapon(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_ability(&self) -> Option<&AbilityDef> {
        match &self.kind {
            ItemKind::Ability(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_armor(&self) -> Option<&ArmorDef> {
        match &self.kind {
            ItemKind::Armor(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_ring(&self) -> Option<&RingDef> {
        match &self.kind {
            ItemKind::Ring(r) => Some(r),
            _ => None,
        }
    }
}

// ============================================================================
// PROJECTILE DEFINITIONS
// ============================================================================

pub struct ProjectileDefinition {
    pub id: &'static str,
    /// Tiles per second.
    pub speed: f32,
    pub radius: f32,
    /// Damage carried by enemy attacks; player weapons roll their own.
    pub damage: i32,
}

pub struct ProjectileDatabase {
    pub projectiles: HashMap<String, ProjectileDefinition>,
}

impl Default for ProjectileDatabase {
    fn default() -> Self {
        let mut projectiles = HashMap::new();
        let mut add = |def: ProjectileDefinition| {
            projectiles.insert(def.id.to_string(), def);
        };

        // Player weapon projectiles (damage comes from the weapon roll).
        add(ProjectileDefinition { id: "staff_bolt", speed: 16.0, radius: 0.25, damage: 0 });
        add(ProjectileDefinition { id: "arrow", speed: 20.0, radius: 0.2, damage: 0 });
        add(ProjectileDefinition { id: "blade_wave", speed: 12.0, radius: 0.35, damage: 0 });
        add(ProjectileDefinition { id: "holy_bolt", speed: 15.0, radius: 0.25, damage: 0 });

        // Enemy projectiles.
        add(ProjectileDefinition { id: "pirate_shot", speed: 8.0, radius: 0.25, damage: 10 });
        add(ProjectileDefinition { id: "brute_slug", speed: 6.0, radius: 0.4, damage: 25 });
        add(ProjectileDefinition { id: "snake_venom", speed: 10.0, radius: 0.2, damage: 8 });
        add(ProjectileDefinition { id: "stinger", speed: 12.0, radius: 0.2, damage: 12 });
        add(ProjectileDefinition { id: "demon_fireball", speed: 9.0, radius: 0.45, damage: 35 });
        add(ProjectileDefinition { id: "imp_spark", speed: 11.0, radius: 0.2, damage: 9 });
        add(ProjectileDefinition { id: "guardian_flame", speed: 8.0, radius: 0.35, damage: 22 });
        add(ProjectileDefinition { id: "overlord_beam", speed: 14.0, radius: 0.3, damage: 30 });
        add(ProjectileDefinition { id: "overlord_burst", speed: 7.0, radius: 0.5, damage: 45 });
        add(ProjectileDefinition { id: "overlord_spiral", speed: 5.0, radius: 0.35, damage: 25 });

        Self { projectiles }
    }
}

impl ProjectileDatabase {
    pub fn get(&self, id: &str) -> Option<&ProjectileDefinition> {
        super::lookup(&self.projectiles, id)
    }
}

// ============================================================================
// ITEM TABLE
// ============================================================================

pub struct ItemDatabase {
    pub items: HashMap<String, ItemDefinition>,
}

impl Default for ItemDatabase {
    fn default() -> Self {
        let mut items = HashMap::new();
        let mut add = |def: ItemDefinition| {
            items.insert(def.id.to_string(), def);
        };

        // -------------------------------------------------------------- staves
        add(ItemDefinition {
            id: "starter_staff",
            name: "Cracked Staff",
            tier: 0,
            soulbound: false,
            kind: ItemKind::Weapon(WeaponDef {
                weapon_type: WeaponType::Staff,
                damage_min: 15,
                damage_max: 25,
                rate_of_fire: 1.5,
                num_projectiles: 1,
                arc_gap_deg: 0.0,
                range: 8.0,
                pierce: false,
                projectile: "staff_bolt",
            }),
        });
        add(ItemDefinition {
            id: "ember_staff",
            name: "Ember Staff",
            tier: 1,
            soulbound: false,
            kind: ItemKind::Weapon(WeaponDef {
                weapon_type: WeaponType::Staff,
                damage_min: 25,
                damage_max: 40,
                rate_of_fire: 1.5,
                num_projectiles: 2,
                arc_gap_deg: 8.0,
                range: 8.5,
                pierce: false,
                projectile: "staff_bolt",
            }),
        });
        add(ItemDefinition {
            id: "archon_staff",
            name: "Staff of the Archon",
            tier: 2,
            soulbound: true,
            kind: ItemKind::Weapon(WeaponDef {
                weapon_type: WeaponType::Staff,
                damage_min: 40,
                damage_max: 60,
                rate_of_fire: 1.6,
                num_projectiles: 2,
                arc_gap_deg: 6.0,
                range: 9.0,
                pierce: false,
                projectile: "staff_bolt",
            }),
        });

        // ---------------------------------------------------------------- bows
        add(ItemDefinition {
            id: "starter_bow",
            name: "Bent Bow",
            tier: 0,
            soulbound: false,
            kind: ItemKind::Weapon(WeaponDef {
                weapon_type: WeaponType::Bow,
                damage_min: 10,
                damage_max: 18,
                rate_of_fire: 1.8,
                num_projectiles: 1,
                arc_gap_deg: 0.0,
                range: 7.0,
                pierce: true,
                projectile: "arrow",
            }),
        });
        add(ItemDefinition {
            id: "longbow",
            name: "Longbow",
            tier: 1,
            soulbound: false,
            kind: ItemKind::Weapon(WeaponDef {
                weapon_type: WeaponType::Bow,
                damage_min: 16,
                damage_max: 28,
                rate_of_fire: 1.8,
                num_projectiles: 1,
                arc_gap_deg: 0.0,
                range: 7.5,
                pierce: true,
                projectile: "arrow",
            }),
        });
        add(ItemDefinition {
            id: "verdant_bow",
            name: "Verdant Bow",
            tier: 2,
            soulbound: true,
            kind: ItemKind::Weapon(WeaponDef {
                weapon_type: WeaponType::Bow,
                damage_min: 20,
                damage_max: 32,
                rate_of_fire: 1.8,
                num_projectiles: 3,
                arc_gap_deg: 10.0,
                range: 7.5,
                pierce: true,
                projectile: "arrow",
            }),
        });

        // -------------------------------------------------------------- swords
        add(ItemDefinition {
            id: "starter_sword",
            name: "Rusty Sword",
            tier: 0,
            soulbound: false,
            kind: ItemKind::Weapon(WeaponDef {
                weapon_type: WeaponType::Sword,
                damage_min: 25,
                damage_max: 40,
                rate_of_fire: 1.2,
                num_projectiles: 1,
                arc_gap_deg: 0.0,
                range: 3.5,
                pierce: false,
                projectile: "blade_wave",
            }),
        });
        add(ItemDefinition {
            id: "steel_sword",
            name: "Steel Sword",
            tier: 1,
            soulbound: false,
            kind: ItemKind::Weapon(WeaponDef {
                weapon_type: WeaponType::Sword,
                damage_min: 40,
                damage_max: 60,
                rate_of_fire: 1.2,
                num_projectiles: 1,
                arc_gap_deg: 0.0,
                range: 3.5,
                pierce: false,
                projectile: "blade_wave",
            }),
        });
        add(ItemDefinition {
            id: "dragonfang",
            name: "Dragonfang",
            tier: 2,
            soulbound: true,
            kind: ItemKind::Weapon(WeaponDef {
                weapon_type: WeaponType::Sword,
                damage_min: 60,
                damage_max: 85,
                rate_of_fire: 1.25,
                num_projectiles: 1,
                arc_gap_deg: 0.0,
                range: 3.8,
                pierce: false,
                projectile: "blade_wave",
            }),
        });

        // --------------------------------------------------------------- wands
        add(ItemDefinition {
            id: "starter_wand",
            name: "Driftwood Wand",
            tier: 0,
            soulbound: false,
            kind: ItemKind::Weapon(WeaponDef {
                weapon_type: WeaponType::Wand,
                damage_min: 12,
                damage_max: 22,
                rate_of_fire: 1.4,
                num_projectiles: 1,
                arc_gap_deg: 0.0,
                range: 9.0,
                pierce: false,
                projectile: "holy_bolt",
            }),
        });
        add(ItemDefinition {
            id: "bone_wand",
            name: "Bone Wand",
            tier: 1,
            soulbound: false,
            kind: ItemKind::Weapon(WeaponDef {
                weapon_type: WeaponType::Wand,
                damage_min: 20,
                damage_max: 34,
                rate_of_fire: 1.4,
                num_projectiles: 1,
                arc_gap_deg: 0.0,
                range: 9.0,
                pierce: false,
                projectile: "holy_bolt",
            }),
        });
        add(ItemDefinition {
            id: "seraph_wand",
            name: "Wand of the Seraph",
            tier: 2,
            soulbound: true,
            kind: ItemKind::Weapon(WeaponDef {
                weapon_type: WeaponType::Wand,
                damage_min: 30,
                damage_max: 48,
                rate_of_fire: 1.5,
                num_projectiles: 1,
                arc_gap_deg: 0.0,
                range: 9.5,
                pierce: false,
                projectile: "holy_bolt",
            }),
        });

        // ----------------------------------------------------------- abilities
        add(ItemDefinition {
            id: "magic_missile",
            name: "Magic Missile Spell",
            tier: 0,
            soulbound: false,
            kind: ItemKind::Ability(AbilityDef {
                ability_type: AbilityType::Spell,
                mp_cost: 30,
                cooldown: 1.0,
                effect: AbilityEffect::Damage { range: 6.0, radius: 2.5, amount: 60 },
            }),
        });
        add(ItemDefinition {
            id: "nova_spell",
            name: "Nova Spell",
            tier: 1,
            soulbound: true,
            kind: ItemKind::Ability(AbilityDef {
                ability_type: AbilityType::Spell,
                mp_cost: 55,
                cooldown: 1.0,
                effect: AbilityEffect::Damage { range: 6.0, radius: 3.5, amount: 110 },
            }),
        });
        add(ItemDefinition {
            id: "blink_spell",
            name: "Blink Spell",
            tier: 1,
            soulbound: false,
            kind: ItemKind::Ability(AbilityDef {
                ability_type: AbilityType::Spell,
                mp_cost: 45,
                cooldown: 2.0,
                effect: AbilityEffect::Teleport { range: 8.0 },
            }),
        });
        add(ItemDefinition {
            id: "quiver_of_thorns",
            name: "Quiver of Thorns",
            tier: 0,
            soulbound: false,
            kind: ItemKind::Ability(AbilityDef {
                ability_type: AbilityType::Quiver,
                mp_cost: 25,
                cooldown: 1.5,
                effect: AbilityEffect::Damage { range: 5.0, radius: 1.5, amount: 45 },
            }),
        });
        add(ItemDefinition {
            id: "quiver_of_swiftness",
            name: "Quiver of Swiftness",
            tier: 1,
            soulbound: true,
            kind: ItemKind::Ability(AbilityDef {
                ability_type: AbilityType::Quiver,
                mp_cost: 40,
                cooldown: 4.0,
                effect: AbilityEffect::Buff { stat: StatKind::Dexterity, amount: 15, duration: 4.0 },
            }),
        });
        add(ItemDefinition {
            id: "iron_shield",
            name: "Iron Shield",
            tier: 0,
            soulbound: false,
            kind: ItemKind::Ability(AbilityDef {
                ability_type: AbilityType::Shield,
                mp_cost: 35,
                cooldown: 3.0,
                effect: AbilityEffect::Buff { stat: StatKind::Defense, amount: 12, duration: 5.0 },
            }),
        });
        add(ItemDefinition {
            id: "tower_shield",
            name: "Tower Shield",
            tier: 1,
            soulbound: true,
            kind: ItemKind::Ability(AbilityDef {
                ability_type: AbilityType::Shield,
                mp_cost: 50,
                cooldown: 3.0,
                effect: AbilityEffect::Damage { range: 0.0, radius: 2.0, amount: 90 },
            }),
        });
        add(ItemDefinition {
            id: "tome_of_mending",
            name: "Tome of Mending",
            tier: 0,
            soulbound: false,
            kind: ItemKind::Ability(AbilityDef {
                ability_type: AbilityType::Tome,
                mp_cost: 40,
                cooldown: 1.0,
                effect: AbilityEffect::Heal { amount: 80 },
            }),
        });
        add(ItemDefinition {
            id: "tome_of_valor",
            name: "Tome of Valor",
            tier: 1,
            soulbound: true,
            kind: ItemKind::Ability(AbilityDef {
                ability_type: AbilityType::Tome,
                mp_cost: 60,
                cooldown: 5.0,
                effect: AbilityEffect::Buff { stat: StatKind::Attack, amount: 10, duration: 6.0 },
            }),
        });

        // --------------------------------------------------------------- armor
        add(ItemDefinition {
            id: "apprentice_robe",
            name: "Apprentice Robe",
            tier: 0,
            soulbound: false,
            kind: ItemKind::Armor(ArmorDef { armor_type: ArmorType::Robe, defense: 2 }),
        });
        add(ItemDefinition {
            id: "mystic_robe",
            name: "Mystic Robe",
            tier: 1,
            soulbound: false,
            kind: ItemKind::Armor(ArmorDef { armor_type: ArmorType::Robe, defense: 6 }),
        });
        add(ItemDefinition {
            id: "archon_robe",
            name: "Robe of the Archon",
            tier: 2,
            soulbound: true,
            kind: ItemKind::Armor(ArmorDef { armor_type: ArmorType::Robe, defense: 11 }),
        });
        add(ItemDefinition {
            id: "padded_leather",
            name: "Padded Leather",
            tier: 0,
            soulbound: false,
            kind: ItemKind::Armor(ArmorDef { armor_type: ArmorType::Leather, defense: 3 }),
        });
        add(ItemDefinition {
            id: "drake_hide",
            name: "Drake Hide",
            tier: 1,
            soulbound: false,
            kind: ItemKind::Armor(ArmorDef { armor_type: ArmorType::Leather, defense: 8 }),
        });
        add(ItemDefinition {
            id: "shadow_hide",
            name: "Shadow Hide",
            tier: 2,
            soulbound: true,
            kind: ItemKind::Armor(ArmorDef { armor_type: ArmorType::Leather, defense: 13 }),
        });
        add(ItemDefinition {
            id: "chain_mail",
            name: "Chain Mail",
            tier: 0,
            soulbound: false,
            kind: ItemKind::Armor(ArmorDef { armor_type: ArmorType::Heavy, defense: 5 }),
        });
        add(ItemDefinition {
            id: "plate_mail",
            name: "Plate Mail",
            tier: 1,
            soulbound: false,
            kind: ItemKind::Armor(ArmorDef { armor_type: ArmorType::Heavy, defense: 10 }),
        });
        add(ItemDefinition {
            id: "colossus_plate",
            name: "Colossus Plate",
            tier: 2,
            soulbound: true,
            kind: ItemKind::Armor(ArmorDef { armor_type: ArmorType::Heavy, defense: 16 }),
        });

        // --------------------------------------------------------------- rings
        add(ItemDefinition {
            id: "ring_of_attack",
            name: "Ring of Attack",
            tier: 0,
            soulbound: false,
            kind: ItemKind::Ring(RingDef { bonuses: &[(StatKind::Attack, 4)] }),
        });
        add(ItemDefinition {
            id: "ring_of_defense",
            name: "Ring of Defense",
            tier: 0,
            soulbound: false,
            kind: ItemKind::Ring(RingDef { bonuses: &[(StatKind::Defense, 4)] }),
        });
        add(ItemDefinition {
            id: "ring_of_speed",
            name: "Ring of Speed",
            tier: 0,
            soulbound: false,
            kind: ItemKind::Ring(RingDef { bonuses: &[(StatKind::Speed, 4)] }),
        });
        add(ItemDefinition {
            id: "ring_of_vitality",
            name: "Ring of Vitality",
            tier: 0,
            soulbound: false,
            kind: ItemKind::Ring(RingDef { bonuses: &[(StatKind::Vitality, 4)] }),
        });
        add(ItemDefinition {
            id: "ring_of_health",
            name: "Ring of Health",
            tier: 1,
            soulbound: false,
            kind: ItemKind::Ring(RingDef { bonuses: &[(StatKind::MaxHp, 40)] }),
        });
        add(ItemDefinition {
            id: "ring_of_magic",
            name: "Ring of Magic",
            tier: 1,
            soulbound: false,
            kind: ItemKind::Ring(RingDef { bonuses: &[(StatKind::MaxMp, 30)] }),
        });
        add(ItemDefinition {
            id: "crown_of_the_overlord",
            name: "Crown of the Overlord",
            tier: 2,
            soulbound: true,
            kind: ItemKind::Ring(RingDef {
                bonuses: &[(StatKind::MaxHp, 60), (StatKind::Attack, 4), (StatKind::Defense, 4)],
            }),
        });

        Self { items }
    }
}

impl ItemDatabase {
    pub fn get(&self, id: &str) -> Option<&ItemDefinition> {
        super::lookup(&self.items, id)
    }

    /// Ids of all items whose id contains `filter`, sorted for stable output.
    pub fn search(&self, filter: &str) -> Vec<&str> {
        let needle = filter.to_lowercase();
        let mut out: Vec<&str> = self
            .items
            .values()
            .filter(|i| i.id.contains(&needle))
            .map(|i| i.id)
            .collect();
        out.sort_unstable();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starter_staff_matches_wizard_numbers() {
        let db = ItemDatabase::default();
        let staff = db.get("starter_staff").unwrap();
        let weapon = staff.as_weapon().unwrap();
        assert_eq!(weapon.damage_min, 15);
        assert_eq!(weapon.damage_max, 25);
        assert!(!weapon.pierce);
    }

    #[test]
    fn test_search_filters_by_substring() {
        let db = ItemDatabase::default();
        let rings = db.search("ring_of");
        assert!(rings.contains(&"ring_of_attack"));
        assert!(!rings.contains(&"starter_staff"));
        let all = db.search("");
        assert_eq!(all.len(), db.items.len());
    }

    #[test]
    fn test_soulbound_items_are_high_tier() {
        let db = ItemDatabase::default();
        for item in db.items.values() {
            if item.tier >= 2 {
                assert!(item.soulbound, "{} should be soulbound", item.id);
            }
        }
    }
}
