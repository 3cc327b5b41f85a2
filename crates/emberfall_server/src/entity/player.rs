use glam::Vec2;
use rand::Rng;

use emberfall_shared::{PlayerInput, EQUIP_SLOTS, INVENTORY_SLOTS, MAX_LEVEL, PLAYER_RADIUS};

use crate::database::CharacterRecord;
use crate::entity::{EntityId, ProjectileSpawn, Side};
use crate::game_data::{
    exp_for_next_level, AbilityDef, ClassDefinition, GameData, ItemKind, StatBlock, StatKind,
};
use crate::map::GameMap;

// ============================================================================
// SUPPORT TYPES
// ============================================================================

/// A temporary stat modifier applied by an ability.
#[derive(Clone, Copy, Debug)]
pub struct Buff {
    pub stat: StatKind,
    pub amount: i32,
    pub expires_at: f64,
}

/// Per-character lifetime counters, persisted with the character.
#[derive(Clone, Copy, Debug, Default)]
pub struct LifetimeStats {
    pub damage_dealt: i64,
    pub damage_taken: i64,
    pub shots_fired: i64,
    pub abilities_used: i64,
    pub enemies_killed: i64,
    pub dungeons_cleared: i64,
    pub seconds_played: f64,
}

// ============================================================================
// PLAYER ENTITY
// ============================================================================

pub struct Player {
    pub id: EntityId,
    pub character_id: i64,
    pub account_id: i64,
    pub name: String,
    pub class_id: String,
    pub pos: Vec2,
    pub radius: f32,
    pub level: u32,
    pub exp: u64,
    pub hp: i32,
    pub max_hp: i32,
    pub mp: i32,
    pub max_mp: i32,
    pub stats: StatBlock,
    /// Slot 0 weapon, 1 ability, 2 armor, 3 ring.
    pub equipment: [Option<String>; EQUIP_SLOTS],
    pub inventory: [Option<String>; INVENTORY_SLOTS],
    pub buffs: Vec<Buff>,
    pub input: PlayerInput,
    /// Non-owning back-reference to the residing instance.
    pub instance_id: String,
    pub last_hit_at: f64,
    pub last_shot_at: f64,
    pub last_ability_at: f64,
    pub lifetime: LifetimeStats,
    pub vault_open: bool,
    pub removed: bool,
    hp_regen_acc: f64,
    mp_regen_acc: f64,
}

impl Player {
    pub fn from_record(id: EntityId, record: &CharacterRecord) -> Self {
        let mut equipment: [Option<String>; EQUIP_SLOTS] = Default::default();
        let mut inventory: [Option<String>; INVENTORY_SLOTS] = Default::default();
        for (slot, item) in record.items.iter().enumerate() {
            if slot < EQUIP_SLOTS {
                equipment[slot] = item.clone();
            } else if slot < EQUIP_SLOTS + INVENTORY_SLOTS {
                inventory[slot - EQUIP_SLOTS] = item.clone();
            }
        }
        Self {
            id,
            character_id: record.id,
            account_id: record.account_id,
            name: record.name.clone(),
            class_id: record.class_id.clone(),
            pos: Vec2::ZERO,
            radius: PLAYER_RADIUS,
            level: record.level,
            exp: record.exp,
            hp: record.hp,
            max_hp: record.max_hp,
            mp: record.mp,
            max_mp: record.max_mp,
            stats: record.stats,
            equipment,
            inventory,
            buffs: Vec::new(),
            input: PlayerInput::default(),
            instance_id: String::new(),
            last_hit_at: 0.0,
            last_shot_at: f64::NEG_INFINITY,
            last_ability_at: f64::NEG_INFINITY,
            lifetime: record.lifetime,
            vault_open: false,
            removed: false,
            hp_regen_acc: 0.0,
            mp_regen_acc: 0.0,
        }
    }

    pub fn to_record(&self) -> CharacterRecord {
        let mut items = Vec::with_capacity(EQUIP_SLOTS + INVENTORY_SLOTS);
        items.extend(self.equipment.iter().cloned());
        items.extend(self.inventory.iter().cloned());
        CharacterRecord {
            id: self.character_id,
            account_id: self.account_id,
            name: self.name.clone(),
            class_id: self.class_id.clone(),
            level: self.level,
            exp: self.exp,
            hp: self.hp,
            max_hp: self.max_hp,
            mp: self.mp,
            max_mp: self.max_mp,
            stats: self.stats,
            items,
            lifetime: self.lifetime,
            alive: true,
        }
    }

    // ------------------------------------------------------------------------
    // Derived stats
    // ------------------------------------------------------------------------

    fn buff_bonus(&self, kind: StatKind, now: f64) -> i32 {
        self.buffs
            .iter()
            .filter(|b| b.stat == kind && b.expires_at > now)
            .map(|b| b.amount)
            .sum()
    }

    /// Bonus from worn equipment: ring bonuses plus armor defense.
    fn equip_bonus(&self, kind: StatKind, data: &GameData) -> i32 {
        let mut bonus = 0;
        if kind == StatKind::Defense {
            if let Some(armor) = self.equipment[2]
                .as_deref()
                .and_then(|id| data.items.get(id))
                .and_then(|i| i.as_armor())
            {
                bonus += armor.defense;
            }
        }
        if let Some(ring) = self.equipment[3]
            .as_deref()
            .and_then(|id| data.items.get(id))
            .and_then(|i| i.as_ring())
        {
            bonus += ring
                .bonuses
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, v)| v)
                .sum::<i32>();
        }
        bonus
    }

    fn effective_stat(&self, kind: StatKind, data: &GameData, now: f64) -> i32 {
        self.stats.get(kind) + self.equip_bonus(kind, data) + self.buff_bonus(kind, now)
    }

    pub fn effective_attack(&self, data: &GameData, now: f64) -> i32 {
        self.effective_stat(StatKind::Attack, data, now)
    }

    pub fn effective_defense(&self, data: &GameData, now: f64) -> i32 {
        self.effective_stat(StatKind::Defense, data, now)
    }

    /// Tiles per second: `4 + 0.1` per effective speed point.
    pub fn effective_speed(&self, data: &GameData, now: f64) -> f32 {
        4.0 + 0.1 * self.effective_stat(StatKind::Speed, data, now) as f32
    }

    pub fn effective_max_hp(&self, data: &GameData, now: f64) -> i32 {
        self.max_hp + self.equip_bonus(StatKind::MaxHp, data) + self.buff_bonus(StatKind::MaxHp, now)
    }

    pub fn effective_max_mp(&self, data: &GameData, now: f64) -> i32 {
        self.max_mp + self.equip_bonus(StatKind::MaxMp, data) + self.buff_bonus(StatKind::MaxMp, now)
    }

    pub fn clamp_vitals(&mut self, data: &GameData, now: f64) {
        self.hp = self.hp.min(self.effective_max_hp(data, now)).max(0);
        self.mp = self.mp.min(self.effective_max_mp(data, now)).max(0);
    }

    // ------------------------------------------------------------------------
    // Per-tick update
    // ------------------------------------------------------------------------

    pub fn tick(&mut self, dt: f64, now: f64, map: &GameMap, safe_zone: bool, data: &GameData) {
        self.lifetime.seconds_played += dt;
        self.apply_movement(dt, now, map, data);
        self.buffs.retain(|b| b.expires_at > now);
        self.tick_regen(dt, now, safe_zone, data);
        self.clamp_vitals(data, now);
    }

    /// Input-directed movement with swept collision: try the full diagonal
    /// step, then slide along x only, then y only.
    fn apply_movement(&mut self, dt: f64, now: f64, map: &GameMap, data: &GameData) {
        let mut dir = self.input.move_direction;
        if dir.length_squared() <= f32::EPSILON {
            return;
        }
        if dir.length() > 1.0 {
            dir = dir.normalize();
        }
        let delta = dir * self.effective_speed(data, now) * dt as f32;

        let full = self.pos + delta;
        if map.can_stand(full, self.radius) {
            self.pos = full;
            return;
        }
        let x_only = self.pos + Vec2::new(delta.x, 0.0);
        if delta.x != 0.0 && map.can_stand(x_only, self.radius) {
            self.pos = x_only;
            return;
        }
        let y_only = self.pos + Vec2::new(0.0, delta.y);
        if delta.y != 0.0 && map.can_stand(y_only, self.radius) {
            self.pos = y_only;
        }
    }

    /// Accumulates fractional regen and releases whole points. Safe zones
    /// trade the stat-driven rates for a flat 20% of max per second.
    fn tick_regen(&mut self, dt: f64, now: f64, safe_zone: bool, data: &GameData) {
        let max_hp = self.effective_max_hp(data, now);
        let max_mp = self.effective_max_mp(data, now);
        let (hp_rate, mp_rate) = if safe_zone {
            (max_hp as f64 * 0.2, max_mp as f64 * 0.2)
        } else {
            let vit = self.effective_stat(StatKind::Vitality, data, now) as f64;
            let wis = self.effective_stat(StatKind::Wisdom, data, now) as f64;
            (1.0 + vit * 0.12, 0.5 + wis * 0.06)
        };

        if self.hp < max_hp {
            self.hp_regen_acc += hp_rate * dt;
            let whole = self.hp_regen_acc.floor() as i32;
            if whole > 0 {
                self.hp = (self.hp + whole).min(max_hp);
                self.hp_regen_acc -= whole as f64;
            }
        } else {
            self.hp_regen_acc = 0.0;
        }
        if self.mp < max_mp {
            self.mp_regen_acc += mp_rate * dt;
            let whole = self.mp_regen_acc.floor() as i32;
            if whole > 0 {
                self.mp = (self.mp + whole).min(max_mp);
                self.mp_regen_acc -= whole as f64;
            }
        } else {
            self.mp_regen_acc = 0.0;
        }
    }

    // ------------------------------------------------------------------------
    // Shooting
    // ------------------------------------------------------------------------

    /// Fires the equipped weapon if it is off cooldown; returns the
    /// projectiles to spawn.
    pub fn try_shoot(
        &mut self,
        now: f64,
        aim_angle: f32,
        data: &GameData,
        rng: &mut impl Rng,
    ) -> Vec<ProjectileSpawn> {
        let Some(weapon) = self.equipment[0]
            .as_deref()
            .and_then(|id| data.items.get(id))
            .and_then(|i| i.as_weapon())
        else {
            return Vec::new();
        };
        let dex = self.effective_stat(StatKind::Dexterity, data, now);
        let shots_per_sec = weapon.rate_of_fire * (1.0 + dex as f32 * 0.02);
        if shots_per_sec <= 0.0 || now - self.last_shot_at < 1.0 / shots_per_sec as f64 {
            return Vec::new();
        }
        self.last_shot_at = now;

        let Some(projectile) = data.projectiles.get(weapon.projectile) else {
            return Vec::new();
        };
        let attack = self.effective_attack(data, now);
        let gap = weapon.arc_gap_deg.to_radians();
        let n = weapon.num_projectiles;
        let mut spawns = Vec::with_capacity(n as usize);
        for i in 0..n {
            let offset = (i as f32 - (n as f32 - 1.0) / 2.0) * gap;
            let roll = rng.gen_range(weapon.damage_min..=weapon.damage_max);
            let damage = (roll as f64 + attack as f64 * 0.5).floor() as i32;
            spawns.push(ProjectileSpawn {
                owner: self.id,
                side: Side::Player,
                def_id: weapon.projectile.to_string(),
                pos: self.pos,
                angle: aim_angle + offset,
                speed: projectile.speed,
                radius: projectile.radius,
                damage,
                pierce: weapon.pierce,
                lifetime: (weapon.range / projectile.speed) as f64,
            });
        }
        self.lifetime.shots_fired += n as i64;
        spawns
    }

    // ------------------------------------------------------------------------
    // Abilities
    // ------------------------------------------------------------------------

    /// Checks MP and cooldown; on success consumes both and returns the
    /// ability to execute.
    pub fn try_use_ability<'a>(&mut self, now: f64, data: &'a GameData) -> Option<&'a AbilityDef> {
        let ability = self.equipment[1]
            .as_deref()
            .and_then(|id| data.items.get(id))
            .and_then(|i| i.as_ability())?;
        if self.mp < ability.mp_cost {
            return None;
        }
        if now - self.last_ability_at < ability.cooldown as f64 {
            return None;
        }
        self.mp -= ability.mp_cost;
        self.last_ability_at = now;
        self.lifetime.abilities_used += 1;
        Some(ability)
    }

    pub fn apply_buff(&mut self, stat: StatKind, amount: i32, duration: f32, now: f64) {
        self.buffs.push(Buff {
            stat,
            amount,
            expires_at: now + duration as f64,
        });
    }

    // ------------------------------------------------------------------------
    // Experience
    // ------------------------------------------------------------------------

    /// Adds exp; on threshold, grows stats by the class table, refills
    /// vitals, and resets exp. Returns true when a level was gained.
    pub fn add_exp(&mut self, amount: u32, class: &ClassDefinition, data: &GameData, now: f64) -> bool {
        self.exp += amount as u64;
        if self.level >= MAX_LEVEL || self.exp < exp_for_next_level(self.level) {
            return false;
        }
        self.level += 1;
        self.exp = 0;
        self.stats.add(&class.stat_growth);
        self.max_hp += class.hp_per_level;
        self.max_mp += class.mp_per_level;
        self.hp = self.effective_max_hp(data, now);
        self.mp = self.effective_max_mp(data, now);
        true
    }

    // ------------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------------

    pub fn slot_get(&self, slot: usize) -> Option<&str> {
        if slot < EQUIP_SLOTS {
            self.equipment[slot].as_deref()
        } else if slot < EQUIP_SLOTS + INVENTORY_SLOTS {
            self.inventory[slot - EQUIP_SLOTS].as_deref()
        } else {
            None
        }
    }

    pub fn set_slot(&mut self, slot: usize, item: Option<String>) {
        if slot < EQUIP_SLOTS {
            self.equipment[slot] = item;
        } else if slot < EQUIP_SLOTS + INVENTORY_SLOTS {
            self.inventory[slot - EQUIP_SLOTS] = item;
        }
    }

    pub fn first_empty_inventory_slot(&self) -> Option<usize> {
        self.inventory.iter().position(|s| s.is_none())
    }

    /// Whether `item` may occupy `slot` for this player's class.
    pub fn item_fits_slot(&self, slot: usize, item: Option<&str>, data: &GameData) -> bool {
        let Some(item_id) = item else {
            return true;
        };
        if slot >= EQUIP_SLOTS {
            return true;
        }
        let Some(class) = data.classes.get(&self.class_id) else {
            return false;
        };
        let Some(def) = data.items.get(item_id) else {
            return false;
        };
        match (slot, &def.kind) {
            (0, ItemKind::Weapon(w)) => w.weapon_type == class.weapon_type,
            (1, ItemKind::Ability(a)) => a.ability_type == class.ability_type,
            (2, ItemKind::Armor(a)) => a.armor_type == class.armor_type,
            (3, ItemKind::Ring(_)) => true,
            _ => false,
        }
    }

    /// Swaps two of the twelve item slots, refusing incompatible equipment
    /// placements. Vitals are re-clamped because armor/ring maxes may shrink.
    pub fn swap_items(&mut self, from: usize, to: usize, data: &GameData, now: f64) -> bool {
        const SLOTS: usize = EQUIP_SLOTS + INVENTORY_SLOTS;
        if from == to || from >= SLOTS || to >= SLOTS {
            return false;
        }
        let from_item = self.slot_get(from).map(str::to_string);
        let to_item = self.slot_get(to).map(str::to_string);
        if !self.item_fits_slot(to, from_item.as_deref(), data)
            || !self.item_fits_slot(from, to_item.as_deref(), data)
        {
            return false;
        }
        self.set_slot(from, to_item);
        self.set_slot(to, from_item);
        self.clamp_vitals(data, now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::CharacterRecord;
    use crate::entity::new_entity_id;
    use crate::map::GameMap;
    use emberfall_shared::Tile;
    use rand::SeedableRng;

    fn test_data() -> GameData {
        GameData::default()
    }

    fn wizard(data: &GameData) -> Player {
        let record = CharacterRecord::fresh(1, 1, "tester", data.classes.get("wizard").unwrap());
        let mut player = Player::from_record(new_entity_id(), &record);
        player.pos = Vec2::new(5.0, 5.0);
        player
    }

    fn open_map() -> GameMap {
        let mut map = GameMap::new(16, 16);
        map.fill(0, 0, 16, 16, Tile::Floor);
        map
    }

    #[test]
    fn test_wall_slide_keeps_player_out_of_wall() {
        let data = test_data();
        let mut map = open_map();
        map.set(6, 5, Tile::Wall);
        let mut player = wizard(&data);
        player.input.move_direction = Vec2::new(1.0, 0.0);

        // 200ms of input at 20Hz ticks.
        for _ in 0..4 {
            player.tick(0.05, 0.0, &map, false, &data);
        }
        assert!(player.pos.x <= 6.0 - player.radius + 1e-3);
        assert!((player.pos.y - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_wall_slide_slides_along_y() {
        let data = test_data();
        let mut map = open_map();
        map.set(6, 5, Tile::Wall);
        let mut player = wizard(&data);
        player.pos = Vec2::new(5.5, 5.5);
        player.input.move_direction = Vec2::new(1.0, 1.0).normalize();
        for _ in 0..4 {
            player.tick(0.05, 0.0, &map, false, &data);
        }
        // Blocked in x by the wall but still moving down in y.
        assert!(player.pos.y > 5.5);
    }

    #[test]
    fn test_regen_releases_integer_points() {
        let data = test_data();
        let map = open_map();
        let mut player = wizard(&data);
        player.hp = 10;
        // Wizard vit 5: 1 + 0.6 = 1.6 hp/s. After 1s => 1 point, acc 0.6.
        for i in 0..20 {
            player.tick(0.05, i as f64 * 0.05, &map, false, &data);
        }
        assert_eq!(player.hp, 11);
    }

    #[test]
    fn test_safe_zone_regen_is_twenty_percent() {
        let data = test_data();
        let map = open_map();
        let mut player = wizard(&data);
        player.hp = 1;
        // One full second in the nexus restores 20% of max (100) = 20.
        for i in 0..20 {
            player.tick(0.05, i as f64 * 0.05, &map, true, &data);
        }
        assert_eq!(player.hp, 21);
    }

    #[test]
    fn test_shoot_damage_range_and_cooldown() {
        let data = test_data();
        let mut player = wizard(&data);
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let spawns = player.try_shoot(10.0, 0.0, &data, &mut rng);
        assert_eq!(spawns.len(), 1);
        // floor(uniform[15,25] + 15*0.5) => [22, 32]
        assert!(spawns[0].damage >= 22 && spawns[0].damage <= 32);
        // Immediately again: still on cooldown.
        assert!(player.try_shoot(10.001, 0.0, &data, &mut rng).is_empty());
    }

    #[test]
    fn test_level_up_grows_stats_and_refills() {
        let data = test_data();
        let class = data.classes.get("wizard").unwrap();
        let mut player = wizard(&data);
        player.hp = 5;
        let attack_before = player.stats.attack;
        assert!(player.add_exp(100, class, &data, 0.0));
        assert_eq!(player.level, 2);
        assert_eq!(player.exp, 0);
        assert_eq!(player.stats.attack, attack_before + class.stat_growth.attack);
        assert_eq!(player.hp, player.max_hp);
        // 99 exp is not enough for the next threshold (120).
        assert!(!player.add_exp(99, class, &data, 0.0));
    }

    #[test]
    fn test_swap_rejects_class_incompatible_weapon() {
        let data = test_data();
        let mut player = wizard(&data);
        // Put a sword in inventory slot 0 (absolute slot 4).
        player.inventory[0] = Some("starter_sword".into());
        assert!(!player.swap_items(4, 0, &data, 0.0));
        // A staff swaps fine.
        player.inventory[0] = Some("ember_staff".into());
        assert!(player.swap_items(4, 0, &data, 0.0));
        assert_eq!(player.equipment[0].as_deref(), Some("ember_staff"));
        assert_eq!(player.inventory[0].as_deref(), Some("starter_staff"));
    }

    #[test]
    fn test_double_swap_restores_layout() {
        let data = test_data();
        let mut player = wizard(&data);
        player.inventory[2] = Some("ring_of_attack".into());
        let equip_before = player.equipment.clone();
        let inv_before = player.inventory.clone();
        assert!(player.swap_items(6, 3, &data, 0.0));
        assert!(player.swap_items(3, 6, &data, 0.0));
        assert_eq!(player.equipment, equip_before);
        assert_eq!(player.inventory, inv_before);
    }

    #[test]
    fn test_ring_hp_bonus_raises_and_clamps() {
        let data = test_data();
        let mut player = wizard(&data);
        player.equipment[3] = Some("ring_of_health".into());
        player.hp = 140;
        player.clamp_vitals(&data, 0.0);
        assert_eq!(player.hp, 140);
        // Unequipping clamps back down to the bare max.
        player.equipment[3] = None;
        player.clamp_vitals(&data, 0.0);
        assert_eq!(player.hp, 100);
    }

    #[test]
    fn test_ability_gated_by_mp_and_cooldown() {
        let data = test_data();
        let mut player = wizard(&data);
        assert!(player.try_use_ability(0.0, &data).is_some());
        assert_eq!(player.mp, 70);
        // Cooldown (1s) blocks the next cast.
        assert!(player.try_use_ability(0.5, &data).is_none());
        assert!(player.try_use_ability(1.5, &data).is_some());
        player.mp = 5;
        assert!(player.try_use_ability(10.0, &data).is_none());
    }
}
