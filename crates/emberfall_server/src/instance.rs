use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use glam::Vec2;
use log::{error, warn};
use rand::Rng;

use emberfall_shared::{
    ChestView, EnemyView, InstanceKind, PlayerView, ProjectileView, SelfView, ServerMessage,
    Snapshot, AOI_RADIUS, PICKUP_RANGE, PORTAL_INTERACT_RANGE, SNAPSHOT_EVERY_TICKS,
    SOULBOUND_THRESHOLD, VAULT_CHEST_INTERACT_RANGE,
};

use crate::command::Router;
use crate::entity::{
    circles_overlap, new_entity_id, Enemy, EntityId, LootBag, Player, Portal, Projectile,
    ProjectileSpawn, Side, TargetInfo, VaultChest,
};
use crate::game_data::{exp_for_next_level, AbilityEffect, GameData};
use crate::map::GameMap;
use crate::mapgen;

// ============================================================================
// INSTANCE METADATA
// ============================================================================

/// Dungeon-only bookkeeping.
pub struct DungeonMeta {
    pub dungeon_def: String,
    pub boss_room: Vec2,
    /// Instance the entry portal was dropped in; the return portal points here.
    pub source_instance: String,
    pub boss_killed: bool,
    pub initial_spawn_done: bool,
    /// First player's spawn, reused for everyone arriving later.
    pub entry_point: Option<Vec2>,
}

/// What an instance needs the orchestrator to do after its update.
#[derive(Debug, Clone)]
pub enum InstanceEvent {
    PlayerDied { player_id: EntityId, killer: String },
    DungeonPortalDrop { dungeon_def: String, pos: Vec2 },
    BossKilled { pos: Vec2 },
}

// ============================================================================
// INSTANCE
// ============================================================================

/// One isolated world: owns its entities outright and runs the fixed
/// per-tick pipeline (entities, combat, spawns, cleanup, snapshots).
pub struct Instance {
    pub id: String,
    pub kind: InstanceKind,
    /// Disables combat and the spawn scheduler, enables 20%/s regen.
    pub safe_zone: bool,
    pub map: GameMap,
    pub players: HashMap<EntityId, Player>,
    pub enemies: HashMap<EntityId, Enemy>,
    pub projectiles: HashMap<EntityId, Projectile>,
    pub loot: HashMap<EntityId, LootBag>,
    pub portals: HashMap<EntityId, Portal>,
    pub chests: HashMap<EntityId, VaultChest>,
    region_timers: Vec<f64>,
    pub dungeon: Option<DungeonMeta>,
    /// Vault instances remember whose vault they are.
    pub vault_account: Option<i64>,
}

impl Instance {
    fn empty(id: String, kind: InstanceKind, safe_zone: bool, map: GameMap) -> Self {
        let region_timers = vec![0.0; map.regions.len()];
        Self {
            id,
            kind,
            safe_zone,
            map,
            players: HashMap::new(),
            enemies: HashMap::new(),
            projectiles: HashMap::new(),
            loot: HashMap::new(),
            portals: HashMap::new(),
            chests: HashMap::new(),
            region_timers,
            dungeon: None,
            vault_account: None,
        }
    }

    pub fn nexus(id: impl Into<String>) -> Self {
        Self::empty(id.into(), InstanceKind::Nexus, true, mapgen::nexus_map())
    }

    pub fn realm(id: impl Into<String>, map: GameMap) -> Self {
        Self::empty(id.into(), InstanceKind::Realm, false, map)
    }

    pub fn dungeon(
        id: impl Into<String>,
        dungeon_def: impl Into<String>,
        layout: mapgen::DungeonLayout,
        source_instance: impl Into<String>,
    ) -> Self {
        let mut instance = Self::empty(id.into(), InstanceKind::Dungeon, false, layout.map);
        instance.dungeon = Some(DungeonMeta {
            dungeon_def: dungeon_def.into(),
            boss_room: layout.boss_center,
            source_instance: source_instance.into(),
            boss_killed: false,
            initial_spawn_done: false,
            entry_point: None,
        });
        instance
    }

    pub fn vault(account_id: i64) -> Self {
        let mut instance = Self::empty(
            format!("vault-{}", account_id),
            InstanceKind::Vault,
            true,
            mapgen::vault_map(),
        );
        instance.vault_account = Some(account_id);
        let chest = VaultChest {
            id: new_entity_id(),
            pos: mapgen::vault_chest_position(),
        };
        instance.chests.insert(chest.id, chest);
        instance
    }

    // ------------------------------------------------------------------------
    // Player membership
    // ------------------------------------------------------------------------

    /// Places the player at the instance's spawn; dungeons pin the first
    /// arrival's spawn and reuse it for everyone after.
    pub fn add_player(&mut self, mut player: Player) -> Vec2 {
        let default_spawn = self.map.spawn_point();
        let spawn = match &mut self.dungeon {
            Some(meta) => *meta.entry_point.get_or_insert(default_spawn),
            None => default_spawn,
        };
        player.pos = spawn;
        player.instance_id = self.id.clone();
        player.input = Default::default();
        player.vault_open = false;
        self.players.insert(player.id, player);
        spawn
    }

    /// Detaches the player entity for the caller to persist or transfer.
    pub fn remove_player(&mut self, player_id: EntityId) -> Option<Player> {
        self.players.remove(&player_id)
    }

    // ------------------------------------------------------------------------
    // Spawning
    // ------------------------------------------------------------------------

    pub fn spawn_enemy(&mut self, def_id: &str, pos: Vec2, data: &GameData) -> Option<EntityId> {
        let Some(def) = data.enemies.get(def_id) else {
            warn!("instance {}: unknown enemy '{}'", self.id, def_id);
            return None;
        };
        let enemy = Enemy::from_def(new_entity_id(), def, pos);
        let id = enemy.id;
        self.enemies.insert(id, enemy);
        Some(id)
    }

    pub fn spawn_projectiles(&mut self, spawns: Vec<ProjectileSpawn>, now: f64) {
        for spawn in spawns {
            let projectile = Projectile::from_spawn(new_entity_id(), spawn, now);
            self.projectiles.insert(projectile.id, projectile);
        }
    }

    pub fn add_portal(&mut self, portal: Portal) {
        self.portals.insert(portal.id, portal);
    }

    /// Fills every spawn region up to its cap in one sweep, then latches
    /// the dungeon so the scheduler stays inert afterwards.
    pub fn initial_dungeon_spawn(&mut self, data: &GameData) {
        let mut rng = rand::thread_rng();
        let mut to_spawn = Vec::new();
        for region in &self.map.regions {
            for _ in 0..region.max_alive {
                if let (Some(id), Some(pos)) = (
                    region.pick_enemy(&mut rng).map(str::to_string),
                    self.map.random_point_in(region, &mut rng),
                ) {
                    to_spawn.push((id, pos));
                }
            }
        }
        for (id, pos) in to_spawn {
            self.spawn_enemy(&id, pos, data);
        }
        if let Some(meta) = &mut self.dungeon {
            meta.initial_spawn_done = true;
        }
    }

    // ------------------------------------------------------------------------
    // Interactions (applied from drained commands at the head of a tick)
    // ------------------------------------------------------------------------

    /// Returns the portal if the player stands within interact range;
    /// does not move anyone.
    pub fn try_enter_portal(&self, player_id: EntityId, portal_id: EntityId) -> Option<&Portal> {
        let player = self.players.get(&player_id)?;
        let portal = self.portals.get(&portal_id)?;
        if portal.removed || player.pos.distance(portal.pos) > PORTAL_INTERACT_RANGE {
            return None;
        }
        Some(portal)
    }

    /// Moves the first item of a bag into the player's first empty
    /// inventory slot. Out-of-range, foreign soulbound bags, and full
    /// inventories all silently no-op.
    pub fn try_pickup_loot(&mut self, player_id: EntityId, loot_id: EntityId) -> bool {
        let Some((pos, slot)) = self
            .players
            .get(&player_id)
            .map(|p| (p.pos, p.first_empty_inventory_slot()))
        else {
            return false;
        };
        let Some(slot) = slot else {
            return false;
        };
        let item = {
            let Some(bag) = self.loot.get_mut(&loot_id) else {
                return false;
            };
            if bag.removed || pos.distance(bag.pos) > PICKUP_RANGE {
                return false;
            }
            if bag.soulbound && bag.owner != Some(player_id) {
                return false;
            }
            bag.take_first()
        };
        let Some(item) = item else {
            return false;
        };
        if let Some(player) = self.players.get_mut(&player_id) {
            player.inventory[slot] = Some(item);
            true
        } else {
            false
        }
    }

    /// Clears a slot and drops its item, merging into the player's own
    /// nearby bag of matching soulbound-ness when one has room. Returns a
    /// view when a brand-new bag appeared.
    pub fn drop_item(
        &mut self,
        player_id: EntityId,
        slot: usize,
        data: &GameData,
        now: f64,
    ) -> Option<emberfall_shared::LootView> {
        let (item, pos) = {
            let player = self.players.get_mut(&player_id)?;
            let item = player.slot_get(slot)?.to_string();
            player.set_slot(slot, None);
            player.clamp_vitals(data, now);
            (item, player.pos)
        };
        let soulbound = data
            .items
            .get(&item)
            .map(|i| i.soulbound)
            .unwrap_or(false);

        if let Some(bag) = self.loot.values_mut().find(|b| {
            !b.removed
                && b.owner == Some(player_id)
                && b.soulbound == soulbound
                && b.has_room()
                && b.pos.distance(pos) < 0.5
        }) {
            bag.items.push(item);
            return None;
        }

        let bag = if soulbound {
            LootBag::soulbound(new_entity_id(), pos, vec![item], player_id, now)
        } else {
            LootBag::public(new_entity_id(), pos, vec![item], Some(player_id), now)
        };
        let view = bag.to_view();
        self.loot.insert(bag.id, bag);
        Some(view)
    }

    /// Player shoot driven by an explicit `shoot` message (the input flag
    /// path goes through the entity tick).
    pub fn player_shoot(&mut self, player_id: EntityId, aim_angle: f32, data: &GameData, now: f64) {
        let mut rng = rand::thread_rng();
        let spawns = match self.players.get_mut(&player_id) {
            Some(player) => player.try_shoot(now, aim_angle, data, &mut rng),
            None => return,
        };
        self.spawn_projectiles(spawns, now);
    }

    /// Consumes MP/cooldown and applies one of the four ability effects,
    /// then broadcasts the visual to everyone nearby.
    pub fn execute_ability(
        &mut self,
        player_id: EntityId,
        data: &GameData,
        now: f64,
        router: &Router,
        events: &mut Vec<InstanceEvent>,
    ) {
        let (effect, ability_id, pos, aim) = {
            let Some(player) = self.players.get_mut(&player_id) else {
                return;
            };
            let aim = player.input.aim_angle;
            let item_id = match player.equipment[1].clone() {
                Some(id) => id,
                None => return,
            };
            let Some(ability) = player.try_use_ability(now, data) else {
                return;
            };
            (ability.effect, item_id, player.pos, aim)
        };

        match effect {
            AbilityEffect::Damage { range, radius, amount } => {
                let center = pos + range * Vec2::new(aim.cos(), aim.sin());
                let victims: Vec<EntityId> = self
                    .enemies
                    .values()
                    .filter(|e| !e.removed && e.hp > 0)
                    .filter(|e| circles_overlap(center, radius, e.pos, e.radius))
                    .map(|e| e.id)
                    .collect();
                for victim in victims {
                    self.damage_enemy(victim, player_id, amount, data, now, router, events);
                }
            }
            AbilityEffect::Buff { stat, amount, duration } => {
                if let Some(player) = self.players.get_mut(&player_id) {
                    player.apply_buff(stat, amount, duration, now);
                }
            }
            AbilityEffect::Heal { amount } => {
                if let Some(player) = self.players.get_mut(&player_id) {
                    let max = player.effective_max_hp(data, now);
                    player.hp = (player.hp + amount).min(max);
                }
            }
            AbilityEffect::Teleport { range } => {
                if let Some(player) = self.players.get_mut(&player_id) {
                    let dir = Vec2::new(aim.cos(), aim.sin());
                    let mut distance = range;
                    while distance > 0.0 {
                        let candidate = pos + dir * distance;
                        if self.map.can_stand(candidate, player.radius) {
                            player.pos = candidate;
                            break;
                        }
                        distance -= 0.5;
                    }
                }
            }
        }

        let effect_msg = ServerMessage::AbilityEffect {
            player_id,
            ability_id,
            x: pos.x,
            y: pos.y,
        };
        for viewer in self.players.values() {
            if viewer.pos.distance(pos) <= AOI_RADIUS {
                router.send(viewer.id, effect_msg.clone());
            }
        }
    }

    /// Vault chest interaction: range-gated; flips the player's open flag.
    pub fn try_open_vault_chest(&mut self, player_id: EntityId) -> bool {
        let Some(player) = self.players.get_mut(&player_id) else {
            return false;
        };
        let in_range = self
            .chests
            .values()
            .any(|c| c.pos.distance(player.pos) <= VAULT_CHEST_INTERACT_RANGE);
        if in_range {
            player.vault_open = true;
        }
        in_range
    }

    // ------------------------------------------------------------------------
    // The per-tick pipeline
    // ------------------------------------------------------------------------

    /// Entity tick -> combat -> spawns, with cleanup guaranteed to run even
    /// if a stage panics, then AOI snapshots on every other tick.
    pub fn update(
        &mut self,
        dt: f64,
        now: f64,
        tick: u64,
        data: &GameData,
        router: &Router,
    ) -> Vec<InstanceEvent> {
        let mut events = Vec::new();
        let stages = catch_unwind(AssertUnwindSafe(|| {
            self.tick_entities(dt, now, data);
            if !self.safe_zone {
                self.resolve_combat(now, data, router, &mut events);
                self.run_spawn_scheduler(dt, data);
            }
        }));
        if let Err(payload) = stages {
            error!(
                "instance {}: tick panicked: {:?}; continuing next tick",
                self.id,
                payload.downcast_ref::<&str>()
            );
        }
        self.cleanup();
        if tick % SNAPSHOT_EVERY_TICKS == 0 {
            self.emit_snapshots(tick, now, data, router);
        }
        events
    }

    fn tick_entities(&mut self, dt: f64, now: f64, data: &GameData) {
        let mut rng = rand::thread_rng();
        let mut spawns = Vec::new();

        for player in self.players.values_mut() {
            if player.hp <= 0 {
                continue;
            }
            player.tick(dt, now, &self.map, self.safe_zone, data);
            if player.input.shooting {
                let aim = player.input.aim_angle;
                spawns.extend(player.try_shoot(now, aim, data, &mut rng));
            }
        }

        let targets: Vec<TargetInfo> = self
            .players
            .values()
            .filter(|p| p.hp > 0)
            .map(|p| {
                let dir = p.input.move_direction;
                TargetInfo {
                    id: p.id,
                    pos: p.pos,
                    move_dir: if dir.length_squared() > 1.0 {
                        dir.normalize()
                    } else {
                        dir
                    },
                    speed: p.effective_speed(data, now),
                }
            })
            .collect();

        for enemy in self.enemies.values_mut() {
            if enemy.removed {
                continue;
            }
            let Some(def) = data.enemies.get(&enemy.def_id) else {
                continue;
            };
            spawns.extend(enemy.update(dt, now, def, &targets, &self.map, data, &mut rng));
        }

        self.spawn_projectiles(spawns, now);

        for projectile in self.projectiles.values_mut() {
            if !projectile.removed {
                projectile.update(dt, now, &self.map);
            }
        }
        for bag in self.loot.values_mut() {
            bag.update(now);
        }
        for portal in self.portals.values_mut() {
            portal.update(now);
        }
    }

    /// Circle-circle sweep of every live projectile against opposed-side
    /// targets. The hit set keeps piercing projectiles from double-counting.
    fn resolve_combat(
        &mut self,
        now: f64,
        data: &GameData,
        router: &Router,
        events: &mut Vec<InstanceEvent>,
    ) {
        let projectile_ids: Vec<EntityId> = self.projectiles.keys().copied().collect();
        for projectile_id in projectile_ids {
            let Some(projectile) = self.projectiles.get(&projectile_id) else {
                continue;
            };
            if projectile.removed {
                continue;
            }
            let (ppos, pradius, side, raw, owner) = (
                projectile.pos,
                projectile.radius,
                projectile.side,
                projectile.damage,
                projectile.owner,
            );

            match side {
                Side::Enemy => {
                    let victims: Vec<EntityId> = self
                        .players
                        .values()
                        .filter(|pl| pl.hp > 0 && circles_overlap(ppos, pradius, pl.pos, pl.radius))
                        .map(|pl| pl.id)
                        .collect();
                    for victim in victims {
                        if !self.try_record_hit(projectile_id, victim) {
                            continue;
                        }
                        self.damage_player(victim, raw, owner, data, now, router, events);
                        if self
                            .projectiles
                            .get(&projectile_id)
                            .map(|p| p.removed)
                            .unwrap_or(true)
                        {
                            break;
                        }
                    }
                }
                Side::Player => {
                    let victims: Vec<EntityId> = self
                        .enemies
                        .values()
                        .filter(|e| !e.removed && e.hp > 0)
                        .filter(|e| circles_overlap(ppos, pradius, e.pos, e.radius))
                        .map(|e| e.id)
                        .collect();
                    for victim in victims {
                        if !self.try_record_hit(projectile_id, victim) {
                            continue;
                        }
                        self.damage_enemy(victim, owner, raw, data, now, router, events);
                        if self
                            .projectiles
                            .get(&projectile_id)
                            .map(|p| p.removed)
                            .unwrap_or(true)
                        {
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Records the hit on the projectile; false when already hit or the
    /// set is saturated.
    fn try_record_hit(&mut self, projectile_id: EntityId, victim: EntityId) -> bool {
        let Some(projectile) = self.projectiles.get_mut(&projectile_id) else {
            return false;
        };
        if projectile.removed || projectile.has_hit(victim) {
            return false;
        }
        projectile.record_hit(victim)
    }

    /// Enemy -> player damage: at least 15% of raw bleeds through defense.
    fn damage_player(
        &mut self,
        victim: EntityId,
        raw: i32,
        attacker: EntityId,
        data: &GameData,
        now: f64,
        router: &Router,
        events: &mut Vec<InstanceEvent>,
    ) {
        let killer_name = self
            .enemies
            .get(&attacker)
            .and_then(|e| data.enemies.get(&e.def_id))
            .map(|d| d.name.to_string())
            .unwrap_or_else(|| "the wilds".to_string());
        let Some(player) = self.players.get_mut(&victim) else {
            return;
        };
        if player.hp <= 0 {
            return;
        }
        let defense = player.effective_defense(data, now);
        let bleed = (raw as f64 * emberfall_shared::DEFENSE_BLEED_THROUGH).floor() as i32;
        let amount = bleed.max(raw - defense);
        player.hp -= amount;
        player.last_hit_at = now;
        player.lifetime.damage_taken += amount as i64;
        router.send(victim, ServerMessage::Damage { target: victim, amount });
        if player.hp <= 0 {
            events.push(InstanceEvent::PlayerDied {
                player_id: victim,
                killer: killer_name,
            });
        }
    }

    /// Player -> enemy damage: flat defense subtraction floored at 1,
    /// attributed for loot qualification.
    fn damage_enemy(
        &mut self,
        victim: EntityId,
        attacker: EntityId,
        raw: i32,
        data: &GameData,
        now: f64,
        router: &Router,
        events: &mut Vec<InstanceEvent>,
    ) {
        let dead = {
            let Some(enemy) = self.enemies.get_mut(&victim) else {
                return;
            };
            if enemy.hp <= 0 {
                return;
            }
            let defense = data.enemies.get(&enemy.def_id).map(|d| d.defense).unwrap_or(0);
            let amount = (raw - defense).max(1);
            enemy.hp -= amount;
            enemy.record_damage(attacker, amount as i64);
            let pos = enemy.pos;
            let dead = enemy.hp <= 0;
            if dead {
                enemy.removed = true;
            }

            if let Some(shooter) = self.players.get_mut(&attacker) {
                shooter.lifetime.damage_dealt += amount as i64;
            }
            let msg = ServerMessage::Damage { target: victim, amount };
            for viewer in self.players.values() {
                if viewer.pos.distance(pos) <= AOI_RADIUS {
                    router.send(viewer.id, msg.clone());
                }
            }
            dead
        };
        if dead {
            self.handle_enemy_death(victim, attacker, data, now, router, events);
        }
    }

    /// Death bookkeeping: exp to the killing shot's owner, attributed loot
    /// rolls, dungeon-portal drops, and the boss-kill latch.
    fn handle_enemy_death(
        &mut self,
        enemy_id: EntityId,
        killer: EntityId,
        data: &GameData,
        now: f64,
        router: &Router,
        events: &mut Vec<InstanceEvent>,
    ) {
        let (def_id, pos, max_hp, attribution) = {
            let Some(enemy) = self.enemies.get(&enemy_id) else {
                return;
            };
            (
                enemy.def_id.clone(),
                enemy.pos,
                enemy.max_hp,
                enemy.damage_by_player.clone(),
            )
        };
        let Some(def) = data.enemies.get(&def_id) else {
            return;
        };

        if let Some(player) = self.players.get_mut(&killer) {
            player.lifetime.enemies_killed += 1;
            if let Some(class) = data.classes.get(&player.class_id) {
                if player.add_exp(def.exp, class, data, now) {
                    router.send(killer, ServerMessage::LevelUp { level: player.level });
                }
            }
        }

        // Loot: one independent roll per table entry; soulbound items turn
        // into a private bag per qualifying attacker, the rest share one
        // public bag.
        let mut rng = rand::thread_rng();
        let mut public_items = Vec::new();
        let mut soulbound_items = Vec::new();
        for drop in &def.loot {
            if rng.gen::<f32>() >= drop.chance {
                continue;
            }
            let soulbound = data
                .items
                .get(drop.item)
                .map(|i| i.soulbound)
                .unwrap_or(false);
            if soulbound {
                soulbound_items.push(drop.item.to_string());
            } else {
                public_items.push(drop.item.to_string());
            }
        }

        if !public_items.is_empty() {
            let bag = LootBag::public(new_entity_id(), pos, public_items, None, now);
            let view = bag.to_view();
            self.loot.insert(bag.id, bag);
            for viewer in self.players.values() {
                if viewer.pos.distance(pos) <= AOI_RADIUS {
                    router.send(viewer.id, ServerMessage::LootSpawn { bag: view.clone() });
                }
            }
        }
        if !soulbound_items.is_empty() {
            let threshold = (max_hp as f64 * SOULBOUND_THRESHOLD) as i64;
            let qualifying: Vec<EntityId> = attribution
                .iter()
                .filter(|(id, dmg)| **dmg >= threshold && self.players.contains_key(id))
                .map(|(id, _)| *id)
                .collect();
            for player_id in qualifying {
                let bag = LootBag::soulbound(
                    new_entity_id(),
                    pos,
                    soulbound_items.clone(),
                    player_id,
                    now,
                );
                let view = bag.to_view();
                self.loot.insert(bag.id, bag);
                router.send(player_id, ServerMessage::LootSpawn { bag: view });
            }
        }

        if let Some(portal_drop) = &def.dungeon_portal {
            if rng.gen::<f32>() < portal_drop.chance {
                events.push(InstanceEvent::DungeonPortalDrop {
                    dungeon_def: portal_drop.dungeon.to_string(),
                    pos,
                });
            }
        }

        if def.boss && self.kind == InstanceKind::Dungeon {
            if let Some(meta) = &mut self.dungeon {
                if !meta.boss_killed {
                    meta.boss_killed = true;
                    for player in self.players.values_mut() {
                        player.lifetime.dungeons_cleared += 1;
                    }
                    events.push(InstanceEvent::BossKilled { pos });
                }
            }
        }
    }

    /// Region timers accumulate; past `1/rate` with the region under its
    /// population cap, a weighted enemy spawns at a sampled walkable point.
    /// Dungeons go inert after the initial bulk spawn.
    fn run_spawn_scheduler(&mut self, dt: f64, data: &GameData) {
        if let Some(meta) = &self.dungeon {
            if meta.initial_spawn_done {
                return;
            }
        }
        if self.region_timers.len() != self.map.regions.len() {
            self.region_timers = vec![0.0; self.map.regions.len()];
        }
        let mut rng = rand::thread_rng();
        let mut to_spawn = Vec::new();
        for i in 0..self.map.regions.len() {
            self.region_timers[i] += dt;
            let region = &self.map.regions[i];
            if region.rate <= 0.0 || self.region_timers[i] < 1.0 / region.rate as f64 {
                continue;
            }
            self.region_timers[i] = 0.0;
            let alive = self
                .enemies
                .values()
                .filter(|e| !e.removed && region.contains(e.pos))
                .count();
            if alive >= region.max_alive {
                continue;
            }
            if let (Some(id), Some(pos)) = (
                region.pick_enemy(&mut rng).map(str::to_string),
                self.map.random_point_in(region, &mut rng),
            ) {
                to_spawn.push((id, pos));
            }
        }
        for (id, pos) in to_spawn {
            self.spawn_enemy(&id, pos, data);
        }
    }

    /// Drains every remove-flagged entity from every container.
    fn cleanup(&mut self) {
        self.players.retain(|_, p| !p.removed);
        self.enemies.retain(|_, e| !e.removed);
        self.projectiles.retain(|_, p| !p.removed);
        self.loot.retain(|_, l| !l.removed);
        self.portals.retain(|_, p| !p.removed);
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    /// Per-resident AOI-filtered world view; soulbound bags are stripped
    /// for everyone but their owner.
    fn emit_snapshots(&self, tick: u64, now: f64, data: &GameData, router: &Router) {
        for viewer in self.players.values() {
            if viewer.hp <= 0 {
                continue;
            }
            let center = viewer.pos;
            let visible = |pos: Vec2| center.distance(pos) <= AOI_RADIUS;

            let snapshot = Snapshot {
                tick,
                you: SelfView {
                    hp: viewer.hp,
                    max_hp: viewer.effective_max_hp(data, now),
                    mp: viewer.mp,
                    max_mp: viewer.effective_max_mp(data, now),
                    level: viewer.level,
                    exp: viewer.exp,
                    next_level_exp: exp_for_next_level(viewer.level),
                    attack: viewer.effective_attack(data, now),
                    defense: viewer.effective_defense(data, now),
                    speed: viewer.stats.speed,
                    dexterity: viewer.stats.dexterity,
                    vitality: viewer.stats.vitality,
                    wisdom: viewer.stats.wisdom,
                    equipment: viewer.equipment.to_vec(),
                    inventory: viewer.inventory.to_vec(),
                },
                players: self
                    .players
                    .values()
                    .filter(|p| p.hp > 0 && visible(p.pos))
                    .map(|p| PlayerView {
                        id: p.id,
                        name: p.name.clone(),
                        class_id: p.class_id.clone(),
                        x: p.pos.x,
                        y: p.pos.y,
                        hp: p.hp,
                        max_hp: p.effective_max_hp(data, now),
                        level: p.level,
                    })
                    .collect(),
                enemies: self
                    .enemies
                    .values()
                    .filter(|e| !e.removed && visible(e.pos))
                    .map(|e| EnemyView {
                        id: e.id,
                        def_id: e.def_id.clone(),
                        x: e.pos.x,
                        y: e.pos.y,
                        hp: e.hp,
                        max_hp: e.max_hp,
                    })
                    .collect(),
                projectiles: self
                    .projectiles
                    .values()
                    .filter(|p| !p.removed && visible(p.pos))
                    .map(|p| ProjectileView {
                        id: p.id,
                        def_id: p.def_id.clone(),
                        x: p.pos.x,
                        y: p.pos.y,
                        angle: p.angle(),
                        hostile: p.side == Side::Enemy,
                    })
                    .collect(),
                loot: self
                    .loot
                    .values()
                    .filter(|b| !b.removed && visible(b.pos) && b.visible_to(viewer.id))
                    .map(|b| b.to_view())
                    .collect(),
                portals: self
                    .portals
                    .values()
                    .filter(|p| !p.removed && visible(p.pos))
                    .map(|p| p.to_view())
                    .collect(),
                chests: self
                    .chests
                    .values()
                    .filter(|c| visible(c.pos))
                    .map(|c| ChestView {
                        id: c.id,
                        x: c.pos.x,
                        y: c.pos.y,
                    })
                    .collect(),
            };
            router.send(viewer.id, ServerMessage::Snapshot(snapshot));
        }
    }
}
