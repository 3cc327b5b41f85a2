use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec2;
use log::{debug, info, warn};
use tokio::sync::mpsc;

use emberfall_shared::{
    EntityId, InstanceKind, ServerMessage, AUTOSAVE_INTERVAL_SECS, DUNGEON_PORTAL_EXPIRY_SECS,
    INVENTORY_SLOTS, MAX_LEVEL, VAULT_SIZE,
};

use crate::admin::{self, AdminCommand, AdminList};
use crate::command::{DetachReason, Router, SaveOp, SimCommand};
use crate::entity::{new_entity_id, Player, Portal};
use crate::game_data::{exp_for_next_level, GameData};
use crate::instance::{Instance, InstanceEvent};
use crate::mapgen;
use crate::moderation;

pub const NEXUS_ID: &str = "nexus-main";
pub const REALM_ID: &str = "realm-main";

/// Portal target sentinel resolved to the entering account's own vault.
const VAULT_SENTINEL: &str = "vault";

// ============================================================================
// GAME SERVER
// ============================================================================

/// Owns every instance and the playerId -> session routing table; drains
/// session commands at the head of each tick and routes cross-instance
/// concerns (transfers, vaults, dungeons, deaths, autosave).
pub struct GameServer {
    data: Arc<GameData>,
    admins: Arc<AdminList>,
    instances: HashMap<String, Instance>,
    router: Router,
    /// player id -> residing instance id.
    locations: HashMap<EntityId, String>,
    /// account id -> vault contents, loaded at attach, written through on
    /// every transfer.
    vaults: HashMap<i64, Vec<Option<String>>>,
    cmd_rx: mpsc::UnboundedReceiver<SimCommand>,
    save_tx: mpsc::UnboundedSender<SaveOp>,
    autosave_timer: f64,
    dungeon_serial: u64,
}

impl GameServer {
    pub fn new(
        data: Arc<GameData>,
        admins: Arc<AdminList>,
        cmd_rx: mpsc::UnboundedReceiver<SimCommand>,
        save_tx: mpsc::UnboundedSender<SaveOp>,
    ) -> Self {
        let mut instances = HashMap::new();

        let mut nexus = Instance::nexus(NEXUS_ID);
        let (realm_portal_pos, vault_portal_pos) = mapgen::nexus_portal_positions();
        nexus.add_portal(Portal::permanent(
            new_entity_id(),
            realm_portal_pos,
            REALM_ID,
            InstanceKind::Realm,
            "Realm",
        ));
        nexus.add_portal(Portal::permanent(
            new_entity_id(),
            vault_portal_pos,
            VAULT_SENTINEL,
            InstanceKind::Vault,
            "Vault",
        ));

        let mut realm = Instance::realm(REALM_ID, mapgen::realm_map(&mut rand::thread_rng()));
        let back_pos = realm.map.spawn_point() + Vec2::new(0.0, -4.0);
        realm.add_portal(Portal::permanent(
            new_entity_id(),
            back_pos,
            NEXUS_ID,
            InstanceKind::Nexus,
            "Nexus",
        ));

        instances.insert(nexus.id.clone(), nexus);
        instances.insert(realm.id.clone(), realm);
        info!("standing instances ready: {}, {}", NEXUS_ID, REALM_ID);

        Self {
            data,
            admins,
            instances,
            router: Router::default(),
            locations: HashMap::new(),
            vaults: HashMap::new(),
            cmd_rx,
            save_tx,
            autosave_timer: 0.0,
            dungeon_serial: 0,
        }
    }

    pub fn instance(&self, id: &str) -> Option<&Instance> {
        self.instances.get(id)
    }

    pub fn player_location(&self, player_id: EntityId) -> Option<&str> {
        self.locations.get(&player_id).map(String::as_str)
    }

    // ------------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------------

    /// One simulation step: drain queued commands, update every instance,
    /// act on their events, autosave on the interval.
    pub fn tick(&mut self, dt: f64, now: f64, tick: u64) {
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            self.handle_command(cmd, now);
        }

        let ids: Vec<String> = self.instances.keys().cloned().collect();
        let mut pending = Vec::new();
        for id in ids {
            let data = Arc::clone(&self.data);
            let Some(instance) = self.instances.get_mut(&id) else {
                continue;
            };
            let events = instance.update(dt, now, tick, &data, &self.router);
            if !events.is_empty() {
                pending.push((id, events));
            }
        }
        for (instance_id, events) in pending {
            for event in events {
                self.handle_instance_event(&instance_id, event, now);
            }
        }

        self.autosave_timer += dt;
        if self.autosave_timer >= AUTOSAVE_INTERVAL_SECS {
            self.autosave_timer = 0.0;
            self.save_all();
        }
    }

    /// Persists every resident character. Also used as the final flush on
    /// shutdown, together with the vault caches.
    pub fn save_all(&self) {
        let mut count = 0usize;
        for instance in self.instances.values() {
            for player in instance.players.values() {
                let _ = self.save_tx.send(SaveOp::Character(player.to_record()));
                count += 1;
            }
        }
        debug!("autosave: {} characters queued", count);
    }

    pub fn shutdown(&mut self) {
        self.save_all();
        for (account_id, items) in &self.vaults {
            let _ = self.save_tx.send(SaveOp::Vault {
                account_id: *account_id,
                items: items.clone(),
            });
        }
        info!("simulation stopped; final saves queued");
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    fn handle_command(&mut self, cmd: SimCommand, now: f64) {
        match cmd {
            SimCommand::Attach { session, record, vault_items } => {
                let already_resident = self.instances.values().any(|i| {
                    i.players.values().any(|p| p.character_id == record.id)
                });
                if already_resident {
                    warn!("character {} already in game; rejecting attach", record.id);
                    session.detach(DetachReason::Rejected);
                    return;
                }
                let player_id = session.player_id;
                let account_id = session.account_id;
                self.router.register(session);
                self.vaults.entry(account_id).or_insert(vault_items);
                let player = Player::from_record(player_id, &record);
                info!("{} entered the nexus", player.name);
                self.place_in_instance(player, NEXUS_ID);
            }
            SimCommand::Detach { player_id } => self.detach_player(player_id),
            SimCommand::Input { player_id, mut input } => {
                if let Some(player) = self.resident_mut(player_id) {
                    if input.move_direction.length() > 1.0 {
                        input.move_direction = input.move_direction.normalize();
                    }
                    player.input = input;
                }
            }
            SimCommand::Shoot { player_id, aim_angle } => {
                let data = Arc::clone(&self.data);
                if let Some(instance) = self.instance_of_mut(player_id) {
                    instance.player_shoot(player_id, aim_angle, &data, now);
                }
            }
            SimCommand::UseAbility { player_id } => {
                let data = Arc::clone(&self.data);
                let mut events = Vec::new();
                let instance_id = match self.locations.get(&player_id) {
                    Some(id) => id.clone(),
                    None => return,
                };
                if let Some(instance) = self.instances.get_mut(&instance_id) {
                    instance.execute_ability(player_id, &data, now, &self.router, &mut events);
                }
                for event in events {
                    self.handle_instance_event(&instance_id, event, now);
                }
            }
            SimCommand::PickupLoot { player_id, loot_id } => {
                if let Some(instance) = self.instance_of_mut(player_id) {
                    instance.try_pickup_loot(player_id, loot_id);
                }
            }
            SimCommand::EnterPortal { player_id, portal_id } => {
                self.enter_portal(player_id, portal_id, now)
            }
            SimCommand::ReturnToNexus { player_id } => {
                self.transfer_player(player_id, NEXUS_ID);
            }
            SimCommand::Chat { player_id, message } => self.handle_chat(player_id, message, now),
            SimCommand::SwapItems { player_id, from, to } => {
                let data = Arc::clone(&self.data);
                if let Some(player) = self.resident_mut(player_id) {
                    player.swap_items(from, to, &data, now);
                }
            }
            SimCommand::DropItem { player_id, slot } => {
                let data = Arc::clone(&self.data);
                let Some(instance) = self.instance_of_mut(player_id) else {
                    return;
                };
                if let Some(view) = instance.drop_item(player_id, slot, &data, now) {
                    if view.soulbound {
                        self.router.send(player_id, ServerMessage::LootSpawn { bag: view });
                    } else {
                        let nearby: Vec<EntityId> =
                            instance.players.keys().copied().collect();
                        for id in nearby {
                            self.router
                                .send(id, ServerMessage::LootSpawn { bag: view.clone() });
                        }
                    }
                }
            }
            SimCommand::InteractVaultChest { player_id } => self.open_vault_chest(player_id),
            SimCommand::VaultTransfer { player_id, from_vault, from_slot, to_slot } => {
                self.vault_transfer(player_id, from_vault, from_slot, to_slot)
            }
            SimCommand::CloseVault { player_id } => {
                let account = match self.resident_mut(player_id) {
                    Some(player) => {
                        player.vault_open = false;
                        player.account_id
                    }
                    None => return,
                };
                if let Some(items) = self.vaults.get(&account) {
                    let _ = self.save_tx.send(SaveOp::Vault {
                        account_id: account,
                        items: items.clone(),
                    });
                }
            }
        }
    }

    fn resident_mut(&mut self, player_id: EntityId) -> Option<&mut Player> {
        let instance_id = self.locations.get(&player_id)?;
        self.instances
            .get_mut(instance_id)?
            .players
            .get_mut(&player_id)
    }

    fn instance_of_mut(&mut self, player_id: EntityId) -> Option<&mut Instance> {
        let instance_id = self.locations.get(&player_id)?;
        self.instances.get_mut(instance_id)
    }

    // ------------------------------------------------------------------------
    // Transfers & lifecycles
    // ------------------------------------------------------------------------

    fn enter_portal(&mut self, player_id: EntityId, portal_id: EntityId, _now: f64) {
        let Some(instance_id) = self.locations.get(&player_id).cloned() else {
            return;
        };
        let Some(instance) = self.instances.get(&instance_id) else {
            return;
        };
        let Some((target, account_id)) = instance
            .try_enter_portal(player_id, portal_id)
            .map(|p| p.target_instance.clone())
            .zip(instance.players.get(&player_id).map(|p| p.account_id))
        else {
            return;
        };

        let target_id = if target == VAULT_SENTINEL {
            self.ensure_vault(account_id)
        } else {
            target
        };
        self.transfer_player(player_id, &target_id);
    }

    /// Creates the per-account vault instance on first entry.
    fn ensure_vault(&mut self, account_id: i64) -> String {
        let id = format!("vault-{}", account_id);
        if !self.instances.contains_key(&id) {
            self.instances.insert(id.clone(), Instance::vault(account_id));
            debug!("vault instance created: {}", id);
        }
        id
    }

    /// Atomic from the player's perspective: removal, placement, and the
    /// instance-change message all happen inside one command application.
    fn transfer_player(&mut self, player_id: EntityId, target_id: &str) {
        let Some(source_id) = self.locations.get(&player_id).cloned() else {
            return;
        };
        if source_id == target_id {
            return;
        }
        let Some(account_id) = self
            .instances
            .get(&source_id)
            .and_then(|i| i.players.get(&player_id))
            .map(|p| p.account_id)
        else {
            return;
        };
        // Authorization: only the owning account ever enters a vault.
        let allowed = match self.instances.get(target_id) {
            Some(t) => t.kind != InstanceKind::Vault || t.vault_account == Some(account_id),
            None => false,
        };
        if !allowed {
            debug!("transfer of {} to {} denied", player_id, target_id);
            return;
        }
        let Some(player) = self
            .instances
            .get_mut(&source_id)
            .and_then(|i| i.remove_player(player_id))
        else {
            return;
        };
        self.place_in_instance(player, target_id);
        self.reap_if_empty(&source_id);
    }

    fn place_in_instance(&mut self, player: Player, target_id: &str) {
        let player_id = player.id;
        let target_id = if self.instances.contains_key(target_id) {
            target_id
        } else {
            // Target vanished (reaped dungeon); the nexus always exists.
            NEXUS_ID
        };
        let Some(instance) = self.instances.get_mut(target_id) else {
            return;
        };
        let kind = instance.kind;
        let spawn = instance.add_player(player);
        let map = instance.map.to_payload();
        self.locations.insert(player_id, target_id.to_string());
        self.router.send(
            player_id,
            ServerMessage::InstanceChange {
                instance_id: target_id.to_string(),
                kind,
                map,
                spawn_x: spawn.x,
                spawn_y: spawn.y,
                player_id,
            },
        );
    }

    /// Session closed: persist and drop the resident player.
    fn detach_player(&mut self, player_id: EntityId) {
        let Some(instance_id) = self.locations.remove(&player_id) else {
            self.router.unregister(player_id);
            return;
        };
        let account_id = if let Some(player) = self
            .instances
            .get_mut(&instance_id)
            .and_then(|i| i.remove_player(player_id))
        {
            let _ = self.save_tx.send(SaveOp::Character(player.to_record()));
            info!("{} left the game", player.name);
            Some(player.account_id)
        } else {
            None
        };
        self.router.unregister(player_id);
        self.reap_if_empty(&instance_id);

        // Drop the vault cache once the account has no residents left,
        // persisting it on the way out.
        if let Some(account_id) = account_id {
            let still_online = self.instances.values().any(|i| {
                i.players.values().any(|p| p.account_id == account_id)
            });
            if !still_online {
                if let Some(items) = self.vaults.remove(&account_id) {
                    let _ = self.save_tx.send(SaveOp::Vault { account_id, items });
                }
            }
        }
    }

    /// Dungeons and vaults disappear the moment their last player leaves.
    fn reap_if_empty(&mut self, instance_id: &str) {
        let Some(instance) = self.instances.get(instance_id) else {
            return;
        };
        if !instance.players.is_empty() {
            return;
        }
        match instance.kind {
            InstanceKind::Dungeon => {
                self.instances.remove(instance_id);
                info!("dungeon reaped: {}", instance_id);
            }
            InstanceKind::Vault => {
                if let Some(account_id) = instance.vault_account {
                    if let Some(items) = self.vaults.get(&account_id) {
                        let _ = self.save_tx.send(SaveOp::Vault {
                            account_id,
                            items: items.clone(),
                        });
                    }
                }
                self.instances.remove(instance_id);
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------------
    // Instance events
    // ------------------------------------------------------------------------

    fn handle_instance_event(&mut self, instance_id: &str, event: InstanceEvent, now: f64) {
        match event {
            InstanceEvent::PlayerDied { player_id, killer } => {
                self.locations.remove(&player_id);
                let Some(player) = self
                    .instances
                    .get_mut(instance_id)
                    .and_then(|i| i.remove_player(player_id))
                else {
                    return;
                };
                info!("{} (level {}) was killed by {}", player.name, player.level, killer);
                let _ = self.save_tx.send(SaveOp::Kill(player.to_record()));
                if let Some(handle) = self.router.unregister(player_id) {
                    handle.send(ServerMessage::Death {
                        name: player.name.clone(),
                        level: player.level,
                        killer,
                    });
                    handle.detach(DetachReason::Died);
                }
                self.reap_if_empty(instance_id);
            }
            InstanceEvent::DungeonPortalDrop { dungeon_def, pos } => {
                self.open_dungeon(instance_id, &dungeon_def, pos, now);
            }
            InstanceEvent::BossKilled { pos } => {
                let Some(source) = self
                    .instances
                    .get(instance_id)
                    .and_then(|i| i.dungeon.as_ref())
                    .map(|m| m.source_instance.clone())
                else {
                    return;
                };
                let target = if self.instances.contains_key(&source) {
                    source
                } else {
                    NEXUS_ID.to_string()
                };
                let target_kind = self
                    .instances
                    .get(&target)
                    .map(|i| i.kind)
                    .unwrap_or(InstanceKind::Nexus);
                if let Some(dungeon) = self.instances.get_mut(instance_id) {
                    dungeon.add_portal(Portal::permanent(
                        new_entity_id(),
                        pos,
                        target,
                        target_kind,
                        "Exit",
                    ));
                }
            }
        }
    }

    /// Mints a dungeon instance, bulk-spawns it, and drops its entry portal
    /// at the death point with the standard expiry.
    fn open_dungeon(&mut self, source_id: &str, dungeon_def: &str, pos: Vec2, now: f64) {
        let data = Arc::clone(&self.data);
        let Some(def) = data.dungeons.get(dungeon_def) else {
            warn!("unknown dungeon '{}' requested", dungeon_def);
            return;
        };
        self.dungeon_serial += 1;
        let dungeon_id = format!("dungeon-{}", self.dungeon_serial);
        let layout = mapgen::dungeon_map(def, &mut rand::thread_rng());
        let mut dungeon = Instance::dungeon(dungeon_id.clone(), dungeon_def, layout, source_id);
        dungeon.initial_dungeon_spawn(&data);
        self.instances.insert(dungeon_id.clone(), dungeon);

        if let Some(source) = self.instances.get_mut(source_id) {
            source.add_portal(Portal::expiring(
                new_entity_id(),
                pos,
                dungeon_id.clone(),
                InstanceKind::Dungeon,
                def.name,
                now + DUNGEON_PORTAL_EXPIRY_SECS,
            ));
        }
        info!("dungeon opened: {} ({})", dungeon_id, def.name);
    }

    // ------------------------------------------------------------------------
    // Vault operations
    // ------------------------------------------------------------------------

    fn open_vault_chest(&mut self, player_id: EntityId) {
        let Some(instance) = self.instance_of_mut(player_id) else {
            return;
        };
        if instance.kind != InstanceKind::Vault {
            return;
        }
        let Some(account_id) = instance.players.get(&player_id).map(|p| p.account_id) else {
            return;
        };
        if instance.vault_account != Some(account_id) {
            return;
        }
        if !instance.try_open_vault_chest(player_id) {
            return;
        }
        if let Some(items) = self.vaults.get(&account_id) {
            self.router
                .send(player_id, ServerMessage::VaultOpen { items: items.clone() });
        }
    }

    /// Swap between one vault slot and one inventory slot, accepted only
    /// inside the session's own vault instance and persisted immediately.
    fn vault_transfer(
        &mut self,
        player_id: EntityId,
        from_vault: bool,
        from_slot: usize,
        to_slot: usize,
    ) {
        let Some(instance_id) = self.locations.get(&player_id).cloned() else {
            return;
        };
        let Some(instance) = self.instances.get_mut(&instance_id) else {
            return;
        };
        if instance.kind != InstanceKind::Vault {
            debug!("vaultTransfer outside a vault dropped");
            return;
        }
        let Some(player) = instance.players.get_mut(&player_id) else {
            return;
        };
        let account_id = player.account_id;
        if instance.vault_account != Some(account_id)
            || instance.id != format!("vault-{}", account_id)
        {
            warn!("vaultTransfer into a foreign vault dropped");
            return;
        }
        let (vault_slot, inv_slot) = if from_vault {
            (from_slot, to_slot)
        } else {
            (to_slot, from_slot)
        };
        if vault_slot >= VAULT_SIZE || inv_slot >= INVENTORY_SLOTS {
            return;
        }
        let Some(vault) = self.vaults.get_mut(&account_id) else {
            return;
        };
        std::mem::swap(&mut vault[vault_slot], &mut player.inventory[inv_slot]);

        let _ = self.save_tx.send(SaveOp::Vault {
            account_id,
            items: vault.clone(),
        });
        let msg = ServerMessage::VaultUpdate {
            items: vault.clone(),
            inventory: player.inventory.to_vec(),
        };
        self.router.send(player_id, msg);
    }

    // ------------------------------------------------------------------------
    // Chat & admin
    // ------------------------------------------------------------------------

    fn handle_chat(&mut self, player_id: EntityId, message: String, now: f64) {
        let Some(instance_id) = self.locations.get(&player_id).cloned() else {
            return;
        };
        let Some(username) = self.router.get(player_id).map(|h| h.username.clone()) else {
            return;
        };

        if message.starts_with('/') && self.admins.contains(&username) {
            let cmd = admin::parse_command(&message);
            if cmd != AdminCommand::Unknown {
                info!("admin {}: {}", username, message);
                let reply = self.execute_admin(player_id, &instance_id, cmd, now);
                self.router.send(
                    player_id,
                    ServerMessage::Chat { from: "server".to_string(), message: reply },
                );
                return;
            }
            // Unknown admin command: plain chat after all.
        }

        let Some(instance) = self.instances.get(&instance_id) else {
            return;
        };
        let from = instance
            .players
            .get(&player_id)
            .map(|p| p.name.clone())
            .unwrap_or(username);
        let text = moderation::censor_chat(&message);
        for resident in instance.players.keys() {
            self.router.send(
                *resident,
                ServerMessage::Chat { from: from.clone(), message: text.clone() },
            );
        }
    }

    fn execute_admin(
        &mut self,
        player_id: EntityId,
        instance_id: &str,
        cmd: AdminCommand,
        now: f64,
    ) -> String {
        let data = Arc::clone(&self.data);
        let Some(instance) = self.instances.get_mut(instance_id) else {
            return "no instance".to_string();
        };

        match cmd {
            AdminCommand::Give { item } => {
                if data.items.get(&item).is_none() {
                    return format!("unknown item '{}'", item);
                }
                let Some(player) = instance.players.get_mut(&player_id) else {
                    return "no player".to_string();
                };
                match player.first_empty_inventory_slot() {
                    Some(slot) => {
                        player.inventory[slot] = Some(item.clone());
                        format!("gave {}", item)
                    }
                    None => "inventory full".to_string(),
                }
            }
            AdminCommand::Items { filter } => {
                let ids = data.items.search(&filter);
                if ids.is_empty() {
                    "no matching items".to_string()
                } else {
                    ids.join(", ")
                }
            }
            AdminCommand::Heal => {
                let Some(player) = instance.players.get_mut(&player_id) else {
                    return "no player".to_string();
                };
                player.hp = player.effective_max_hp(&data, now);
                player.mp = player.effective_max_mp(&data, now);
                "healed".to_string()
            }
            AdminCommand::Level { level } => {
                let Some(player) = instance.players.get_mut(&player_id) else {
                    return "no player".to_string();
                };
                let Some(class) = data.classes.get(&player.class_id) else {
                    return "unknown class".to_string();
                };
                let target = level.clamp(1, MAX_LEVEL);
                while player.level < target {
                    let needed = exp_for_next_level(player.level) as u32;
                    if !player.add_exp(needed, class, &data, now) {
                        break;
                    }
                }
                format!("level set to {}", player.level)
            }
            AdminCommand::Spawn { enemy } => {
                if data.enemies.get(&enemy).is_none() {
                    return format!("unknown enemy '{}'", enemy);
                }
                let Some(pos) = instance.players.get(&player_id).map(|p| p.pos) else {
                    return "no player".to_string();
                };
                instance.spawn_enemy(&enemy, pos + Vec2::new(1.5, 0.0), &data);
                format!("spawned {}", enemy)
            }
            AdminCommand::Tp { x, y } => {
                let target = Vec2::new(x, y);
                let Some(player) = instance.players.get_mut(&player_id) else {
                    return "no player".to_string();
                };
                if instance.map.can_stand(target, player.radius) {
                    player.pos = target;
                    format!("teleported to {:.1},{:.1}", x, y)
                } else {
                    "destination blocked".to_string()
                }
            }
            AdminCommand::Help => admin::help_text(),
            AdminCommand::Unknown => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{SessionEvent, SessionHandle};
    use crate::database::CharacterRecord;
    use emberfall_shared::PlayerInput;

    struct Harness {
        server: GameServer,
        cmd_tx: mpsc::UnboundedSender<SimCommand>,
        save_rx: mpsc::UnboundedReceiver<SaveOp>,
        tick: u64,
        now: f64,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_admins(AdminList::load("/nonexistent/admins.txt"))
        }

        fn with_admins(admins: Arc<AdminList>) -> Self {
            let data = Arc::new(GameData::default());
            let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
            let (save_tx, save_rx) = mpsc::unbounded_channel();
            let server = GameServer::new(data, admins, cmd_rx, save_tx);
            Self { server, cmd_tx, save_rx, tick: 0, now: 0.0 }
        }

        fn step(&mut self) {
            self.tick += 1;
            self.now += 0.05;
            self.server.tick(0.05, self.now, self.tick);
        }

        fn join(
            &mut self,
            account_id: i64,
            name: &str,
        ) -> (EntityId, mpsc::UnboundedReceiver<SessionEvent>) {
            let data = Arc::new(GameData::default());
            let class = data.classes.get("wizard").unwrap();
            let record = CharacterRecord::fresh(account_id * 100, account_id, name, class);
            let player_id = new_entity_id();
            let (tx, rx) = mpsc::unbounded_channel();
            self.cmd_tx
                .send(SimCommand::Attach {
                    session: SessionHandle {
                        player_id,
                        account_id,
                        username: name.to_string(),
                        sender: tx,
                    },
                    record,
                    vault_items: vec![None; VAULT_SIZE],
                })
                .unwrap();
            self.step();
            (player_id, rx)
        }

        fn vault_portal(&self) -> (EntityId, Vec2) {
            let nexus = self.server.instance(NEXUS_ID).unwrap();
            nexus
                .portals
                .values()
                .find(|p| p.target_instance == "vault")
                .map(|p| (p.id, p.pos))
                .unwrap()
        }

        fn move_player_to(&mut self, player_id: EntityId, pos: Vec2) {
            let iid = self.server.player_location(player_id).unwrap().to_string();
            let instance = self.server.instances.get_mut(&iid).unwrap();
            instance.players.get_mut(&player_id).unwrap().pos = pos;
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn test_attach_places_player_in_nexus() {
        let mut h = Harness::new();
        let (player, mut rx) = h.join(1, "someone");
        assert_eq!(h.server.player_location(player), Some(NEXUS_ID));
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Message(ServerMessage::InstanceChange { instance_id, .. })
                if instance_id == NEXUS_ID
        )));
    }

    #[test]
    fn test_vault_entry_is_per_account_and_isolated() {
        let mut h = Harness::new();
        let (a, _rx_a) = h.join(1, "alice");
        let (b, _rx_b) = h.join(2, "bob");
        let (portal_id, portal_pos) = h.vault_portal();

        h.move_player_to(a, portal_pos);
        h.move_player_to(b, portal_pos);
        h.cmd_tx
            .send(SimCommand::EnterPortal { player_id: a, portal_id })
            .unwrap();
        h.cmd_tx
            .send(SimCommand::EnterPortal { player_id: b, portal_id })
            .unwrap();
        h.step();

        assert_eq!(h.server.player_location(a), Some("vault-1"));
        assert_eq!(h.server.player_location(b), Some("vault-2"));

        // Forcing B toward A's vault is denied outright.
        h.server.transfer_player(b, "vault-1");
        assert_eq!(h.server.player_location(b), Some("vault-2"));

        // Seed A's vault, then have B hammer transfers: A's vault never moves.
        h.server.vaults.get_mut(&1).unwrap()[0] = Some("crown_of_the_overlord".into());
        let before = h.server.vaults.get(&1).unwrap().clone();
        h.cmd_tx
            .send(SimCommand::VaultTransfer {
                player_id: b,
                from_vault: true,
                from_slot: 0,
                to_slot: 0,
            })
            .unwrap();
        h.step();
        assert_eq!(h.server.vaults.get(&1).unwrap(), &before);
    }

    #[test]
    fn test_vault_transfer_swaps_and_persists() {
        let mut h = Harness::new();
        let (a, _rx) = h.join(1, "alice");
        let (portal_id, portal_pos) = h.vault_portal();
        h.move_player_to(a, portal_pos);
        h.cmd_tx
            .send(SimCommand::EnterPortal { player_id: a, portal_id })
            .unwrap();
        h.step();
        assert_eq!(h.server.player_location(a), Some("vault-1"));

        // Put a ring in inventory slot 2, stash it into vault slot 5.
        {
            let instance = h.server.instances.get_mut("vault-1").unwrap();
            instance.players.get_mut(&a).unwrap().inventory[2] = Some("ring_of_speed".into());
        }
        h.cmd_tx
            .send(SimCommand::VaultTransfer {
                player_id: a,
                from_vault: false,
                from_slot: 2,
                to_slot: 5,
            })
            .unwrap();
        h.step();

        assert_eq!(
            h.server.vaults.get(&1).unwrap()[5].as_deref(),
            Some("ring_of_speed")
        );
        let saved_vault = {
            let mut found = false;
            while let Ok(op) = h.save_rx.try_recv() {
                if let SaveOp::Vault { account_id: 1, items } = op {
                    found = items[5].as_deref() == Some("ring_of_speed");
                }
            }
            found
        };
        assert!(saved_vault, "vault transfer must persist immediately");

        // Leaving the vault reaps the instance.
        h.cmd_tx.send(SimCommand::ReturnToNexus { player_id: a }).unwrap();
        h.step();
        assert!(h.server.instance("vault-1").is_none());
        assert_eq!(h.server.player_location(a), Some(NEXUS_ID));
    }

    #[test]
    fn test_death_is_permadeath_and_detaches() {
        let mut h = Harness::new();
        let (a, mut rx) = h.join(1, "alice");

        // Move to the realm and take a lethal hit.
        h.server.transfer_player(a, REALM_ID);
        {
            let realm = h.server.instances.get_mut(REALM_ID).unwrap();
            let pos = realm.players.get(&a).unwrap().pos;
            realm.spawn_projectiles(
                vec![crate::entity::ProjectileSpawn {
                    owner: new_entity_id(),
                    side: crate::entity::Side::Enemy,
                    def_id: "demon_fireball".into(),
                    pos,
                    angle: 0.0,
                    speed: 0.0,
                    radius: 0.5,
                    damage: 100_000,
                    pierce: false,
                    lifetime: 1.0,
                }],
                h.now,
            );
        }
        h.step();

        assert_eq!(h.server.player_location(a), None);
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Message(ServerMessage::Death { .. })
        )));
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Detached(DetachReason::Died))));

        let mut killed = false;
        while let Ok(op) = h.save_rx.try_recv() {
            if matches!(op, SaveOp::Kill(_)) {
                killed = true;
            }
        }
        assert!(killed, "death must queue a kill save");
    }

    #[test]
    fn test_non_admin_slash_is_plain_chat() {
        let mut h = Harness::new();
        let (a, mut rx_a) = h.join(1, "alice");
        let (_b, mut rx_b) = h.join(2, "bob");

        h.cmd_tx
            .send(SimCommand::Chat { player_id: a, message: "/heal".into() })
            .unwrap();
        h.step();

        // Both co-instance sessions get the line verbatim; nobody healed.
        for rx in [&mut rx_a, &mut rx_b] {
            let events = drain(rx);
            assert!(events.iter().any(|e| matches!(
                e,
                SessionEvent::Message(ServerMessage::Chat { from, message })
                    if from == "alice" && message == "/heal"
            )));
        }
    }

    #[test]
    fn test_admin_commands_apply() {
        let dir = std::env::temp_dir().join(format!("emberfall-srv-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("admins.txt");
        std::fs::write(&path, "alice\n").unwrap();

        let mut h = Harness::with_admins(AdminList::load(&path));
        let (a, mut rx) = h.join(1, "alice");

        h.cmd_tx
            .send(SimCommand::Chat { player_id: a, message: "/give dragonfang".into() })
            .unwrap();
        h.cmd_tx
            .send(SimCommand::Chat { player_id: a, message: "/level 5".into() })
            .unwrap();
        h.step();

        let nexus = h.server.instance(NEXUS_ID).unwrap();
        let player = nexus.players.get(&a).unwrap();
        assert!(player
            .inventory
            .iter()
            .any(|i| i.as_deref() == Some("dragonfang")));
        assert_eq!(player.level, 5);

        // Replies came from "server", not as public chat.
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Message(ServerMessage::Chat { from, .. }) if from == "server"
        )));
    }

    #[test]
    fn test_dungeon_lifecycle_via_events() {
        let mut h = Harness::new();
        let (a, _rx) = h.join(1, "alice");
        h.server.transfer_player(a, REALM_ID);

        // Demon death rolled a portal.
        h.server.handle_instance_event(
            REALM_ID,
            InstanceEvent::DungeonPortalDrop {
                dungeon_def: "demon_lair".into(),
                pos: Vec2::new(20.0, 20.0),
            },
            h.now,
        );
        let dungeon_id = h
            .server
            .instances
            .keys()
            .find(|k| k.starts_with("dungeon-"))
            .cloned()
            .expect("dungeon created");
        {
            let realm = h.server.instance(REALM_ID).unwrap();
            let portal = realm
                .portals
                .values()
                .find(|p| p.target_instance == dungeon_id)
                .expect("entry portal placed");
            assert!(portal.expires_at.is_some());
        }
        assert!(!h.server.instance(&dungeon_id).unwrap().enemies.is_empty());

        // Boss kill drops the return portal inside the dungeon.
        h.server.transfer_player(a, &dungeon_id);
        h.server.handle_instance_event(
            &dungeon_id,
            InstanceEvent::BossKilled { pos: Vec2::new(5.0, 5.0) },
            h.now,
        );
        {
            let dungeon = h.server.instance(&dungeon_id).unwrap();
            assert!(dungeon
                .portals
                .values()
                .any(|p| p.target_instance == REALM_ID && p.expires_at.is_none()));
        }

        // Last player leaving reaps the dungeon.
        h.cmd_tx.send(SimCommand::ReturnToNexus { player_id: a }).unwrap();
        h.step();
        assert!(h.server.instance(&dungeon_id).is_none());
    }

    #[test]
    fn test_input_clamps_direction() {
        let mut h = Harness::new();
        let (a, _rx) = h.join(1, "alice");
        h.cmd_tx
            .send(SimCommand::Input {
                player_id: a,
                input: PlayerInput {
                    move_direction: Vec2::new(30.0, 40.0),
                    aim_angle: 0.0,
                    shooting: false,
                },
            })
            .unwrap();
        h.step();
        let nexus = h.server.instance(NEXUS_ID).unwrap();
        let dir = nexus.players.get(&a).unwrap().input.move_direction;
        assert!((dir.length() - 1.0).abs() < 1e-4);
    }
}
