use glam::Vec2;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque 128-bit runtime entity identity.
pub type EntityId = Uuid;

/// Which world a player currently resides in.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum InstanceKind {
    Nexus,
    Realm,
    Dungeon,
    Vault,
}

/// The most recent movement/aim state a client reported.
#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInput {
    pub move_direction: Vec2,
    pub aim_angle: f32,
    pub shooting: bool,
}

impl Default for PlayerInput {
    fn default() -> Self {
        Self {
            move_direction: Vec2::ZERO,
            aim_angle: 0.0,
            shooting: false,
        }
    }
}

// ============================================================================
// CLIENT -> SERVER MESSAGES
// ============================================================================

/// Every inbound payload is a self-describing `{type, data}` object.
/// Unknown tags fail to decode and are dropped at the session boundary.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Auth { user: String, pass: String },
    #[serde(rename_all = "camelCase")]
    AuthToken { token: String },
    #[serde(rename_all = "camelCase")]
    Logout { token: String },
    #[serde(rename_all = "camelCase")]
    Register { user: String, pass: String },
    #[serde(rename_all = "camelCase")]
    CreateCharacter { class_id: String },
    #[serde(rename_all = "camelCase")]
    SelectCharacter { character_id: i64 },
    Input(PlayerInput),
    #[serde(rename_all = "camelCase")]
    Shoot { aim_angle: f32 },
    UseAbility {},
    #[serde(rename_all = "camelCase")]
    PickupLoot { loot_id: EntityId },
    #[serde(rename_all = "camelCase")]
    EnterPortal { portal_id: EntityId },
    ReturnToNexus {},
    #[serde(rename_all = "camelCase")]
    Chat { message: String },
    #[serde(rename_all = "camelCase")]
    SwapItems { from: usize, to: usize },
    #[serde(rename_all = "camelCase")]
    DropItem { slot: usize },
    InteractVaultChest {},
    #[serde(rename_all = "camelCase")]
    VaultTransfer {
        from_vault: bool,
        from_slot: usize,
        to_slot: usize,
    },
    CloseVault {},
}

// ============================================================================
// SERVER -> CLIENT MESSAGES
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    Snapshot(Snapshot),
    #[serde(rename_all = "camelCase")]
    Damage { target: EntityId, amount: i32 },
    #[serde(rename_all = "camelCase")]
    Death { name: String, level: u32, killer: String },
    #[serde(rename_all = "camelCase")]
    LootSpawn { bag: LootView },
    #[serde(rename_all = "camelCase")]
    LevelUp { level: u32 },
    #[serde(rename_all = "camelCase")]
    AbilityEffect {
        player_id: EntityId,
        ability_id: String,
        x: f32,
        y: f32,
    },
    #[serde(rename_all = "camelCase")]
    AuthResult {
        success: bool,
        message: String,
        token: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    RegisterResult { success: bool, message: String },
    #[serde(rename_all = "camelCase")]
    CharacterList { characters: Vec<CharacterSummary> },
    #[serde(rename_all = "camelCase")]
    InstanceChange {
        instance_id: String,
        kind: InstanceKind,
        map: crate::tilemap::MapPayload,
        spawn_x: f32,
        spawn_y: f32,
        player_id: EntityId,
    },
    #[serde(rename_all = "camelCase")]
    Chat { from: String, message: String },
    #[serde(rename_all = "camelCase")]
    Error { message: String },
    #[serde(rename_all = "camelCase")]
    VaultOpen { items: Vec<Option<String>> },
    #[serde(rename_all = "camelCase")]
    VaultUpdate {
        items: Vec<Option<String>>,
        inventory: Vec<Option<String>>,
    },
}

/// A character row shown on the character-select screen.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSummary {
    pub id: i64,
    pub name: String,
    pub class_id: String,
    pub level: u32,
}

// ============================================================================
// SNAPSHOT VIEWS
// ============================================================================
// Projections of live entities carrying only what the client renders.

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub tick: u64,
    pub you: SelfView,
    pub players: Vec<PlayerView>,
    pub enemies: Vec<EnemyView>,
    pub projectiles: Vec<ProjectileView>,
    pub loot: Vec<LootView>,
    pub portals: Vec<PortalView>,
    pub chests: Vec<ChestView>,
}

/// The viewer's own full state; other players get the slimmer [`PlayerView`].
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SelfView {
    pub hp: i32,
    pub max_hp: i32,
    pub mp: i32,
    pub max_mp: i32,
    pub level: u32,
    pub exp: u64,
    pub next_level_exp: u64,
    pub attack: i32,
    pub defense: i32,
    pub speed: i32,
    pub dexterity: i32,
    pub vitality: i32,
    pub wisdom: i32,
    pub equipment: Vec<Option<String>>,
    pub inventory: Vec<Option<String>>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: EntityId,
    pub name: String,
    pub class_id: String,
    pub x: f32,
    pub y: f32,
    pub hp: i32,
    pub max_hp: i32,
    pub level: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EnemyView {
    pub id: EntityId,
    pub def_id: String,
    pub x: f32,
    pub y: f32,
    pub hp: i32,
    pub max_hp: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProjectileView {
    pub id: EntityId,
    pub def_id: String,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub hostile: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LootView {
    pub id: EntityId,
    pub x: f32,
    pub y: f32,
    pub items: Vec<String>,
    pub soulbound: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PortalView {
    pub id: EntityId,
    pub x: f32,
    pub y: f32,
    pub name: String,
    pub kind: InstanceKind,
    pub visible: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChestView {
    pub id: EntityId,
    pub x: f32,
    pub y: f32,
}
