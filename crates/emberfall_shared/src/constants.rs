// ============================================================================
// NETWORK CONSTANTS
// ============================================================================

pub const DEFAULT_PORT: u16 = 8080;

/// Simulation rate in ticks per second; snapshots go out at half of this.
pub const TICK_RATE: u32 = 20;
pub const SNAPSHOT_EVERY_TICKS: u64 = 2;

// ============================================================================
// GAME CONSTANTS
// ============================================================================

/// Client visibility cutoff (tiles, Euclidean).
pub const AOI_RADIUS: f32 = 15.0;

pub const PICKUP_RANGE: f32 = 1.0;
pub const PORTAL_INTERACT_RANGE: f32 = 1.5;
pub const VAULT_CHEST_INTERACT_RANGE: f32 = 1.5;

pub const PLAYER_RADIUS: f32 = 0.35;

pub const MAX_LEVEL: u32 = 20;

pub const EQUIP_SLOTS: usize = 4;
pub const INVENTORY_SLOTS: usize = 8;
pub const VAULT_SIZE: usize = 8;

/// Alive characters an account may hold per class.
pub const MAX_ALIVE_PER_CLASS: i64 = 2;

// ============================================================================
// COMBAT CONSTANTS
// ============================================================================

/// Range inside which an enemy will acquire the nearest player.
pub const ENEMY_TARGET_RANGE: f32 = 15.0;

/// Fraction of max hp/mp restored per second inside safe zones.
pub const SAFE_ZONE_REGEN_FRAC: f64 = 0.2;

/// Minimum fraction of raw damage that bleeds through player defense.
pub const DEFENSE_BLEED_THROUGH: f64 = 0.15;

/// Attributed-damage fraction of max hp required to qualify for soulbound drops.
pub const SOULBOUND_THRESHOLD: f64 = 0.05;

/// Unique targets a piercing projectile may record before it stops hitting.
pub const PROJECTILE_MAX_HITS: usize = 64;

// ============================================================================
// LIFETIMES & TIMERS
// ============================================================================

pub const LOOT_DESPAWN_SECS: f64 = 60.0;
pub const DUNGEON_PORTAL_EXPIRY_SECS: f64 = 120.0;
pub const AUTOSAVE_INTERVAL_SECS: f64 = 30.0;
pub const SESSION_LIFETIME_DAYS: i64 = 30;

// ============================================================================
// SESSION LIMITS
// ============================================================================

pub const CHAT_MAX_LEN: usize = 200;
pub const AUTH_ATTEMPTS_PER_MINUTE: u32 = 5;
pub const INPUT_BURST_WINDOW_MS: u64 = 10;
pub const INPUT_BURST_LIMIT: u32 = 100;
