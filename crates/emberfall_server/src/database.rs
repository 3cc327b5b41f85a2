use log::info;
use rand::RngCore;
use sqlx::{Row, SqlitePool};

use emberfall_shared::{CharacterSummary, EQUIP_SLOTS, INVENTORY_SLOTS, MAX_ALIVE_PER_CLASS, SESSION_LIFETIME_DAYS, VAULT_SIZE};

use crate::entity::LifetimeStats;
use crate::game_data::{ClassDefinition, StatBlock};

/// A syntactically valid argon2 hash that matches no password; verified
/// against when the username does not exist so login timing is uniform.
const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$MTIzNDU2Nzg5MDEyMzQ1Ng$QWxsIHlvdXIgYmFzZSBhcmUgYmVsb25nIHRvIHVz";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("username already taken")]
    Duplicate,
    #[error("not found")]
    NotFound,
    #[error("character limit for this class reached")]
    ClassLimit,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// The durable character row, as loaded from and saved to the store.
#[derive(Debug, Clone)]
pub struct CharacterRecord {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
    pub class_id: String,
    pub level: u32,
    pub exp: u64,
    pub hp: i32,
    pub max_hp: i32,
    pub mp: i32,
    pub max_mp: i32,
    pub stats: StatBlock,
    /// Twelve slots: 4 equipment then 8 inventory.
    pub items: Vec<Option<String>>,
    pub lifetime: LifetimeStats,
    pub alive: bool,
}

impl CharacterRecord {
    /// A brand-new level-1 character of the given class.
    pub fn fresh(id: i64, account_id: i64, name: &str, class: &ClassDefinition) -> Self {
        let mut items = vec![None; EQUIP_SLOTS + INVENTORY_SLOTS];
        for (slot, item) in class.starting_equipment.iter().enumerate() {
            items[slot] = item.map(str::to_string);
        }
        Self {
            id,
            account_id,
            name: name.to_string(),
            class_id: class.id.to_string(),
            level: 1,
            exp: 0,
            hp: class.base_hp,
            max_hp: class.base_hp,
            mp: class.base_mp,
            max_mp: class.base_mp,
            stats: class.base_stats,
            items,
            lifetime: LifetimeStats::default(),
            alive: true,
        }
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// ============================================================================
// DATABASE
// ============================================================================

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(path: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", path)).await?;
        let db = Self { pool };
        db.migrate().await?;
        info!("Database initialized at {}", path);
        Ok(db)
    }

    /// In-memory database for tests. A single pooled connection keeps every
    /// query on the same in-memory database.
    pub async fn connect_memory() -> Result<Self, sqlx::Error> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                account_id INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                FOREIGN KEY (account_id) REFERENCES accounts(id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS characters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                class_id TEXT NOT NULL,
                level INTEGER NOT NULL DEFAULT 1,
                exp INTEGER NOT NULL DEFAULT 0,
                hp INTEGER NOT NULL,
                max_hp INTEGER NOT NULL,
                mp INTEGER NOT NULL,
                max_mp INTEGER NOT NULL,
                attack INTEGER NOT NULL,
                defense INTEGER NOT NULL,
                speed INTEGER NOT NULL,
                dexterity INTEGER NOT NULL,
                vitality INTEGER NOT NULL,
                wisdom INTEGER NOT NULL,
                alive INTEGER NOT NULL DEFAULT 1,
                damage_dealt INTEGER NOT NULL DEFAULT 0,
                damage_taken INTEGER NOT NULL DEFAULT 0,
                shots_fired INTEGER NOT NULL DEFAULT 0,
                abilities_used INTEGER NOT NULL DEFAULT 0,
                enemies_killed INTEGER NOT NULL DEFAULT 0,
                dungeons_cleared INTEGER NOT NULL DEFAULT 0,
                seconds_played REAL NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (account_id) REFERENCES accounts(id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS character_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                character_id INTEGER NOT NULL,
                slot_index INTEGER NOT NULL,
                item_id TEXT NOT NULL,
                FOREIGN KEY (character_id) REFERENCES characters(id),
                UNIQUE(character_id, slot_index)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vault_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                slot_index INTEGER NOT NULL,
                item_id TEXT NOT NULL,
                FOREIGN KEY (account_id) REFERENCES accounts(id),
                UNIQUE(account_id, slot_index)
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------------

    pub async fn create_account(&self, username: &str, password: &str) -> Result<i64, StoreError> {
        use argon2::{
            password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
            Argon2,
        };

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| StoreError::Hash(e.to_string()))?
            .to_string();

        let result = sqlx::query(
            "INSERT INTO accounts (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(username)
        .bind(&hash)
        .bind(now_secs())
        .execute(&self.pool)
        .await;

        match result {
            Ok(result) => Ok(result.last_insert_rowid()),
            Err(e) => {
                if e.as_database_error()
                    .map(|db| db.is_unique_violation())
                    .unwrap_or(false)
                {
                    Err(StoreError::Duplicate)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    /// Verifies credentials; a missing user still burns one argon2
    /// verification against a dummy hash so the timing does not reveal
    /// whether the account exists.
    pub async fn validate_login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<i64>, StoreError> {
        use argon2::{
            password_hash::{PasswordHash, PasswordVerifier},
            Argon2,
        };

        let row = sqlx::query("SELECT id, password_hash FROM accounts WHERE username = ?1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        let (account_id, stored_hash) = match row {
            Some(row) => (row.get::<i64, _>(0), row.get::<String, _>(1)),
            None => (-1, DUMMY_HASH.to_string()),
        };

        let parsed = PasswordHash::new(&stored_hash)
            .map_err(|e| StoreError::Hash(e.to_string()))?;
        let verified = Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok();

        if verified && account_id >= 0 {
            Ok(Some(account_id))
        } else {
            Ok(None)
        }
    }

    pub async fn get_account_username(&self, account_id: i64) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT username FROM accounts WHERE id = ?1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get(0)))
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    /// Issues a fresh 32-byte hex token valid for 30 days. Expired sessions
    /// are swept on every creation.
    pub async fn create_session(&self, account_id: i64) -> Result<String, StoreError> {
        let now = now_secs();
        sqlx::query("DELETE FROM sessions WHERE expires_at < ?1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let token: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();

        sqlx::query(
            "INSERT INTO sessions (token, account_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&token)
        .bind(account_id)
        .bind(now)
        .bind(now + SESSION_LIFETIME_DAYS * 24 * 60 * 60)
        .execute(&self.pool)
        .await?;

        Ok(token)
    }

    pub async fn validate_session(&self, token: &str) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query(
            "SELECT account_id FROM sessions WHERE token = ?1 AND expires_at >= ?2",
        )
        .bind(token)
        .bind(now_secs())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get(0)))
    }

    pub async fn revoke_session(&self, token: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE token = ?1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Characters
    // ------------------------------------------------------------------------

    /// Creates a character, enforcing the per-class alive cap.
    pub async fn create_character(
        &self,
        account_id: i64,
        name: &str,
        class: &ClassDefinition,
    ) -> Result<CharacterRecord, StoreError> {
        let alive: i64 = sqlx::query(
            "SELECT COUNT(*) FROM characters WHERE account_id = ?1 AND class_id = ?2 AND alive = 1",
        )
        .bind(account_id)
        .bind(class.id)
        .fetch_one(&self.pool)
        .await?
        .get(0);
        if alive >= MAX_ALIVE_PER_CLASS {
            return Err(StoreError::ClassLimit);
        }

        let mut record = CharacterRecord::fresh(0, account_id, name, class);
        let result = sqlx::query(
            "INSERT INTO characters (
                account_id, name, class_id, level, exp, hp, max_hp, mp, max_mp,
                attack, defense, speed, dexterity, vitality, wisdom, alive, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, 1, ?16)",
        )
        .bind(account_id)
        .bind(name)
        .bind(class.id)
        .bind(record.level as i64)
        .bind(record.exp as i64)
        .bind(record.hp)
        .bind(record.max_hp)
        .bind(record.mp)
        .bind(record.max_mp)
        .bind(record.stats.attack)
        .bind(record.stats.defense)
        .bind(record.stats.speed)
        .bind(record.stats.dexterity)
        .bind(record.stats.vitality)
        .bind(record.stats.wisdom)
        .bind(now_secs())
        .execute(&self.pool)
        .await?;

        record.id = result.last_insert_rowid();
        self.save_items(record.id, &record.items).await?;
        Ok(record)
    }

    pub async fn get_character(&self, id: i64) -> Result<Option<CharacterRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT account_id, name, class_id, level, exp, hp, max_hp, mp, max_mp,
                    attack, defense, speed, dexterity, vitality, wisdom, alive,
                    damage_dealt, damage_taken, shots_fired, abilities_used,
                    enemies_killed, dungeons_cleared, seconds_played
             FROM characters WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut items = vec![None; EQUIP_SLOTS + INVENTORY_SLOTS];
        let item_rows = sqlx::query(
            "SELECT slot_index, item_id FROM character_items WHERE character_id = ?1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        for item_row in item_rows {
            let slot: i64 = item_row.get(0);
            if (slot as usize) < items.len() {
                items[slot as usize] = Some(item_row.get::<String, _>(1));
            }
        }

        Ok(Some(CharacterRecord {
            id,
            account_id: row.get(0),
            name: row.get(1),
            class_id: row.get(2),
            level: row.get::<i64, _>(3) as u32,
            exp: row.get::<i64, _>(4) as u64,
            hp: row.get(5),
            max_hp: row.get(6),
            mp: row.get(7),
            max_mp: row.get(8),
            stats: StatBlock::new(
                row.get(9),
                row.get(10),
                row.get(11),
                row.get(12),
                row.get(13),
                row.get(14),
            ),
            alive: row.get::<i64, _>(15) != 0,
            lifetime: LifetimeStats {
                damage_dealt: row.get(16),
                damage_taken: row.get(17),
                shots_fired: row.get(18),
                abilities_used: row.get(19),
                enemies_killed: row.get(20),
                dungeons_cleared: row.get(21),
                seconds_played: row.get(22),
            },
            items,
        }))
    }

    pub async fn get_alive_characters(
        &self,
        account_id: i64,
    ) -> Result<Vec<CharacterSummary>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, class_id, level FROM characters
             WHERE account_id = ?1 AND alive = 1 ORDER BY id",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| CharacterSummary {
                id: row.get(0),
                name: row.get(1),
                class_id: row.get(2),
                level: row.get::<i64, _>(3) as u32,
            })
            .collect())
    }

    pub async fn save_character(&self, record: &CharacterRecord) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE characters SET
                level = ?1, exp = ?2, hp = ?3, max_hp = ?4, mp = ?5, max_mp = ?6,
                attack = ?7, defense = ?8, speed = ?9, dexterity = ?10,
                vitality = ?11, wisdom = ?12, alive = ?13,
                damage_dealt = ?14, damage_taken = ?15, shots_fired = ?16,
                abilities_used = ?17, enemies_killed = ?18, dungeons_cleared = ?19,
                seconds_played = ?20
             WHERE id = ?21",
        )
        .bind(record.level as i64)
        .bind(record.exp as i64)
        .bind(record.hp)
        .bind(record.max_hp)
        .bind(record.mp)
        .bind(record.max_mp)
        .bind(record.stats.attack)
        .bind(record.stats.defense)
        .bind(record.stats.speed)
        .bind(record.stats.dexterity)
        .bind(record.stats.vitality)
        .bind(record.stats.wisdom)
        .bind(record.alive as i64)
        .bind(record.lifetime.damage_dealt)
        .bind(record.lifetime.damage_taken)
        .bind(record.lifetime.shots_fired)
        .bind(record.lifetime.abilities_used)
        .bind(record.lifetime.enemies_killed)
        .bind(record.lifetime.dungeons_cleared)
        .bind(record.lifetime.seconds_played)
        .bind(record.id)
        .execute(&self.pool)
        .await?;

        self.save_items(record.id, &record.items).await
    }

    /// Permadeath: final save with the alive flag cleared.
    pub async fn kill_character(&self, record: &CharacterRecord) -> Result<(), StoreError> {
        let mut dead = record.clone();
        dead.alive = false;
        self.save_character(&dead).await
    }

    async fn save_items(
        &self,
        character_id: i64,
        items: &[Option<String>],
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM character_items WHERE character_id = ?1")
            .bind(character_id)
            .execute(&self.pool)
            .await?;
        for (slot, item) in items.iter().enumerate() {
            if let Some(item_id) = item {
                sqlx::query(
                    "INSERT INTO character_items (character_id, slot_index, item_id)
                     VALUES (?1, ?2, ?3)",
                )
                .bind(character_id)
                .bind(slot as i64)
                .bind(item_id)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Vault
    // ------------------------------------------------------------------------

    pub async fn get_vault_items(&self, account_id: i64) -> Result<Vec<Option<String>>, StoreError> {
        let mut items = vec![None; VAULT_SIZE];
        let rows = sqlx::query("SELECT slot_index, item_id FROM vault_items WHERE account_id = ?1")
            .bind(account_id)
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let slot: i64 = row.get(0);
            if (slot as usize) < items.len() {
                items[slot as usize] = Some(row.get::<String, _>(1));
            }
        }
        Ok(items)
    }

    pub async fn save_vault_items(
        &self,
        account_id: i64,
        items: &[Option<String>],
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM vault_items WHERE account_id = ?1")
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        for (slot, item) in items.iter().enumerate() {
            if let Some(item_id) = item {
                sqlx::query(
                    "INSERT INTO vault_items (account_id, slot_index, item_id)
                     VALUES (?1, ?2, ?3)",
                )
                .bind(account_id)
                .bind(slot as i64)
                .bind(item_id)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }
}
