use std::collections::HashMap;

// ============================================================================
// DUNGEON DEFINITIONS
// ============================================================================

pub struct DungeonDefinition {
    pub id: &'static str,
    pub name: &'static str,
    /// Spawned in ordinary rooms.
    pub minions: Vec<&'static str>,
    /// Spawned alongside minions and beside the boss.
    pub guardians: Vec<&'static str>,
    pub boss: &'static str,
}

pub struct DungeonDatabase {
    pub dungeons: HashMap<String, DungeonDefinition>,
}

impl Default for DungeonDatabase {
    fn default() -> Self {
        let mut dungeons = HashMap::new();
        let mut add = |def: DungeonDefinition| {
            dungeons.insert(def.id.to_string(), def);
        };

        add(DungeonDefinition {
            id: "demon_lair",
            name: "Demon Lair",
            minions: vec!["imp"],
            guardians: vec!["flame_guardian"],
            boss: "cube_overlord",
        });

        Self { dungeons }
    }
}

impl DungeonDatabase {
    pub fn get(&self, id: &str) -> Option<&DungeonDefinition> {
        super::lookup(&self.dungeons, id)
    }
}
