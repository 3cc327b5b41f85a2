use serde::{Deserialize, Serialize};

// ============================================================================
// TILE CODES
// ============================================================================

/// Tile codes shared between the server simulation and the wire payload.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Tile {
    #[default]
    Void,
    Floor,
    Wall,
    Water,
    Lava,
    Spawn,
    BossFloor,
}

impl Tile {
    pub fn code(self) -> u8 {
        match self {
            Tile::Void => 0,
            Tile::Floor => 1,
            Tile::Wall => 2,
            Tile::Water => 3,
            Tile::Lava => 4,
            Tile::Spawn => 5,
            Tile::BossFloor => 6,
        }
    }

    pub fn from_code(code: u8) -> Tile {
        match code {
            1 => Tile::Floor,
            2 => Tile::Wall,
            3 => Tile::Water,
            4 => Tile::Lava,
            5 => Tile::Spawn,
            6 => Tile::BossFloor,
            _ => Tile::Void,
        }
    }

    /// Entities can stand on anything that is not void or a wall.
    pub fn is_walkable(self) -> bool {
        !matches!(self, Tile::Void | Tile::Wall)
    }

    /// Projectiles die on walls only; they fly over water and lava.
    pub fn blocks_projectiles(self) -> bool {
        matches!(self, Tile::Wall)
    }
}

// ============================================================================
// MAP WIRE PAYLOAD
// ============================================================================

/// The complete tile grid as sent to a client on instance change.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MapPayload {
    pub width: u32,
    pub height: u32,
    /// Flat row-major tile codes, `height * width` entries.
    pub tiles: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_codes_round_trip() {
        for code in 0..=6u8 {
            assert_eq!(Tile::from_code(code).code(), code);
        }
        // Unknown codes collapse to void.
        assert_eq!(Tile::from_code(200), Tile::Void);
    }

    #[test]
    fn test_walkability() {
        assert!(Tile::Floor.is_walkable());
        assert!(Tile::Spawn.is_walkable());
        assert!(Tile::BossFloor.is_walkable());
        assert!(Tile::Water.is_walkable());
        assert!(Tile::Lava.is_walkable());
        assert!(!Tile::Wall.is_walkable());
        assert!(!Tile::Void.is_walkable());
    }
}
