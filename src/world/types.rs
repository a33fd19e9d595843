use serde::{Deserialize, Serialize};

/// Integer block coordinates in world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn distance_sq(&self, other: &Position) -> f64 {
        let dx = self.x as f64 - other.x;
        let dy = self.y as f64 - other.y;
        let dz = self.z as f64 - other.z;
        dx * dx + dy * dy + dz * dz
    }
}

/// Free-floating position, e.g. where a bot stands.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl From<BlockPos> for Position {
    fn from(pos: BlockPos) -> Self {
        Position::new(pos.x as f64, pos.y as f64, pos.z as f64)
    }
}
