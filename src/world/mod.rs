pub mod cache;
pub mod chunk;
pub mod types;

pub use cache::{block_matches, BotWorldData};
pub use chunk::{ChunkData, ChunkPos, ChunkSection, Dimension, AIR, SECTION_VOLUME};
pub use types::{BlockPos, Position};
