pub mod config;
pub mod error;
pub mod exporter;
pub mod logger;
pub mod nbt;
pub mod region;
pub mod registry;
pub mod saver;
pub mod serializer;
pub mod world;

// Re-export commonly used items
pub use config::SaverConfig;
pub use error::{Result, WorldError};
pub use exporter::{ExportOptions, ExportSummary, MinecraftVersion, WorldExporter};
pub use logger::{log, LogSeverity};
pub use region::{RegionFile, SectorAllocation};
pub use registry::{BlockRegistry, ItemRegistry};
pub use saver::WorldAutoSaver;
pub use serializer::{NbtSerializer, PackingMode};
pub use world::{BotWorldData, ChunkData, ChunkSection};
