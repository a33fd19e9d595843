use crate::error::Result;
use crate::logger::{log, time::unix_millis, LogSeverity::*};
use crate::nbt::{Compound, NbtFile, Tag};
use crate::region::{RegionFile, RegionPos, SectorAllocation};
use crate::serializer::{NbtSerializer, PackingMode};
use crate::world::{BlockPos, BotWorldData, ChunkData, Dimension};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Anvil storage version written to `level.dat`.
pub const ANVIL_VERSION: i32 = 19133;

const CLEAR_WEATHER: i32 = i32::MAX;
const WORLD_BORDER: f64 = 60_000_000.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinecraftVersion {
    pub data_version: i32,
    pub name: String,
    pub series: String,
    pub snapshot: bool,
}

impl MinecraftVersion {
    pub fn new(data_version: i32, name: &str) -> Self {
        Self {
            data_version,
            name: name.to_owned(),
            series: "main".to_owned(),
            snapshot: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub packing: PackingMode,
    pub sector_allocation: SectorAllocation,
    /// Also create the empty `playerdata/` and `data/` folders.
    pub create_player_data: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            packing: PackingMode::Padded,
            sector_allocation: SectorAllocation::AppendOnly,
            create_player_data: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub chunks_exported: usize,
    pub chunks_failed: usize,
    pub region_files: usize,
}

/// Writes cached chunks out as a world the game can open.
#[derive(Debug, Clone, Default)]
pub struct WorldExporter {
    options: ExportOptions,
    serializer: NbtSerializer,
}

/// Folder holding `region/` for `dimension` inside the world at `output`,
/// `None` for dimensions a vanilla world has no folder for.
pub fn dimension_dir(output: &Path, dimension: &str) -> Option<PathBuf> {
    match Dimension::from_id(dimension).folder()? {
        "" => Some(output.to_path_buf()),
        folder => Some(output.join(folder)),
    }
}

pub fn region_file_path(output: &Path, region_x: i32, region_z: i32) -> PathBuf {
    output
        .join("region")
        .join(RegionPos::new(region_x, region_z).file_name())
}

/// `(min_x, max_x, min_z, max_z)` over the loaded chunks, `None` when empty.
pub fn chunk_bounds(world: &BotWorldData) -> Option<(i32, i32, i32, i32)> {
    world.loaded_chunks().into_iter().fold(None, |bounds, pos| {
        Some(match bounds {
            None => (pos.x, pos.x, pos.z, pos.z),
            Some((min_x, max_x, min_z, max_z)) => (
                min_x.min(pos.x),
                max_x.max(pos.x),
                min_z.min(pos.z),
                max_z.max(pos.z),
            ),
        })
    })
}

impl WorldExporter {
    pub fn new(options: ExportOptions) -> Self {
        Self {
            options,
            serializer: NbtSerializer::new(options.packing),
        }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Writes one chunk into `<output>/region`, opening and closing its region
    /// file around the write. `output` is the dimension folder.
    pub fn export_chunk(&self, chunk: &ChunkData, output: &Path, data_version: i32) -> Result<()> {
        let region = RegionPos::from_chunk(chunk.chunk_x, chunk.chunk_z);
        let path = region_file_path(output, region.x, region.z);
        let mut file = RegionFile::open(&path, self.options.sector_allocation)?;

        let tag = self.serializer.chunk_to_nbt(chunk, data_version);
        file.write_chunk(chunk.chunk_x & 31, chunk.chunk_z & 31, &tag)?;
        file.flush()
    }

    /// Exports every loaded chunk plus `level.dat` and `session.lock`.
    ///
    /// A chunk that fails to write is logged and counted in the summary; the
    /// rest of the export carries on. Region files already written stay on
    /// disk if a later step fails.
    pub fn export_world(
        &self,
        world: &BotWorldData,
        output: &Path,
        spawn: BlockPos,
        world_name: &str,
        version: &MinecraftVersion,
    ) -> Result<ExportSummary> {
        self.create_world_directories(output)?;

        let mut regions: HashMap<(PathBuf, RegionPos), RegionFile> = HashMap::new();
        let mut summary = ExportSummary::default();

        for pos in world.loaded_chunks() {
            let Some(chunk) = world.get_chunk(pos.x, pos.z) else {
                continue;
            };
            let Some(dim_dir) = dimension_dir(output, &chunk.dimension) else {
                log(
                    format!(
                        "Cannot save chunk ({}, {}) with unknown dimension {}",
                        chunk.chunk_x, chunk.chunk_z, chunk.dimension
                    ),
                    Warning,
                );
                summary.chunks_failed += 1;
                continue;
            };
            let region_pos = RegionPos::from_chunk(chunk.chunk_x, chunk.chunk_z);

            let region = match regions.entry((dim_dir, region_pos)) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let path = region_file_path(&entry.key().0, region_pos.x, region_pos.z);
                    match RegionFile::open(&path, self.options.sector_allocation) {
                        Ok(file) => entry.insert(file),
                        Err(e) => {
                            log(format!("Failed to open region {}: {}", path.display(), e), Warning);
                            summary.chunks_failed += 1;
                            continue;
                        }
                    }
                }
            };

            let tag = self.serializer.chunk_to_nbt(chunk, version.data_version);
            match region.write_chunk(chunk.chunk_x & 31, chunk.chunk_z & 31, &tag) {
                Ok(()) => summary.chunks_exported += 1,
                Err(e) => {
                    log(
                        format!("Failed to write chunk ({}, {}): {}", chunk.chunk_x, chunk.chunk_z, e),
                        Warning,
                    );
                    summary.chunks_failed += 1;
                }
            }
        }

        summary.region_files = regions.len();
        for region in regions.values_mut() {
            region.flush()?;
        }
        drop(regions);
        log(
            format!(
                "Exported {} chunks to {} region files",
                summary.chunks_exported, summary.region_files
            ),
            Success,
        );

        self.create_level_dat(output, spawn, world_name, version)?;
        self.create_session_lock(output)?;

        log(format!("World export completed to {}", output.display()), Success);
        Ok(summary)
    }

    /// `region/` for each dimension, plus `playerdata/` and `data/` when enabled.
    pub fn create_world_directories(&self, output: &Path) -> Result<()> {
        for folder in ["", "DIM-1", "DIM1"] {
            fs::create_dir_all(output.join(folder).join("region"))?;
        }
        if self.options.create_player_data {
            fs::create_dir_all(output.join("playerdata"))?;
            fs::create_dir_all(output.join("data"))?;
        }
        Ok(())
    }

    /// Writes a gzip `level.dat` for a creative void world. The file is staged
    /// next to its destination and renamed over it.
    pub fn create_level_dat(
        &self,
        output: &Path,
        spawn: BlockPos,
        world_name: &str,
        version: &MinecraftVersion,
    ) -> Result<()> {
        fs::create_dir_all(output)?;
        let level = NbtFile::new(
            String::new(),
            Tag::compound([("Data", level_data(spawn, world_name, version))]),
        );

        let staged = output.join("level.dat_new");
        let writer = level.write_gzip(BufWriter::new(File::create(&staged)?))?;
        writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        fs::rename(&staged, output.join("level.dat"))?;

        log(format!("Created level.dat for {}", world_name), Info);
        Ok(())
    }

    pub fn create_session_lock(&self, output: &Path) -> Result<()> {
        File::create(output.join("session.lock"))?;
        Ok(())
    }
}

fn level_data(spawn: BlockPos, world_name: &str, version: &MinecraftVersion) -> Tag {
    let version_info = Tag::compound([
        ("Id", Tag::Int(version.data_version)),
        ("Name", Tag::String(version.name.clone())),
        ("Series", Tag::String(version.series.clone())),
        ("Snapshot", Tag::Byte(version.snapshot as i8)),
    ]);

    let dimensions = Tag::compound([
        ("minecraft:overworld", void_dimension("minecraft:overworld")),
        ("minecraft:the_nether", void_dimension("minecraft:the_nether")),
        ("minecraft:the_end", void_dimension("minecraft:the_end")),
    ]);
    let world_gen = Tag::compound([
        ("bonus_chest", Tag::Byte(0)),
        ("generate_features", Tag::Byte(0)),
        ("seed", Tag::Long(0)),
        ("dimensions", dimensions),
    ]);

    Tag::compound([
        ("version", Tag::Int(ANVIL_VERSION)),
        ("DataVersion", Tag::Int(version.data_version)),
        ("Version", version_info),
        ("LevelName", Tag::String(world_name.to_owned())),
        ("SpawnX", Tag::Int(spawn.x)),
        ("SpawnY", Tag::Int(spawn.y)),
        ("SpawnZ", Tag::Int(spawn.z)),
        ("SpawnAngle", Tag::Float(0.0)),
        ("MapFeatures", Tag::Byte(0)),
        ("Difficulty", Tag::Byte(2)),
        ("DifficultyLocked", Tag::Byte(0)),
        ("GameType", Tag::Int(1)),
        ("hardcore", Tag::Byte(0)),
        ("allowCommands", Tag::Byte(1)),
        ("WorldGenSettings", world_gen),
        ("Time", Tag::Long(6000)),
        ("DayTime", Tag::Long(6000)),
        ("raining", Tag::Byte(0)),
        ("rainTime", Tag::Int(CLEAR_WEATHER)),
        ("thundering", Tag::Byte(0)),
        ("thunderTime", Tag::Int(CLEAR_WEATHER)),
        ("clearWeatherTime", Tag::Int(CLEAR_WEATHER)),
        ("BorderCenterX", Tag::Double(0.0)),
        ("BorderCenterZ", Tag::Double(0.0)),
        ("BorderSize", Tag::Double(WORLD_BORDER)),
        ("BorderSizeLerpTarget", Tag::Double(WORLD_BORDER)),
        ("BorderSizeLerpTime", Tag::Long(0)),
        ("BorderWarningBlocks", Tag::Double(5.0)),
        ("BorderWarningTime", Tag::Double(15.0)),
        ("BorderDamagePerBlock", Tag::Double(0.2)),
        ("BorderSafeZone", Tag::Double(5.0)),
        ("initialized", Tag::Byte(1)),
        ("WasModded", Tag::Byte(0)),
        ("LastPlayed", Tag::Long(unix_millis())),
    ])
}

/// Flat generator without layers: nothing generates past the saved chunks.
fn void_dimension(dimension_type: &str) -> Tag {
    let settings = Tag::compound([
        ("layers", Tag::List(Vec::new())),
        ("biome", Tag::String("minecraft:plains".to_owned())),
        (
            "structures",
            Tag::compound([("structures", Tag::Compound(Compound::new()))]),
        ),
    ]);

    Tag::compound([
        ("type", Tag::String(dimension_type.to_owned())),
        (
            "generator",
            Tag::compound([
                ("type", Tag::String("minecraft:flat".to_owned())),
                ("settings", settings),
            ]),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths() {
        let root = Path::new("worlds/test");
        assert_eq!(dimension_dir(root, "minecraft:overworld"), Some(root.to_path_buf()));
        assert_eq!(dimension_dir(root, "minecraft:the_nether"), Some(root.join("DIM-1")));
        assert_eq!(dimension_dir(root, "minecraft:the_end"), Some(root.join("DIM1")));
        assert_eq!(dimension_dir(root, "mod:mining"), None);
        assert_eq!(
            region_file_path(root, -1, 3),
            root.join("region").join("r.-1.3.mca")
        );
    }

    #[test]
    fn test_chunk_bounds() {
        let mut world = BotWorldData::new();
        assert_eq!(chunk_bounds(&world), None);

        world.set_block(0, 0, 0, "minecraft:stone");
        world.set_block(-40, 0, 100, "minecraft:stone");
        world.set_block(70, 0, -5, "minecraft:stone");
        assert_eq!(chunk_bounds(&world), Some((-3, 4, -1, 6)));
    }

    #[test]
    fn test_level_dat_contents() {
        let dir = tempdir().unwrap();
        let exporter = WorldExporter::default();
        let version = MinecraftVersion::new(3465, "1.20.1");
        exporter
            .create_level_dat(dir.path(), BlockPos::new(10, 80, -10), "play.example.net", &version)
            .unwrap();
        assert!(!dir.path().join("level.dat_new").exists());

        let level = NbtFile::read_gzip(File::open(dir.path().join("level.dat")).unwrap()).unwrap();
        let data = level.root.get("Data").unwrap();
        assert_eq!(data.get("version"), Some(&Tag::Int(19133)));
        assert_eq!(data.get("DataVersion"), Some(&Tag::Int(3465)));
        assert_eq!(data.get("GameType"), Some(&Tag::Int(1)));
        assert_eq!(data.get("SpawnZ"), Some(&Tag::Int(-10)));
        assert_eq!(data.get("rainTime"), Some(&Tag::Int(i32::MAX)));
        assert_eq!(
            data.get("Version").and_then(|v| v.get("Series")),
            Some(&Tag::String("main".to_owned()))
        );
        assert!(data.get("LastPlayed").and_then(Tag::as_i64).unwrap() > 1_600_000_000_000);

        let nether_layers = data
            .get("WorldGenSettings")
            .and_then(|w| w.get("dimensions"))
            .and_then(|d| d.get("minecraft:the_nether"))
            .and_then(|n| n.get("generator"))
            .and_then(|g| g.get("settings"))
            .and_then(|s| s.get("layers"));
        assert_eq!(nether_layers, Some(&Tag::List(Vec::new())));
    }

    #[test]
    fn test_world_directories() {
        let dir = tempdir().unwrap();
        let exporter = WorldExporter::new(ExportOptions {
            create_player_data: false,
            ..ExportOptions::default()
        });
        exporter.create_world_directories(dir.path()).unwrap();

        assert!(dir.path().join("region").is_dir());
        assert!(dir.path().join("DIM-1").join("region").is_dir());
        assert!(dir.path().join("DIM1").join("region").is_dir());
        assert!(!dir.path().join("playerdata").exists());
    }

    #[test]
    fn test_export_chunk_into_dimension_folder() {
        let dir = tempdir().unwrap();
        let mut chunk = ChunkData::new(-1, 33, "minecraft:the_nether");
        chunk.set_block(0, 40, 0, "minecraft:netherrack");

        let exporter = WorldExporter::default();
        let nether = dimension_dir(dir.path(), &chunk.dimension).unwrap();
        exporter.export_chunk(&chunk, &nether, 3465).unwrap();

        let path = nether.join("region").join("r.-1.1.mca");
        let mut region = RegionFile::open(&path, SectorAllocation::AppendOnly).unwrap();
        let tag = region.read_chunk(31, 1).unwrap().unwrap();
        assert_eq!(tag.get("zPos"), Some(&Tag::Int(33)));
    }

    #[test]
    fn test_unknown_dimension_leaves_overworld_alone() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("world");

        let mut world = BotWorldData::new();
        world.set_block(0, 64, 0, "minecraft:stone");
        let mut modded = ChunkData::new(0, 0, "mod:mining");
        modded.set_block(0, 64, 0, "mod:ore");
        let mut other = BotWorldData::new();
        other.set_current_dimension("mod:mining");
        other.load_chunk(modded);

        let version = MinecraftVersion::new(3465, "1.20.1");
        let exporter = WorldExporter::default();
        exporter
            .export_world(&world, &output, BlockPos::default(), "mixed", &version)
            .unwrap();
        let summary = exporter
            .export_world(&other, &output, BlockPos::default(), "mixed", &version)
            .unwrap();
        assert_eq!(summary.chunks_exported, 0);
        assert_eq!(summary.chunks_failed, 1);
        assert_eq!(summary.region_files, 0);

        let mut region = RegionFile::open(region_file_path(&output, 0, 0), SectorAllocation::AppendOnly).unwrap();
        let tag = region.read_chunk(0, 0).unwrap().unwrap();
        let chunk = NbtSerializer::default().nbt_to_chunk(&tag, "minecraft:overworld").unwrap();
        assert_eq!(chunk.get_block(0, 64, 0), Some("minecraft:stone"));
    }
}
