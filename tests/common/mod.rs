#![allow(dead_code)]

use std::fs::File;
use std::path::Path;
use worldsave::nbt::{NbtFile, Tag};
use worldsave::world::{ChunkData, ChunkSection, SECTION_VOLUME};
use worldsave::MinecraftVersion;

pub const DATA_VERSION: i32 = 3465;

pub fn test_version() -> MinecraftVersion {
    MinecraftVersion::new(DATA_VERSION, "1.20.1")
}

/// A non-uniform section using every one of `palette_size` states where the
/// section has room for them.
pub fn section_with_palette(section_y: i32, palette_size: usize) -> ChunkSection {
    ChunkSection {
        section_y,
        palette: (0..palette_size).map(|i| format!("test:block_{}", i)).collect(),
        block_indices: (0..SECTION_VOLUME)
            .map(|i| ((i * 31 + section_y as usize) % palette_size) as u32)
            .collect(),
        uniform: false,
    }
}

pub fn chunk_with_sections(x: i32, z: i32, sections: i32, palette_size: usize) -> ChunkData {
    let mut chunk = ChunkData::new(x, z, "minecraft:overworld");
    for section_y in 0..sections {
        chunk
            .sections
            .insert(section_y, section_with_palette(section_y, palette_size));
    }
    chunk
}

pub fn read_level_data(world: &Path) -> Tag {
    let level = NbtFile::read_gzip(File::open(world.join("level.dat")).unwrap()).unwrap();
    level.root.get("Data").cloned().expect("level.dat without Data")
}
