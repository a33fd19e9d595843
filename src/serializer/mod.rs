//! Chunk to NBT conversion in the layout Anvil chunks use since 1.18.

pub mod block_state;
pub mod packing;

pub use block_state::{block_state_from_nbt, block_state_to_nbt};
pub use packing::{bits_for_palette, pack, unpack, PackingMode};

use crate::error::{Result, WorldError};
use crate::logger::{log, time::unix_timestamp, LogSeverity::*};
use crate::nbt::{Compound, Tag};
use crate::world::chunk::{ChunkData, ChunkSection, SECTION_VOLUME};
use serde::{Deserialize, Serialize};

const HEIGHTMAP_BITS: u32 = 9;
const COLUMN_COUNT: usize = 256;
const DEFAULT_BIOME: &str = "minecraft:plains";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NbtSerializer {
    pub packing: PackingMode,
}

/// [`NbtSerializer::chunk_to_nbt`] with padded packing.
pub fn chunk_to_nbt(chunk: &ChunkData, data_version: i32) -> Tag {
    NbtSerializer::default().chunk_to_nbt(chunk, data_version)
}

fn is_air(state: &str) -> bool {
    state.contains("air")
}

impl NbtSerializer {
    pub fn new(packing: PackingMode) -> Self {
        Self { packing }
    }

    pub fn chunk_to_nbt(&self, chunk: &ChunkData, data_version: i32) -> Tag {
        let base = chunk.section_base();
        let lowest = chunk.sections.keys().next().map_or(base, |&y| base + y);

        let sections = chunk
            .sections
            .values()
            .map(|section| self.section_to_nbt(section, base))
            .collect();

        let mut root = Compound::new();
        root.insert("DataVersion".to_owned(), Tag::Int(data_version));
        root.insert("xPos".to_owned(), Tag::Int(chunk.chunk_x));
        root.insert("zPos".to_owned(), Tag::Int(chunk.chunk_z));
        root.insert("yPos".to_owned(), Tag::Int(lowest));
        root.insert("Status".to_owned(), Tag::String("minecraft:full".to_owned()));
        root.insert("LastUpdate".to_owned(), Tag::Long(unix_timestamp()));
        root.insert("InhabitedTime".to_owned(), Tag::Long(0));
        root.insert("sections".to_owned(), Tag::List(sections));
        root.insert("Heightmaps".to_owned(), create_heightmaps(chunk));
        root.insert("block_entities".to_owned(), Tag::List(Vec::new()));
        root.insert("PostProcessing".to_owned(), Tag::List(Vec::new()));
        Tag::Compound(root)
    }

    /// `base` is the absolute section Y of index 0, so `Y` ends up absolute.
    pub fn section_to_nbt(&self, section: &ChunkSection, base: i32) -> Tag {
        let palette = section.palette.iter().map(|s| block_state_to_nbt(s)).collect();

        let mut block_states = Compound::new();
        block_states.insert("palette".to_owned(), Tag::List(palette));
        if !section.uniform && !section.block_indices.is_empty() {
            let bits = bits_for_palette(section.palette.len());
            let count = section.block_indices.len().min(SECTION_VOLUME);
            let data = pack(&section.block_indices[..count], bits, self.packing);
            block_states.insert("data".to_owned(), Tag::LongArray(data));
        }

        let mut biomes = Compound::new();
        biomes.insert(
            "palette".to_owned(),
            Tag::List(vec![Tag::String(DEFAULT_BIOME.to_owned())]),
        );

        let mut tag = Compound::new();
        tag.insert("Y".to_owned(), Tag::Byte((base + section.section_y) as i8));
        tag.insert("block_states".to_owned(), Tag::Compound(block_states));
        tag.insert("biomes".to_owned(), Tag::Compound(biomes));
        Tag::Compound(tag)
    }

    /// Rebuilds a chunk from [`chunk_to_nbt`](Self::chunk_to_nbt) output. The
    /// chunk keeps the default height range; sections outside it are dropped.
    pub fn nbt_to_chunk(&self, tag: &Tag, dimension: &str) -> Result<ChunkData> {
        let int = |key: &str| {
            tag.get(key)
                .and_then(Tag::as_i32)
                .ok_or_else(|| WorldError::FormatError(format!("chunk without {}", key)))
        };

        let mut chunk = ChunkData::new(int("xPos")?, int("zPos")?, dimension);
        let base = chunk.section_base();
        let section_limit = (chunk.max_y - chunk.min_y) / 16;

        let sections: &[Tag] = match tag.get("sections") {
            Some(sections) => sections
                .as_list()
                .ok_or_else(|| WorldError::FormatError("sections is not a list".to_owned()))?
                .as_slice(),
            None => &[],
        };

        for section_tag in sections {
            let section = self.nbt_to_section(section_tag, base)?;
            if section.section_y < 0 || section.section_y >= section_limit {
                log(
                    format!(
                        "Dropping section {} of chunk ({}, {}): outside the height range",
                        base + section.section_y,
                        chunk.chunk_x,
                        chunk.chunk_z
                    ),
                    Warning,
                );
                continue;
            }
            chunk.sections.insert(section.section_y, section);
        }

        Ok(chunk)
    }

    fn nbt_to_section(&self, tag: &Tag, base: i32) -> Result<ChunkSection> {
        let y = tag
            .get("Y")
            .and_then(Tag::as_i8)
            .ok_or_else(|| WorldError::FormatError("section without Y".to_owned()))?;
        let section_y = y as i32 - base;

        let block_states = tag
            .get("block_states")
            .ok_or_else(|| WorldError::FormatError(format!("section {} without block_states", y)))?;
        let palette = block_states
            .get("palette")
            .and_then(Tag::as_list)
            .ok_or_else(|| WorldError::FormatError(format!("section {} without palette", y)))?
            .iter()
            .map(block_state_from_nbt)
            .collect::<Result<Vec<_>>>()?;
        if palette.is_empty() {
            return Err(WorldError::FormatError(format!("section {} has an empty palette", y)));
        }

        let Some(data) = block_states.get("data").and_then(Tag::as_long_array) else {
            return Ok(ChunkSection {
                section_y,
                palette: palette[..1].to_vec(),
                block_indices: Vec::new(),
                uniform: true,
            });
        };

        let bits = bits_for_palette(palette.len());
        let block_indices = unpack(data, bits, SECTION_VOLUME, self.packing)?;
        if let Some(bad) = block_indices.iter().find(|&&i| i as usize >= palette.len()) {
            return Err(WorldError::FormatError(format!(
                "section {} index {} exceeds palette of {}",
                y,
                bad,
                palette.len()
            )));
        }

        Ok(ChunkSection {
            section_y,
            palette,
            block_indices,
            uniform: false,
        })
    }
}

/// `MOTION_BLOCKING` only: per column the highest non-air Y relative to
/// `min_y`, 0 for all-air columns, nine bits each.
pub fn create_heightmaps(chunk: &ChunkData) -> Tag {
    let mut heights = vec![0u32; COLUMN_COUNT];
    for z in 0..16 {
        for x in 0..16 {
            heights[z * 16 + x] = highest_block(chunk, x as i32, z as i32);
        }
    }

    let mut maps = Compound::new();
    maps.insert(
        "MOTION_BLOCKING".to_owned(),
        Tag::LongArray(pack(&heights, HEIGHTMAP_BITS, PackingMode::Padded)),
    );
    Tag::Compound(maps)
}

fn highest_block(chunk: &ChunkData, x: i32, z: i32) -> u32 {
    // walk sections top down and skip the ones never written
    for (&index, section) in chunk.sections.iter().rev() {
        if section.uniform && section.palette.first().map_or(true, |s| is_air(s)) {
            continue;
        }
        for local_y in (0..16).rev() {
            let state = section.get_block(x as usize, local_y, z as usize);
            if !is_air(state) {
                let height = index * 16 + local_y as i32;
                if height >= chunk.max_y - chunk.min_y {
                    continue;
                }
                return height as u32;
            }
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk() -> ChunkData {
        let mut chunk = ChunkData::new(3, -2, "minecraft:overworld");
        chunk.set_block(0, -64, 0, "minecraft:bedrock");
        chunk.set_block(1, 70, 2, "minecraft:oak_log[axis=y]");
        chunk.set_block(1, 71, 2, "minecraft:oak_leaves[distance=1,persistent=false]");
        chunk.set_block(5, 10, 5, "minecraft:cave_air");
        chunk
    }

    #[test]
    fn test_chunk_root_fields() {
        let tag = chunk_to_nbt(&sample_chunk(), 3465);
        assert_eq!(tag.get("DataVersion"), Some(&Tag::Int(3465)));
        assert_eq!(tag.get("xPos"), Some(&Tag::Int(3)));
        assert_eq!(tag.get("zPos"), Some(&Tag::Int(-2)));
        assert_eq!(tag.get("yPos"), Some(&Tag::Int(-4)));
        assert_eq!(
            tag.get("Status").and_then(Tag::as_string).map(String::as_str),
            Some("minecraft:full")
        );
        assert_eq!(tag.get("InhabitedTime"), Some(&Tag::Long(0)));
        assert_eq!(tag.get("block_entities"), Some(&Tag::List(Vec::new())));
        assert_eq!(tag.get("PostProcessing"), Some(&Tag::List(Vec::new())));
        assert!(tag.get("LastUpdate").and_then(Tag::as_i64).unwrap() > 0);

        let sections = tag.get("sections").and_then(Tag::as_list).unwrap();
        let ys: Vec<i8> = sections.iter().map(|s| s.get("Y").and_then(Tag::as_i8).unwrap()).collect();
        assert_eq!(ys, vec![-4, 0, 4]);
    }

    #[test]
    fn test_empty_chunk_y_pos() {
        let tag = chunk_to_nbt(&ChunkData::new(0, 0, "minecraft:overworld"), 3465);
        assert_eq!(tag.get("yPos"), Some(&Tag::Int(-4)));
        assert_eq!(tag.get("sections"), Some(&Tag::List(Vec::new())));
    }

    #[test]
    fn test_uniform_section_has_no_data() {
        let section = ChunkSection::uniform(4, "minecraft:stone");
        let tag = NbtSerializer::default().section_to_nbt(&section, -4);
        assert_eq!(tag.get("Y"), Some(&Tag::Byte(0)));

        let block_states = tag.get("block_states").unwrap();
        assert!(block_states.get("data").is_none());
        assert_eq!(block_states.get("palette").and_then(Tag::as_list).unwrap().len(), 1);

        let biomes = tag.get("biomes").and_then(|b| b.get("palette")).and_then(Tag::as_list).unwrap();
        assert_eq!(biomes, &vec![Tag::String("minecraft:plains".to_owned())]);
    }

    #[test]
    fn test_section_data_length() {
        let mut section = ChunkSection::new(0);
        for i in 0..20 {
            section.set_block(i % 16, i / 16, 0, &format!("test:block_{}", i));
        }
        assert_eq!(section.palette.len(), 21);

        let padded = NbtSerializer::new(PackingMode::Padded).section_to_nbt(&section, 0);
        let data = padded.get("block_states").and_then(|b| b.get("data")).and_then(Tag::as_long_array).unwrap();
        assert_eq!(data.len(), 342);

        let compact = NbtSerializer::new(PackingMode::Compact).section_to_nbt(&section, 0);
        let data = compact.get("block_states").and_then(|b| b.get("data")).and_then(Tag::as_long_array).unwrap();
        assert_eq!(data.len(), 320);
    }

    #[test]
    fn test_heightmap() {
        let chunk = sample_chunk();
        let tag = create_heightmaps(&chunk);
        let words = tag.get("MOTION_BLOCKING").and_then(Tag::as_long_array).unwrap();
        assert_eq!(words.len(), 37);

        let heights = unpack(words, 9, 256, PackingMode::Padded).unwrap();
        assert_eq!(heights[0], 0); // bedrock at min_y
        assert_eq!(heights[2 * 16 + 1], 71 + 64);
        assert_eq!(heights[5 * 16 + 5], 0); // cave_air counts as air
        assert_eq!(heights[15 * 16 + 15], 0);
    }

    #[test]
    fn test_nbt_to_chunk_round_trip() {
        for packing in [PackingMode::Padded, PackingMode::Compact] {
            let serializer = NbtSerializer::new(packing);
            let mut chunk = sample_chunk();
            chunk.sections.insert(20, ChunkSection::uniform(20, "minecraft:stone"));

            let tag = serializer.chunk_to_nbt(&chunk, 3465);
            let back = serializer.nbt_to_chunk(&tag, "minecraft:overworld").unwrap();

            assert_eq!(back.chunk_x, 3);
            assert_eq!(back.section_count(), chunk.section_count());
            for (x, y, z) in [(0, -64, 0), (1, 70, 2), (5, 10, 5), (9, 9, 9), (4, 260, 4)] {
                assert_eq!(back.get_block(x, y, z), chunk.get_block(x, y, z));
            }
            assert_eq!(
                back.get_block(1, 71, 2),
                Some("minecraft:oak_leaves[distance=1,persistent=false]")
            );
            assert!(back.sections[&20].uniform);
        }
    }

    #[test]
    fn test_nbt_to_chunk_missing_position() {
        assert!(NbtSerializer::default()
            .nbt_to_chunk(&Tag::Compound(Compound::new()), "minecraft:overworld")
            .is_err());
    }
}
