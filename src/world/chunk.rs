use crate::logger::{log, LogSeverity::*};
use crate::registry::BlockRegistry;
use std::collections::{BTreeMap, HashMap};
use std::mem::size_of;

pub const AIR: &str = "minecraft:air";

/// Blocks in one 16x16x16 section.
pub const SECTION_VOLUME: usize = 4096;

/// Chunk column coordinates (block coordinates >> 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn from_block(x: i32, z: i32) -> Self {
        Self::new(x >> 4, z >> 4)
    }
}

/// The three vanilla dimensions plus whatever a modded server sends.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dimension {
    Overworld,
    Nether,
    End,
    Other(String),
}

impl Dimension {
    pub fn from_id(id: &str) -> Self {
        match id {
            "" | "minecraft:overworld" | "overworld" => Dimension::Overworld,
            "minecraft:the_nether" | "the_nether" => Dimension::Nether,
            "minecraft:the_end" | "the_end" => Dimension::End,
            other => Dimension::Other(other.to_owned()),
        }
    }

    /// Folder below the world root holding this dimension's `region/` directory.
    /// Unknown dimensions have no place in a vanilla world.
    pub fn folder(&self) -> Option<&'static str> {
        match self {
            Dimension::Overworld => Some(""),
            Dimension::Nether => Some("DIM-1"),
            Dimension::End => Some("DIM1"),
            Dimension::Other(_) => None,
        }
    }
}

/// One 16x16x16 slice of a chunk.
///
/// `block_indices` is laid out `y * 256 + z * 16 + x` and points into `palette`.
/// A uniform section is entirely `palette[0]` and carries no indices.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSection {
    pub section_y: i32,
    pub palette: Vec<String>,
    pub block_indices: Vec<u32>,
    pub uniform: bool,
}

fn section_index(lx: usize, ly: usize, lz: usize) -> usize {
    ly * 256 + lz * 16 + lx
}

impl ChunkSection {
    /// A fully materialised section of air.
    pub fn new(section_y: i32) -> Self {
        Self {
            section_y,
            palette: vec![AIR.to_owned()],
            block_indices: vec![0; SECTION_VOLUME],
            uniform: false,
        }
    }

    pub fn uniform(section_y: i32, state: &str) -> Self {
        Self {
            section_y,
            palette: vec![state.to_owned()],
            block_indices: Vec::new(),
            uniform: true,
        }
    }

    /// Builds a section from global block state ids as they arrive off the wire,
    /// naming each id through `registry`. A single id makes a uniform section.
    pub fn from_global_ids(section_y: i32, ids: &[u32], registry: &BlockRegistry) -> Self {
        if ids.is_empty() {
            return Self::uniform(section_y, AIR);
        }

        let mut section = Self {
            section_y,
            palette: Vec::new(),
            block_indices: Vec::with_capacity(SECTION_VOLUME),
            uniform: ids.len() == 1,
        };
        let mut by_id: HashMap<u32, u32> = HashMap::new();
        let mut by_state: HashMap<String, u32> = HashMap::new();
        let mut unknown = Vec::new();

        for &id in ids {
            let slot = match by_id.get(&id) {
                Some(&slot) => slot,
                None => {
                    let state = registry.get_block_state(id).unwrap_or_else(|| {
                        unknown.push(id);
                        AIR.to_owned()
                    });
                    let next = section.palette.len() as u32;
                    let slot = *by_state.entry(state.clone()).or_insert(next);
                    if slot == next {
                        section.palette.push(state);
                    }
                    by_id.insert(id, slot);
                    slot
                }
            };
            if !section.uniform {
                section.block_indices.push(slot);
            }
        }

        if !section.uniform {
            section.block_indices.resize(SECTION_VOLUME, 0);
        }

        if !unknown.is_empty() {
            log(
                format!(
                    "Section {}: block state ids {:?} missing from registry (data version {}), stored as air",
                    section_y,
                    unknown,
                    registry.data_version()
                ),
                Warning,
            );
        }

        section
    }

    pub fn get_block(&self, lx: usize, ly: usize, lz: usize) -> &str {
        if lx >= 16 || ly >= 16 || lz >= 16 {
            log(
                format!("ChunkSection: invalid local coordinates ({}, {}, {})", lx, ly, lz),
                Warning,
            );
            return AIR;
        }

        if self.uniform {
            return self.palette.first().map_or(AIR, String::as_str);
        }

        let index = section_index(lx, ly, lz);
        let Some(&palette_index) = self.block_indices.get(index) else {
            log(
                format!(
                    "ChunkSection: block index {} out of range (len {})",
                    index,
                    self.block_indices.len()
                ),
                Warning,
            );
            return AIR;
        };

        match self.palette.get(palette_index as usize) {
            Some(state) => state,
            None => {
                log(
                    format!(
                        "ChunkSection: palette index {} out of range (palette len {})",
                        palette_index,
                        self.palette.len()
                    ),
                    Warning,
                );
                AIR
            }
        }
    }

    pub fn set_block(&mut self, lx: usize, ly: usize, lz: usize, state: &str) {
        if lx >= 16 || ly >= 16 || lz >= 16 {
            log(
                format!("ChunkSection::set_block: invalid local coordinates ({}, {}, {})", lx, ly, lz),
                Warning,
            );
            return;
        }

        if self.uniform {
            if self.palette.is_empty() {
                self.palette.push(AIR.to_owned());
            }
            if self.palette[0] == state {
                return;
            }
            self.uniform = false;
            self.block_indices = vec![0; SECTION_VOLUME];
        }

        let palette_index = match self.palette.iter().position(|s| s == state) {
            Some(index) => index,
            None => {
                self.palette.push(state.to_owned());
                self.palette.len() - 1
            }
        };

        if self.block_indices.len() < SECTION_VOLUME {
            self.block_indices.resize(SECTION_VOLUME, 0);
        }
        self.block_indices[section_index(lx, ly, lz)] = palette_index as u32;
    }

    pub fn memory_usage(&self) -> usize {
        size_of::<Self>()
            + self.palette.iter().map(|s| s.capacity() + size_of::<String>()).sum::<usize>()
            + self.block_indices.capacity() * size_of::<u32>()
    }
}

/// A full chunk column: sections keyed by index counted up from `min_y`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkData {
    pub chunk_x: i32,
    pub chunk_z: i32,
    pub dimension: String,
    pub min_y: i32,
    pub max_y: i32,
    pub sections: BTreeMap<i32, ChunkSection>,
}

impl ChunkData {
    pub fn new(chunk_x: i32, chunk_z: i32, dimension: &str) -> Self {
        Self {
            chunk_x,
            chunk_z,
            dimension: dimension.to_owned(),
            min_y: -64,
            max_y: 320,
            sections: BTreeMap::new(),
        }
    }

    pub fn pos(&self) -> ChunkPos {
        ChunkPos::new(self.chunk_x, self.chunk_z)
    }

    /// Absolute section Y (world y >> 4) of section index 0.
    pub fn section_base(&self) -> i32 {
        self.min_y >> 4
    }

    fn locate(&self, y: i32) -> Option<(i32, usize)> {
        if y < self.min_y || y >= self.max_y {
            return None;
        }
        let offset = y - self.min_y;
        Some((offset.div_euclid(16), offset.rem_euclid(16) as usize))
    }

    /// `x` and `z` may be world or local coordinates; only the low four bits are used.
    /// `None` when `y` is out of bounds or the section was never written.
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Option<&str> {
        let (section_y, local_y) = self.locate(y)?;
        let section = self.sections.get(&section_y)?;
        Some(section.get_block((x & 15) as usize, local_y, (z & 15) as usize))
    }

    pub fn set_block(&mut self, x: i32, y: i32, z: i32, state: &str) {
        let Some((section_y, local_y)) = self.locate(y) else {
            return;
        };
        self.sections
            .entry(section_y)
            .or_insert_with(|| ChunkSection::new(section_y))
            .set_block((x & 15) as usize, local_y, (z & 15) as usize, state);
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn memory_usage(&self) -> usize {
        size_of::<Self>()
            + self.dimension.capacity()
            + self.sections.values().map(ChunkSection::memory_usage).sum::<usize>()
    }
}
