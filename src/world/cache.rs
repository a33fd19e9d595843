use crate::world::chunk::{ChunkData, ChunkPos};
use crate::world::types::{BlockPos, Position};
use std::collections::HashMap;
use std::mem::size_of;

/// Chunks one bot currently has loaded.
///
/// Not synchronised: the owning session keeps it behind its own lock.
#[derive(Debug, Clone, Default)]
pub struct BotWorldData {
    chunks: HashMap<ChunkPos, ChunkData>,
    current_dimension: String,
}

/// Whether `state` matches any of `block_types`.
///
/// A pattern matches exactly, as a bare id against any property variant
/// (`minecraft:chest` matches `minecraft:chest[facing=north]`), or as a `*`
/// wildcard anchored at the start of the state (`minecraft:*_ore`).
pub fn block_matches<S: AsRef<str>>(state: &str, block_types: &[S]) -> bool {
    block_types.iter().any(|pattern| {
        let pattern = pattern.as_ref();
        if state == pattern {
            return true;
        }
        if let Some(rest) = state.strip_prefix(pattern) {
            if rest.starts_with('[') {
                return true;
            }
        }
        pattern.contains('*') && wildcard_prefix_match(pattern, state)
    })
}

/// Glob match where `*` spans any run of characters and the pattern only has to
/// cover a prefix of `text`.
fn wildcard_prefix_match(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or_default();
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };
    for part in parts {
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }
    true
}

/// Inclusive chunk range covering `radius` blocks around `center` on one axis.
fn chunk_span(center: f64, radius: i32) -> std::ops::RangeInclusive<i32> {
    let lo = ((center - radius as f64) / 16.0).floor() as i32;
    let hi = ((center + radius as f64) / 16.0).floor() as i32;
    lo..=hi
}

impl BotWorldData {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when the chunk isn't loaded; never loads anything.
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Option<&str> {
        self.chunks.get(&ChunkPos::from_block(x, z))?.get_block(x, y, z)
    }

    /// Creates the chunk and section on demand.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, state: &str) {
        let pos = ChunkPos::from_block(x, z);
        let dimension = &self.current_dimension;
        self.chunks
            .entry(pos)
            .or_insert_with(|| ChunkData::new(pos.x, pos.z, dimension))
            .set_block(x, y, z, state);
    }

    pub fn load_chunk(&mut self, chunk: ChunkData) {
        self.chunks.insert(chunk.pos(), chunk);
    }

    pub fn unload_chunk(&mut self, chunk_x: i32, chunk_z: i32) -> Option<ChunkData> {
        self.chunks.remove(&ChunkPos::new(chunk_x, chunk_z))
    }

    pub fn is_chunk_loaded(&self, chunk_x: i32, chunk_z: i32) -> bool {
        self.chunks.contains_key(&ChunkPos::new(chunk_x, chunk_z))
    }

    pub fn get_chunk(&self, chunk_x: i32, chunk_z: i32) -> Option<&ChunkData> {
        self.chunks.get(&ChunkPos::new(chunk_x, chunk_z))
    }

    pub fn chunks(&self) -> impl Iterator<Item = &ChunkData> {
        self.chunks.values()
    }

    /// Loaded positions, sorted so callers see a stable order.
    pub fn loaded_chunks(&self) -> Vec<ChunkPos> {
        let mut positions: Vec<ChunkPos> = self.chunks.keys().copied().collect();
        positions.sort();
        positions
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn current_dimension(&self) -> &str {
        &self.current_dimension
    }

    pub fn set_current_dimension(&mut self, dimension: &str) {
        self.current_dimension = dimension.to_owned();
    }

    pub fn total_memory_usage(&self) -> usize {
        size_of::<Self>() + self.chunks.values().map(ChunkData::memory_usage).sum::<usize>()
    }

    /// Every block matching `block_type` within `radius` of `center`.
    /// Only loaded chunks are scanned.
    pub fn find_blocks(&self, block_type: &str, center: Position, radius: i32) -> Vec<BlockPos> {
        let radius_sq = (radius as f64) * (radius as f64);
        let mut results = Vec::new();

        self.scan(center, radius, |pos, state, dist_sq| {
            if dist_sq <= radius_sq && block_matches(state, &[block_type]) {
                results.push(pos);
            }
            radius_sq
        });

        results
    }

    /// Closest block matching any of `block_types` within `max_distance` of
    /// `start`. On equal distances the first block in scan order wins: chunks by
    /// X then Z, blocks by X, Z, then ascending Y.
    pub fn find_nearest_block<S: AsRef<str>>(
        &self,
        block_types: &[S],
        start: Position,
        max_distance: i32,
    ) -> Option<BlockPos> {
        let mut nearest = None;
        let mut nearest_dist_sq = (max_distance as f64) * (max_distance as f64);

        self.scan(start, max_distance, |pos, state, dist_sq| {
            if dist_sq < nearest_dist_sq && block_matches(state, block_types) {
                nearest = Some(pos);
                nearest_dist_sq = dist_sq;
            }
            // shrink the search to the best hit so far
            nearest_dist_sq
        });

        nearest
    }

    /// Visits each block of the loaded chunks in the cube around `center`.
    /// `visit` returns the current squared cutoff; columns and chunks beyond it
    /// are skipped.
    fn scan<F>(&self, center: Position, radius: i32, mut visit: F)
    where
        F: FnMut(BlockPos, &str, f64) -> f64,
    {
        let mut cutoff = (radius as f64) * (radius as f64);

        for chunk_x in chunk_span(center.x, radius) {
            for chunk_z in chunk_span(center.z, radius) {
                let Some(chunk) = self.get_chunk(chunk_x, chunk_z) else {
                    continue;
                };

                let min_y = chunk.min_y.max((center.y - radius as f64).floor() as i32);
                let max_y = (chunk.max_y - 1).min((center.y + radius as f64).ceil() as i32);
                if min_y > max_y {
                    continue;
                }

                // nearest point of the chunk's box to the centre
                let near_x = center.x.clamp((chunk_x * 16) as f64, (chunk_x * 16 + 15) as f64);
                let near_z = center.z.clamp((chunk_z * 16) as f64, (chunk_z * 16 + 15) as f64);
                let near_y = center.y.clamp(min_y as f64, max_y as f64);
                let (dx, dy, dz) = (near_x - center.x, near_y - center.y, near_z - center.z);
                if dx * dx + dy * dy + dz * dz > cutoff {
                    continue;
                }

                for lx in 0..16 {
                    let world_x = chunk_x * 16 + lx;
                    let dx = world_x as f64 - center.x;
                    for lz in 0..16 {
                        let world_z = chunk_z * 16 + lz;
                        let dz = world_z as f64 - center.z;
                        let horizontal_sq = dx * dx + dz * dz;
                        if horizontal_sq > cutoff {
                            continue;
                        }
                        for y in min_y..=max_y {
                            let dy = y as f64 - center.y;
                            let dist_sq = horizontal_sq + dy * dy;
                            if dist_sq > cutoff {
                                continue;
                            }
                            if let Some(state) = chunk.get_block(world_x, y, world_z) {
                                cutoff = visit(BlockPos::new(world_x, y, world_z), state, dist_sq);
                            }
                        }
                    }
                }
            }
        }
    }
}
