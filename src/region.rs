//! Anvil region files (`r.<x>.<z>.mca`): 32x32 chunks in 4 KiB sectors.
//!
//! The first two sectors are the header: 1024 big-endian location words
//! `(sector_offset << 8) | sector_count`, then 1024 big-endian timestamps.
//! Each chunk payload starts with a `u32` length (counting the compression byte
//! but not itself), one compression byte, then the compressed NBT.

use crate::error::{Result, WorldError};
use crate::logger::{log, time::unix_timestamp, LogSeverity::*};
use crate::nbt::Tag;
use byteorder::{BigEndian, ReadBytesExt};
use bytes::{BufMut, BytesMut};
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const SECTOR_SIZE: usize = 4096;
pub const CHUNKS_PER_REGION: usize = 1024;
const HEADER_SECTORS: u32 = 2;
const HEADER_LEN: u64 = HEADER_SECTORS as u64 * SECTOR_SIZE as u64;
const MAX_CHUNK_SECTORS: usize = 255;
const MAX_SECTOR_OFFSET: u32 = (1 << 24) - 1;

/// Decompressed chunks larger than this are treated as corrupt.
const MAX_DECOMPRESSED: u64 = 64 * 1024 * 1024;

pub const COMPRESSION_GZIP: u8 = 1;
pub const COMPRESSION_ZLIB: u8 = 2;
pub const COMPRESSION_NONE: u8 = 3;

/// Where new chunk payloads go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorAllocation {
    /// Always past the current end of file. Rewrites leave their old sectors behind.
    #[default]
    AppendOnly,
    /// Reuse the first free run big enough, tracking free sectors from the header.
    FirstFit,
}

/// Region coordinates: chunk coordinates >> 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn from_chunk(chunk_x: i32, chunk_z: i32) -> Self {
        Self::new(chunk_x >> 5, chunk_z >> 5)
    }

    pub fn file_name(&self) -> String {
        format!("r.{}.{}.mca", self.x, self.z)
    }
}

/// Slot of a chunk in the header tables. Only the low five bits of each
/// coordinate are used, so world chunk coordinates work too.
pub fn header_index(local_x: i32, local_z: i32) -> usize {
    ((local_z & 31) * 32 + (local_x & 31)) as usize
}

fn sectors_for(len: usize) -> usize {
    (len + SECTOR_SIZE - 1) / SECTOR_SIZE
}

fn compression_error(err: io::Error) -> WorldError {
    WorldError::CompressionError(err.to_string())
}

/// An open region file. Headers live in memory and are rewritten after every
/// chunk write; the file is flushed when dropped.
#[derive(Debug)]
pub struct RegionFile {
    path: PathBuf,
    file: File,
    locations: Vec<u32>,
    timestamps: Vec<u32>,
    allocation: SectorAllocation,
    /// One entry per sector, `true` when free. Kept for first-fit only.
    sector_free: Vec<bool>,
}

impl RegionFile {
    /// Opens `path`, creating the file and its parent directories as needed.
    /// A file shorter than the header is reset to an empty region.
    pub fn open(path: impl AsRef<Path>, allocation: SectorAllocation) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();
        let mut region = Self::with_file(path, file, allocation);

        if len < HEADER_LEN {
            if len > 0 {
                log(
                    format!("Region {} is truncated ({} bytes), starting over", path.display(), len),
                    Warning,
                );
            }
            region.save_headers()?;
        } else {
            region.load_headers()?;
        }
        region.build_free_sector_map()?;

        Ok(region)
    }

    /// Opens an existing region without touching it on disk. Writes through
    /// the returned handle fail.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len < HEADER_LEN {
            return Err(WorldError::FormatError(format!(
                "region {} is shorter than its header ({} bytes)",
                path.display(),
                len
            )));
        }

        let mut region = Self::with_file(path, file, SectorAllocation::AppendOnly);
        region.load_headers()?;
        Ok(region)
    }

    fn with_file(path: &Path, file: File, allocation: SectorAllocation) -> Self {
        RegionFile {
            path: path.to_path_buf(),
            file,
            locations: vec![0; CHUNKS_PER_REGION],
            timestamps: vec![0; CHUNKS_PER_REGION],
            allocation,
            sector_free: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_headers(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut header = vec![0u8; HEADER_SECTORS as usize * SECTOR_SIZE];
        self.file.read_exact(&mut header)?;

        let mut cursor = Cursor::new(header);
        cursor.read_u32_into::<BigEndian>(&mut self.locations)?;
        cursor.read_u32_into::<BigEndian>(&mut self.timestamps)?;
        Ok(())
    }

    fn save_headers(&mut self) -> Result<()> {
        let mut header = BytesMut::with_capacity(HEADER_SECTORS as usize * SECTOR_SIZE);
        for &location in &self.locations {
            header.put_u32(location);
        }
        for &timestamp in &self.timestamps {
            header.put_u32(timestamp);
        }

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header)?;
        Ok(())
    }

    fn file_sectors(&self) -> Result<u32> {
        let len = self.file.metadata()?.len();
        Ok(sectors_for(len as usize).max(HEADER_SECTORS as usize) as u32)
    }

    fn build_free_sector_map(&mut self) -> Result<()> {
        if self.allocation != SectorAllocation::FirstFit {
            return Ok(());
        }

        let mut free = vec![true; self.file_sectors()? as usize];
        free[0] = false;
        free[1] = false;
        for &location in &self.locations {
            let (offset, count) = (location >> 8, location & 0xFF);
            if offset < HEADER_SECTORS || count == 0 {
                continue;
            }
            for sector in offset..offset + count {
                if let Some(slot) = free.get_mut(sector as usize) {
                    *slot = false;
                }
            }
        }
        self.sector_free = free;
        Ok(())
    }

    fn mark_sectors(&mut self, offset: u32, count: usize, free: bool) {
        let end = offset as usize + count;
        if !free && end > self.sector_free.len() {
            self.sector_free.resize(end, true);
        }
        for sector in offset as usize..end.min(self.sector_free.len()) {
            self.sector_free[sector] = free;
        }
    }

    fn allocate_sectors(&mut self, count: usize) -> Result<u32> {
        let offset = match self.allocation {
            SectorAllocation::AppendOnly => self.file_sectors()?,
            SectorAllocation::FirstFit => {
                let mut run_start = 0;
                let mut run_len = 0;
                let mut found = None;
                for (sector, &free) in self.sector_free.iter().enumerate() {
                    if !free {
                        run_len = 0;
                        continue;
                    }
                    if run_len == 0 {
                        run_start = sector;
                    }
                    run_len += 1;
                    if run_len >= count {
                        found = Some(run_start as u32);
                        break;
                    }
                }
                let offset = match found {
                    Some(offset) => offset,
                    // a trailing free run can be extended instead of skipped
                    None if run_len > 0 && run_start + run_len == self.sector_free.len() => {
                        run_start as u32
                    }
                    None => self.sector_free.len().max(self.file_sectors()? as usize) as u32,
                };
                self.mark_sectors(offset, count, false);
                offset
            }
        };

        if offset + count as u32 > MAX_SECTOR_OFFSET {
            return Err(WorldError::FormatError(format!(
                "region {} is full",
                self.path.display()
            )));
        }
        Ok(offset)
    }

    /// Compresses `chunk` with zlib and stores it in slot `(local_x, local_z)`,
    /// replacing whatever was there.
    pub fn write_chunk(&mut self, local_x: i32, local_z: i32, chunk: &Tag) -> Result<()> {
        let index = header_index(local_x, local_z);

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        chunk.write(&mut encoder, "")?;
        let compressed = encoder.finish().map_err(compression_error)?;

        let payload_len = 5 + compressed.len();
        let sectors = sectors_for(payload_len);
        if sectors > MAX_CHUNK_SECTORS {
            return Err(WorldError::ChunkTooLarge { sectors });
        }

        let mut payload = BytesMut::with_capacity(sectors * SECTOR_SIZE);
        payload.put_u32(compressed.len() as u32 + 1);
        payload.put_u8(COMPRESSION_ZLIB);
        payload.put_slice(&compressed);
        payload.resize(sectors * SECTOR_SIZE, 0);

        // the old run only counts as free once the new location is on disk
        let free_before = self.sector_free.clone();
        let old = self.locations[index];
        if self.allocation == SectorAllocation::FirstFit && old >> 8 >= HEADER_SECTORS && old & 0xFF > 0 {
            self.mark_sectors(old >> 8, (old & 0xFF) as usize, true);
        }

        let old_timestamp = self.timestamps[index];
        let result = self.store_payload(index, &payload, sectors);
        if result.is_err() {
            self.sector_free = free_before;
            self.locations[index] = old;
            self.timestamps[index] = old_timestamp;
        }
        result
    }

    fn store_payload(&mut self, index: usize, payload: &[u8], sectors: usize) -> Result<()> {
        let offset = self.allocate_sectors(sectors)?;

        self.file.seek(SeekFrom::Start(offset as u64 * SECTOR_SIZE as u64))?;
        self.file.write_all(payload)?;

        self.locations[index] = (offset << 8) | sectors as u32;
        self.timestamps[index] = unix_timestamp() as u32;
        self.save_headers()
    }

    /// `Ok(None)` when the slot is empty.
    pub fn read_chunk(&mut self, local_x: i32, local_z: i32) -> Result<Option<Tag>> {
        let location = self.locations[header_index(local_x, local_z)];
        if location == 0 {
            return Ok(None);
        }

        let (offset, sectors) = (location >> 8, (location & 0xFF) as usize);
        if offset < HEADER_SECTORS || sectors == 0 {
            return Err(WorldError::FormatError(format!(
                "bad location 0x{:08X} for chunk ({}, {})",
                location, local_x, local_z
            )));
        }

        self.file.seek(SeekFrom::Start(offset as u64 * SECTOR_SIZE as u64))?;
        let length = self.file.read_u32::<BigEndian>()? as usize;
        if length == 0 || length + 4 > sectors * SECTOR_SIZE {
            return Err(WorldError::FormatError(format!(
                "chunk ({}, {}) claims {} bytes in {} sectors",
                local_x, local_z, length, sectors
            )));
        }
        let compression = self.file.read_u8()?;
        let mut compressed = vec![0u8; length - 1];
        self.file.read_exact(&mut compressed)?;

        let data = decompress(compression, &compressed)?;
        let (_, tag) = Tag::read(&mut Cursor::new(data))?;
        Ok(Some(tag))
    }

    /// Seconds since the epoch of the last write to the slot, 0 if never written.
    pub fn timestamp(&self, local_x: i32, local_z: i32) -> u32 {
        self.timestamps[header_index(local_x, local_z)]
    }

    pub fn chunk_count(&self) -> usize {
        self.locations.iter().filter(|&&l| l != 0).count()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

impl Drop for RegionFile {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log(format!("Failed to flush region {}: {}", self.path.display(), e), Warning);
        }
    }
}

fn decompress(compression: u8, compressed: &[u8]) -> Result<Vec<u8>> {
    let reader: Box<dyn Read + '_> = match compression {
        COMPRESSION_GZIP => Box::new(GzDecoder::new(compressed)),
        COMPRESSION_ZLIB => Box::new(ZlibDecoder::new(compressed)),
        COMPRESSION_NONE => Box::new(compressed),
        other => {
            return Err(WorldError::CompressionError(format!(
                "unknown compression type {}",
                other
            )))
        }
    };

    let mut data = Vec::with_capacity(compressed.len() * 4);
    reader
        .take(MAX_DECOMPRESSED + 1)
        .read_to_end(&mut data)
        .map_err(compression_error)?;
    if data.len() as u64 > MAX_DECOMPRESSED {
        return Err(WorldError::CompressionError(format!(
            "chunk inflates past {} bytes",
            MAX_DECOMPRESSED
        )));
    }
    Ok(data)
}
