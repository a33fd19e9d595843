//! Id/name registries and their on-disk caches.
//!
//! Both caches share a header: magic `u32`, format version `i32`, data version
//! `i32`, record count `u32`, all big-endian. Strings are a `u32` byte length
//! followed by UTF-8.

pub mod block;
pub mod item;

pub use block::BlockRegistry;
pub use item::{ItemInfo, ItemRegistry};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use std::sync::{Mutex, MutexGuard};

pub const FORMAT_VERSION: i32 = 1;

/// Longest string accepted from a cache file.
const MAX_STRING_LEN: u32 = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CacheHeader {
    pub magic: u32,
    pub format_version: i32,
    pub data_version: i32,
    pub count: u32,
}

impl CacheHeader {
    pub fn read<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            magic: reader.read_u32::<BigEndian>()?,
            format_version: reader.read_i32::<BigEndian>()?,
            data_version: reader.read_i32::<BigEndian>()?,
            count: reader.read_u32::<BigEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<BigEndian>(self.magic)?;
        writer.write_i32::<BigEndian>(self.format_version)?;
        writer.write_i32::<BigEndian>(self.data_version)?;
        writer.write_u32::<BigEndian>(self.count)
    }

    /// Why this header can't be used for `expected_version`, if it can't.
    pub fn check(&self, magic: u32, expected_version: i32) -> Option<String> {
        if self.magic != magic {
            return Some(format!("bad magic 0x{:08X}", self.magic));
        }
        if self.format_version != FORMAT_VERSION {
            return Some(format!(
                "unsupported format version {} (expected {})",
                self.format_version, FORMAT_VERSION
            ));
        }
        if self.data_version != expected_version {
            return Some(format!(
                "data version mismatch, expected {} got {}",
                expected_version, self.data_version
            ));
        }
        None
    }
}

pub(crate) fn read_string<R: Read>(reader: &mut R) -> io::Result<String> {
    let len = reader.read_u32::<BigEndian>()?;
    if len > MAX_STRING_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("string of {} bytes in registry cache", len),
        ));
    }
    let mut buf = vec![0; len as usize];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub(crate) fn write_string<W: Write>(writer: &mut W, value: &str) -> io::Result<()> {
    writer.write_u32::<BigEndian>(value.len() as u32)?;
    writer.write_all(value.as_bytes())
}

/// A panicked holder can't leave the maps half-updated in a way readers care
/// about, so poisoning is ignored.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
