//! Fixed-width index packing into `i64` words.

use crate::error::{Result, WorldError};
use serde::{Deserialize, Serialize};

/// Width vanilla switches to once a palette no longer fits in 8 bits.
pub const DIRECT_BITS: u32 = 15;

/// How palette indices are laid out across 64-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackingMode {
    /// `64 / bits` values per word, leftover high bits unused. Read by 1.16+.
    #[default]
    Padded,
    /// Values packed back to back and allowed to straddle two words.
    Compact,
}

/// Bits per entry for a block-state palette of `palette_len` entries:
/// at least 4, and 15 (or wider, for enormous palettes) once 8 is exceeded.
pub fn bits_for_palette(palette_len: usize) -> u32 {
    let needed = ceil_log2(palette_len);
    match needed.max(4) {
        bits if bits <= 8 => bits,
        bits => bits.max(DIRECT_BITS),
    }
}

fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

fn mask(bits: u32) -> u64 {
    (1u64 << bits) - 1
}

/// Number of words `count` values of `bits` occupy.
pub fn packed_len(count: usize, bits: u32, mode: PackingMode) -> usize {
    let bits = bits as usize;
    match mode {
        PackingMode::Padded => {
            let per_long = 64 / bits;
            (count + per_long - 1) / per_long
        }
        PackingMode::Compact => (count * bits + 63) / 64,
    }
}

/// Packs `values`, keeping only the low `bits` of each.
pub fn pack(values: &[u32], bits: u32, mode: PackingMode) -> Vec<i64> {
    debug_assert!((1..=32).contains(&bits));
    let mut words = vec![0u64; packed_len(values.len(), bits, mode)];
    let mask = mask(bits);

    match mode {
        PackingMode::Padded => {
            let per_long = (64 / bits) as usize;
            for (i, &value) in values.iter().enumerate() {
                let offset = (i % per_long) as u32 * bits;
                words[i / per_long] |= (value as u64 & mask) << offset;
            }
        }
        PackingMode::Compact => {
            for (i, &value) in values.iter().enumerate() {
                let bit = i * bits as usize;
                let start_long = bit / 64;
                let start_offset = (bit % 64) as u32;
                let end_long = (bit + bits as usize - 1) / 64;
                let value = value as u64 & mask;

                words[start_long] |= value << start_offset;
                if start_long != end_long {
                    words[end_long] |= value >> (64 - start_offset);
                }
            }
        }
    }

    words.into_iter().map(|w| w as i64).collect()
}

/// Reads `count` values back out of `words`.
pub fn unpack(words: &[i64], bits: u32, count: usize, mode: PackingMode) -> Result<Vec<u32>> {
    let needed = packed_len(count, bits, mode);
    if words.len() < needed {
        return Err(WorldError::FormatError(format!(
            "{} packed words, {} needed for {} values of {} bits",
            words.len(),
            needed,
            count,
            bits
        )));
    }

    let mask = mask(bits);
    let mut values = Vec::with_capacity(count);

    match mode {
        PackingMode::Padded => {
            let per_long = (64 / bits) as usize;
            for i in 0..count {
                let offset = (i % per_long) as u32 * bits;
                values.push(((words[i / per_long] as u64 >> offset) & mask) as u32);
            }
        }
        PackingMode::Compact => {
            for i in 0..count {
                let bit = i * bits as usize;
                let start_long = bit / 64;
                let start_offset = (bit % 64) as u32;
                let end_long = (bit + bits as usize - 1) / 64;

                let mut value = words[start_long] as u64 >> start_offset;
                if start_long != end_long {
                    value |= (words[end_long] as u64) << (64 - start_offset);
                }
                values.push((value & mask) as u32);
            }
        }
    }

    Ok(values)
}
