use crate::error::{Result, WorldError};
use crate::logger::{log, LogSeverity::*};
use crate::registry::{lock, read_string, write_string, CacheHeader, FORMAT_VERSION};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// "BLKR"
pub const BLOCK_MAGIC: u32 = 0x424C4B52;

#[derive(Debug, Default)]
struct BlockTable {
    data_version: i32,
    id_to_state: BTreeMap<u32, String>,
}

/// Global block state id to canonical state string, e.g.
/// `1 -> "minecraft:stone"`. Safe to share between sessions behind an `Arc`.
#[derive(Debug)]
pub struct BlockRegistry {
    cache_dir: PathBuf,
    table: Mutex<BlockTable>,
}

impl BlockRegistry {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            table: Mutex::new(BlockTable::default()),
        }
    }

    pub fn cache_path(&self, data_version: i32) -> PathBuf {
        self.cache_dir
            .join(format!("block_registry_{}.dat", data_version))
    }

    pub fn cache_exists(&self, data_version: i32) -> bool {
        self.cache_path(data_version).is_file()
    }

    /// Replaces the table with the cached one for `data_version`. On any failure
    /// the table is left empty and `false` is returned; the requested version is
    /// kept either way so a later [`save_to_cache`](Self::save_to_cache) writes
    /// under it.
    pub fn load_from_cache(&self, data_version: i32) -> bool {
        let mut table = lock(&self.table);
        table.data_version = data_version;
        table.id_to_state.clear();

        let path = self.cache_path(data_version);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log(
                    format!("Block registry cache not found for data version {}", data_version),
                    Info,
                );
                return false;
            }
            Err(e) => {
                log(format!("Could not open {}: {}", path.display(), e), Warning);
                return false;
            }
        };

        match read_table(&mut BufReader::new(file), data_version) {
            Ok(states) => {
                log(
                    format!(
                        "Loaded block registry for data version {} with {} states",
                        data_version,
                        states.len()
                    ),
                    Success,
                );
                table.id_to_state = states;
                true
            }
            Err(e) => {
                log(
                    format!("Ignoring block registry cache {}: {}", path.display(), e),
                    Warning,
                );
                false
            }
        }
    }

    pub fn save_to_cache(&self) -> Result<()> {
        let table = lock(&self.table);
        if table.data_version <= 0 {
            return Err(WorldError::FormatError(format!(
                "cannot save block registry with data version {}",
                table.data_version
            )));
        }

        fs::create_dir_all(&self.cache_dir)?;
        let path = self.cache_path(table.data_version);
        let mut writer = BufWriter::new(File::create(&path)?);

        CacheHeader {
            magic: BLOCK_MAGIC,
            format_version: FORMAT_VERSION,
            data_version: table.data_version,
            count: table.id_to_state.len() as u32,
        }
        .write(&mut writer)?;
        for (id, state) in &table.id_to_state {
            writer.write_u32::<BigEndian>(*id)?;
            write_string(&mut writer, state)?;
        }
        writer.flush()?;

        log(
            format!(
                "Saved block registry to {} with {} states",
                path.display(),
                table.id_to_state.len()
            ),
            Success,
        );
        Ok(())
    }

    pub fn add_block_state(&self, id: u32, state: &str) {
        lock(&self.table).id_to_state.insert(id, state.to_owned());
    }

    pub fn get_block_state(&self, id: u32) -> Option<String> {
        lock(&self.table).id_to_state.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.table).id_to_state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_loaded(&self) -> bool {
        !self.is_empty()
    }

    pub fn data_version(&self) -> i32 {
        lock(&self.table).data_version
    }

    pub fn set_data_version(&self, data_version: i32) {
        lock(&self.table).data_version = data_version;
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

fn read_table<R: io::Read>(reader: &mut R, data_version: i32) -> Result<BTreeMap<u32, String>> {
    let header = CacheHeader::read(reader)?;
    if let Some(problem) = header.check(BLOCK_MAGIC, data_version) {
        return Err(WorldError::FormatError(problem));
    }

    let mut states = BTreeMap::new();
    for _ in 0..header.count {
        let id = reader.read_u32::<BigEndian>()?;
        let state = read_string(reader)?;
        states.insert(id, state);
    }
    Ok(states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    #[test]
    fn test_cache_round_trip() {
        let dir = tempdir().unwrap();
        let registry = BlockRegistry::new(dir.path());
        registry.set_data_version(3465);
        registry.add_block_state(0, "minecraft:air");
        registry.add_block_state(1, "minecraft:stone");
        registry.add_block_state(2, "minecraft:granite");
        registry.save_to_cache().unwrap();
        assert!(registry.cache_exists(3465));

        let loaded = BlockRegistry::new(dir.path());
        assert!(loaded.load_from_cache(3465));
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.get_block_state(1).as_deref(), Some("minecraft:stone"));
        assert_eq!(loaded.get_block_state(3), None);
        assert_eq!(loaded.data_version(), 3465);
    }

    #[test]
    fn test_missing_cache() {
        let dir = tempdir().unwrap();
        let registry = BlockRegistry::new(dir.path());
        assert!(!registry.load_from_cache(3465));
        assert!(!registry.is_loaded());
        assert_eq!(registry.data_version(), 3465);
    }

    #[test]
    fn test_bad_magic_leaves_registry_empty() {
        let dir = tempdir().unwrap();
        let registry = BlockRegistry::new(dir.path());
        registry.set_data_version(3465);
        registry.add_block_state(1, "minecraft:stone");
        registry.save_to_cache().unwrap();

        let path = registry.cache_path(3465);
        let mut bytes = fs::read(&path).unwrap();
        bytes[0] = 0;
        fs::write(&path, bytes).unwrap();

        assert!(!registry.load_from_cache(3465));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_truncated_cache_leaves_registry_empty() {
        let dir = tempdir().unwrap();
        let registry = BlockRegistry::new(dir.path());
        registry.set_data_version(3465);
        for id in 0..10 {
            registry.add_block_state(id, "minecraft:stone");
        }
        registry.save_to_cache().unwrap();

        let path = registry.cache_path(3465);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

        assert!(!registry.load_from_cache(3465));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let registry = BlockRegistry::new(dir.path());
        registry.set_data_version(3465);
        registry.add_block_state(1, "minecraft:stone");
        registry.save_to_cache().unwrap();
        fs::rename(registry.cache_path(3465), registry.cache_path(3700)).unwrap();

        assert!(!registry.load_from_cache(3700));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_save_without_version_fails() {
        let dir = tempdir().unwrap();
        let registry = BlockRegistry::new(dir.path());
        registry.add_block_state(1, "minecraft:stone");
        assert_matches!(registry.save_to_cache(), Err(WorldError::FormatError(_)));
    }
}
