use crate::error::{Result, WorldError};
use crate::logger::{log, LogSeverity::*};
use crate::registry::{lock, read_string, write_string, CacheHeader, FORMAT_VERSION};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;

/// "ITEM"
pub const ITEM_MAGIC: u32 = 0x4954454D;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub item_id: String,
    pub max_stack_size: i32,
    pub max_damage: i32,
}

#[derive(Debug, Default)]
struct ItemTable {
    data_version: i32,
    items: BTreeMap<String, ItemInfo>,
}

#[derive(Debug)]
pub struct ItemRegistry {
    cache_dir: PathBuf,
    table: Mutex<ItemTable>,
}

impl ItemRegistry {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            table: Mutex::new(ItemTable::default()),
        }
    }

    pub fn cache_path(&self, data_version: i32) -> PathBuf {
        self.cache_dir.join(format!("item_registry_{}.dat", data_version))
    }

    pub fn cache_exists(&self, data_version: i32) -> bool {
        self.cache_path(data_version).is_file()
    }

    /// Same contract as [`BlockRegistry::load_from_cache`](crate::registry::BlockRegistry::load_from_cache).
    pub fn load_from_cache(&self, data_version: i32) -> bool {
        let mut table = lock(&self.table);
        table.data_version = data_version;
        table.items.clear();

        let path = self.cache_path(data_version);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log(
                    format!("Item registry cache not found for data version {}", data_version),
                    Info,
                );
                return false;
            }
            Err(e) => {
                log(format!("Could not open {}: {}", path.display(), e), Warning);
                return false;
            }
        };

        match read_items(&mut BufReader::new(file), data_version) {
            Ok(items) => {
                log(
                    format!(
                        "Loaded item registry for data version {} with {} items",
                        data_version,
                        items.len()
                    ),
                    Success,
                );
                table.items = items;
                true
            }
            Err(e) => {
                log(
                    format!("Ignoring item registry cache {}: {}", path.display(), e),
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
                "cannot save item registry with data version {}",
                table.data_version
            )));
        }

        fs::create_dir_all(&self.cache_dir)?;
        let path = self.cache_path(table.data_version);
        let mut writer = BufWriter::new(File::create(&path)?);

        CacheHeader {
            magic: ITEM_MAGIC,
            format_version: FORMAT_VERSION,
            data_version: table.data_version,
            count: table.items.len() as u32,
        }
        .write(&mut writer)?;
        for info in table.items.values() {
            write_string(&mut writer, &info.item_id)?;
            writer.write_i32::<BigEndian>(info.max_stack_size)?;
            writer.write_i32::<BigEndian>(info.max_damage)?;
        }
        writer.flush()?;

        log(
            format!("Saved item registry to {} with {} items", path.display(), table.items.len()),
            Success,
        );
        Ok(())
    }

    pub fn add_item(&self, item_id: &str, max_stack_size: i32, max_damage: i32) {
        lock(&self.table).items.insert(
            item_id.to_owned(),
            ItemInfo {
                item_id: item_id.to_owned(),
                max_stack_size,
                max_damage,
            },
        );
    }

    pub fn get_item(&self, item_id: &str) -> Option<ItemInfo> {
        lock(&self.table).items.get(item_id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.table).items.len()
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
}

fn read_items<R: io::Read>(reader: &mut R, data_version: i32) -> Result<BTreeMap<String, ItemInfo>> {
    let header = CacheHeader::read(reader)?;
    if let Some(problem) = header.check(ITEM_MAGIC, data_version) {
        return Err(WorldError::FormatError(problem));
    }

    let mut items = BTreeMap::new();
    for _ in 0..header.count {
        let item_id = read_string(reader)?;
        let max_stack_size = reader.read_i32::<BigEndian>()?;
        let max_damage = reader.read_i32::<BigEndian>()?;
        items.insert(
            item_id.clone(),
            ItemInfo {
                item_id,
                max_stack_size,
                max_damage,
            },
        );
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn test_cache_round_trip() {
        let dir = tempdir().unwrap();
        let registry = ItemRegistry::new(dir.path());
        registry.set_data_version(3465);
        registry.add_item("minecraft:diamond_pickaxe", 1, 1561);
        registry.add_item("minecraft:cobblestone", 64, 0);
        registry.save_to_cache().unwrap();

        let loaded = ItemRegistry::new(dir.path());
        assert!(loaded.load_from_cache(3465));
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded.get_item("minecraft:diamond_pickaxe"),
            Some(ItemInfo {
                item_id: "minecraft:diamond_pickaxe".to_owned(),
                max_stack_size: 1,
                max_damage: 1561,
            })
        );
        assert_eq!(loaded.get_item("minecraft:stick"), None);
    }

    #[test]
    fn test_block_cache_is_not_an_item_cache() {
        let dir = tempdir().unwrap();
        let blocks = crate::registry::BlockRegistry::new(dir.path());
        blocks.set_data_version(3465);
        blocks.add_block_state(1, "minecraft:stone");
        blocks.save_to_cache().unwrap();
        fs::copy(blocks.cache_path(3465), dir.path().join("item_registry_3465.dat")).unwrap();

        let items = ItemRegistry::new(dir.path());
        assert!(!items.load_from_cache(3465));
        assert!(items.is_empty());
    }

    #[test]
    fn test_shared_between_threads() {
        let registry = Arc::new(ItemRegistry::new("unused"));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..25 {
                        registry.add_item(&format!("test:item_{}_{}", t, i), 64, 0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 100);
    }
}
