use crate::error::{Result, WorldError};
use crate::exporter::ExportOptions;
use crate::logger::{log, LogSeverity, LogSeverity::*};
use crate::region::SectorAllocation;
use crate::serializer::PackingMode;
use crate::world::BlockPos;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "worldsave.json";

/// Settings for saving bot worlds. Every field is optional in the JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaverConfig {
    /// One world per server lives below this directory.
    pub world_saves_dir: PathBuf,
    /// Where registry caches are kept.
    pub cache_dir: PathBuf,
    pub spawn: BlockPos,
    pub packing: PackingMode,
    pub sector_allocation: SectorAllocation,
    pub create_player_data: bool,
    pub log_level: LogSeverity,
}

impl Default for SaverConfig {
    fn default() -> Self {
        Self {
            world_saves_dir: PathBuf::from("worlds"),
            cache_dir: PathBuf::from("cache"),
            spawn: BlockPos::new(0, 80, 0),
            packing: PackingMode::Padded,
            sector_allocation: SectorAllocation::AppendOnly,
            create_player_data: true,
            log_level: LogSeverity::Info,
        }
    }
}

impl SaverConfig {
    /// Reads `path`, falling back to defaults when it doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => {
                let config = serde_json::from_str(&text).map_err(|e| {
                    WorldError::ConfigError(format!("{}: {}", path.display(), e))
                })?;
                log(format!("Loaded config from {}", path.display()), Debug);
                Ok(config)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log(
                    format!("No config at {}, using defaults", path.display()),
                    Info,
                );
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            packing: self.packing,
            sector_allocation: self.sector_allocation,
            create_player_data: self.create_player_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = SaverConfig::load(dir.path().join("nope.json")).unwrap();
        assert_eq!(config, SaverConfig::default());
        assert_eq!(config.spawn, BlockPos::new(0, 80, 0));
    }

    #[test]
    fn test_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("worldsave.json");
        fs::write(
            &path,
            r#"{ "world_saves_dir": "saves", "packing": "compact", "sector_allocation": "first_fit", "log_level": "warning" }"#,
        )
        .unwrap();

        let config = SaverConfig::load(&path).unwrap();
        assert_eq!(config.world_saves_dir, PathBuf::from("saves"));
        assert_eq!(config.packing, PackingMode::Compact);
        assert_eq!(config.sector_allocation, SectorAllocation::FirstFit);
        assert_eq!(config.log_level, LogSeverity::Warning);
        assert_eq!(config.cache_dir, PathBuf::from("cache"));
        assert!(config.export_options().create_player_data);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("worldsave.json");
        let config = SaverConfig {
            spawn: BlockPos::new(100, 64, -20),
            create_player_data: false,
            ..SaverConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(SaverConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("worldsave.json");
        fs::write(&path, "{ not json").unwrap();
        assert_matches!(SaverConfig::load(&path), Err(WorldError::ConfigError(_)));

        fs::write(&path, r#"{ "packing": "sideways" }"#).unwrap();
        assert_matches!(SaverConfig::load(&path), Err(WorldError::ConfigError(_)));
    }
}
