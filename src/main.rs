use std::env;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use worldsave::config::{SaverConfig, DEFAULT_CONFIG_FILE};
use worldsave::exporter::dimension_dir;
use worldsave::logger::{self, log, LogSeverity::*};
use worldsave::nbt::{NbtFile, Tag};
use worldsave::region::{RegionFile, CHUNKS_PER_REGION};
use worldsave::{NbtSerializer, Result};

const USAGE: &str = "usage: worldsave [--config <file>] <world dir> [<chunk x> <chunk z> [<dimension>]]";

fn main() -> ExitCode {
    let mut args: Vec<String> = env::args().skip(1).collect();

    let mut config_path = PathBuf::from(DEFAULT_CONFIG_FILE);
    if let Some(at) = args.iter().position(|a| a == "--config") {
        if at + 1 >= args.len() {
            eprintln!("{}", USAGE);
            return ExitCode::FAILURE;
        }
        config_path = PathBuf::from(args.remove(at + 1));
        args.remove(at);
    }

    let config = match SaverConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            log(format!("{}", e), Fatal);
            return ExitCode::FAILURE;
        }
    };
    logger::init(config.log_level);

    let result = match args.as_slice() {
        [world] => summarize_world(Path::new(world)),
        [world, x, z, rest @ ..] if rest.len() <= 1 => {
            let (Ok(x), Ok(z)) = (x.parse::<i32>(), z.parse::<i32>()) else {
                eprintln!("{}", USAGE);
                return ExitCode::FAILURE;
            };
            let dimension = rest.first().map_or("minecraft:overworld", String::as_str);
            describe_chunk(Path::new(world), x, z, dimension, &config)
        }
        _ => {
            eprintln!("{}", USAGE);
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log(format!("{}", e), Error);
            ExitCode::FAILURE
        }
    }
}

fn summarize_world(world: &Path) -> Result<()> {
    let level = NbtFile::read_gzip(File::open(world.join("level.dat"))?)?;
    if let Some(data) = level.root.get("Data") {
        let name = data.get("LevelName").and_then(Tag::as_string).cloned().unwrap_or_default();
        let version = data.get("DataVersion").and_then(Tag::as_i32).unwrap_or_default();
        let spawn: Vec<i32> = ["SpawnX", "SpawnY", "SpawnZ"]
            .iter()
            .map(|key| data.get(key).and_then(Tag::as_i32).unwrap_or_default())
            .collect();
        println!("{} (data version {}), spawn {:?}", name, version, spawn);
    }

    for dimension in ["minecraft:overworld", "minecraft:the_nether", "minecraft:the_end"] {
        let Some(dir) = dimension_dir(world, dimension) else {
            continue;
        };
        let region_dir = dir.join("region");
        let Ok(entries) = fs::read_dir(&region_dir) else {
            continue;
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "mca"))
            .collect();
        files.sort();

        let mut total = 0;
        for path in &files {
            let region = match RegionFile::open_read_only(path) {
                Ok(region) => region,
                Err(e) => {
                    log(format!("Skipping {}: {}", path.display(), e), Warning);
                    continue;
                }
            };
            let newest = (0..CHUNKS_PER_REGION as i32)
                .map(|i| region.timestamp(i % 32, i / 32))
                .max()
                .unwrap_or_default();
            total += region.chunk_count();
            println!(
                "  {} {}: {} chunks, last write {}",
                dimension,
                path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
                region.chunk_count(),
                newest
            );
        }
        if !files.is_empty() {
            println!("{}: {} chunks in {} region files", dimension, total, files.len());
        }
    }
    Ok(())
}

fn describe_chunk(world: &Path, x: i32, z: i32, dimension: &str, config: &SaverConfig) -> Result<()> {
    let Some(dir) = dimension_dir(world, dimension) else {
        log(format!("Unknown dimension {}", dimension), Warning);
        return Ok(());
    };
    let path = dir.join("region").join(format!("r.{}.{}.mca", x >> 5, z >> 5));
    if !path.is_file() {
        log(format!("Chunk ({}, {}) isn't saved, {} is missing", x, z, path.display()), Warning);
        return Ok(());
    }
    let mut region = RegionFile::open_read_only(&path)?;

    let Some(tag) = region.read_chunk(x & 31, z & 31)? else {
        log(format!("Chunk ({}, {}) isn't saved in {}", x, z, path.display()), Warning);
        return Ok(());
    };

    let chunk = NbtSerializer::new(config.packing).nbt_to_chunk(&tag, dimension)?;
    println!(
        "chunk ({}, {}) in {}: {} sections",
        chunk.chunk_x,
        chunk.chunk_z,
        dimension,
        chunk.section_count()
    );
    for (index, section) in &chunk.sections {
        let first = section.palette.first().map(String::as_str).unwrap_or_default();
        println!(
            "  section {:>3}: {:>4} palette entries{} ({}...)",
            chunk.section_base() + index,
            section.palette.len(),
            if section.uniform { ", uniform" } else { "" },
            first
        );
    }
    Ok(())
}
