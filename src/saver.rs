use crate::config::SaverConfig;
use crate::exporter::{dimension_dir, MinecraftVersion, WorldExporter};
use crate::logger::{log, LogSeverity::*};
use crate::world::ChunkData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Turns a server address into a single directory name:
/// `127.0.0.1:25565` becomes `127.0.0.1_25565`.
pub fn sanitize_address(address: &str) -> String {
    let name: String = address
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' | '<' | '>' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match name.as_str() {
        "" | "." | ".." => "_".to_owned(),
        _ => name,
    }
}

/// Saves chunks for one server session in the background, one at a time and in
/// the order they were handed in.
pub struct WorldAutoSaver {
    server_address: String,
    world_path: PathBuf,
    initialized: bool,
    sender: Option<UnboundedSender<ChunkData>>,
    worker: Option<JoinHandle<()>>,
    saved: Arc<AtomicUsize>,
}

impl WorldAutoSaver {
    /// Creates the world under `config.world_saves_dir` if it isn't there yet and
    /// starts the save worker. Must be called from inside a Tokio runtime.
    pub fn start(
        config: &SaverConfig,
        exporter: WorldExporter,
        server_address: &str,
        version: MinecraftVersion,
    ) -> Self {
        let world_path = config.world_saves_dir.join(sanitize_address(server_address));
        log(
            format!(
                "Auto saver for {} on {} (data version {}), saving to {}",
                server_address,
                version.name,
                version.data_version,
                world_path.display()
            ),
            Info,
        );

        let initialized = if world_path.exists() {
            log(
                format!("World for {} exists, appending to it", server_address),
                Info,
            );
            true
        } else {
            init_world(&exporter, &world_path, config, server_address, &version)
        };

        let (sender, receiver) = unbounded_channel();
        let saved = Arc::new(AtomicUsize::new(0));
        let worker = tokio::spawn(save_loop(
            receiver,
            Arc::new(exporter),
            world_path.clone(),
            version.data_version,
            Arc::clone(&saved),
        ));

        WorldAutoSaver {
            server_address: server_address.to_owned(),
            world_path,
            initialized,
            sender: Some(sender),
            worker: Some(worker),
            saved,
        }
    }

    /// Queues `chunk` and returns straight away.
    pub fn save_chunk_async(&self, chunk: ChunkData) {
        if !self.initialized {
            log(
                format!(
                    "World for {} isn't initialized, dropping chunk ({}, {})",
                    self.server_address, chunk.chunk_x, chunk.chunk_z
                ),
                Warning,
            );
            return;
        }

        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(rejected) = sender.send(chunk) {
            let chunk = rejected.0;
            log(
                format!(
                    "Save worker for {} is gone, dropping chunk ({}, {})",
                    self.server_address, chunk.chunk_x, chunk.chunk_z
                ),
                Warning,
            );
        }
    }

    /// Stops taking chunks and waits until everything queued is on disk.
    pub async fn shutdown(mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                log(
                    format!("Save worker for {} failed: {}", self.server_address, e),
                    Error,
                );
            }
        }
    }

    pub fn world_path(&self) -> &Path {
        &self.world_path
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Chunks written so far.
    pub fn saved_chunks(&self) -> usize {
        self.saved.load(Ordering::Acquire)
    }
}

fn init_world(
    exporter: &WorldExporter,
    world_path: &Path,
    config: &SaverConfig,
    server_address: &str,
    version: &MinecraftVersion,
) -> bool {
    if let Err(e) = exporter.create_world_directories(world_path) {
        log(
            format!("Failed to create world directories for {}: {}", server_address, e),
            Error,
        );
        return false;
    }
    if let Err(e) = exporter.create_level_dat(world_path, config.spawn, server_address, version) {
        log(format!("Failed to create level.dat for {}: {}", server_address, e), Error);
        return false;
    }

    log(format!("Created new world for {}", server_address), Success);
    true
}

async fn save_loop(
    mut receiver: UnboundedReceiver<ChunkData>,
    exporter: Arc<WorldExporter>,
    world_path: PathBuf,
    data_version: i32,
    saved: Arc<AtomicUsize>,
) {
    while let Some(chunk) = receiver.recv().await {
        let (chunk_x, chunk_z) = (chunk.chunk_x, chunk.chunk_z);
        let Some(output) = dimension_dir(&world_path, &chunk.dimension) else {
            log(
                format!(
                    "Cannot save chunk ({}, {}) with unknown dimension {}",
                    chunk_x, chunk_z, chunk.dimension
                ),
                Warning,
            );
            continue;
        };
        let exporter = Arc::clone(&exporter);

        let result = tokio::task::spawn_blocking(move || {
            exporter.export_chunk(&chunk, &output, data_version)
        })
        .await;

        match result {
            Ok(Ok(())) => {
                saved.fetch_add(1, Ordering::AcqRel);
                log(format!("Saved chunk ({}, {})", chunk_x, chunk_z), Debug);
            }
            Ok(Err(e)) => log(
                format!("Failed to save chunk ({}, {}): {}", chunk_x, chunk_z, e),
                Error,
            ),
            Err(e) => log(
                format!("Save of chunk ({}, {}) panicked: {}", chunk_x, chunk_z, e),
                Error,
            ),
        }
    }
}
