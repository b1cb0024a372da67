//! World Server
//!
//! Runs the WebSocket server until Ctrl-C, then saves every player.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use world_server::{
    FileStorage, GameServer, MemoryStorage, ServerConfig, StorageBackend, TICK_RATE, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env().context("invalid configuration")?;

    info!("World Server v{}", VERSION);
    info!("Tick Rate: {} Hz", TICK_RATE);

    let storage: Arc<dyn StorageBackend> = match &config.storage_path {
        Some(path) => {
            let storage = FileStorage::open(path)
                .await
                .with_context(|| format!("failed to open storage at {}", path.display()))?;
            info!("Storage: {}", path.display());
            Arc::new(storage)
        }
        None => {
            info!("Storage: in-memory");
            Arc::new(MemoryStorage::new())
        }
    };

    let server = Arc::new(GameServer::new(config, storage));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            signal_server.shutdown();
        }
    });

    server.run().await.context("server failed")?;
    info!("All matches saved, bye");

    Ok(())
}
