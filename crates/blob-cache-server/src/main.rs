//! Blob Cache Server - HTTP front end for the tiered blob cache
//!
//! Serves content-addressed payloads from a bounded RAM tier, backed by an
//! optional filesystem durable tier that several instances may share.

mod config;
mod error;
mod server;
mod types;

use crate::config::Config;
use crate::error::Result;
use crate::server::{start_server, ServerState, SharedState};
use std::sync::Arc;
use tiered_blob_cache::{Cache, ClearWatcher, FsBackend};
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("blob_cache_server=info".parse()?)
        .add_directive("tiered_blob_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Blob Cache Server...");

    // Load configuration from environment
    let config = Config::from_env();
    info!("Port: {}", config.port);
    info!(
        "Max item size: {} KB, max total size: {} MB",
        config.cache.per_item_limit / 1024,
        config.cache.total_limit / (1024 * 1024)
    );
    info!("Max paths: {}", config.cache.path_limit);

    let cache = match &config.durable_dir {
        Some(dir) => {
            info!("Durable dir: {:?}", dir);
            let backend = FsBackend::new(dir);
            backend.init().await?;
            Cache::with_durable(config.cache.clone(), backend)
        }
        None => {
            warn!("CACHE_DURABLE_DIR not set, running without a durable tier");
            Cache::in_memory(config.cache.clone())
        }
    };

    let watcher = ClearWatcher::spawn(&cache);

    // Create shared state
    let state: SharedState = Arc::new(ServerState::new(cache.clone()));

    // Serve until Ctrl-C
    start_server(state, config.port, config.max_body_bytes, shutdown_signal())
        .await?;

    info!("Shutting down");
    if let Some(watcher) = watcher {
        watcher.shutdown().await;
    }
    cache.flush().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
