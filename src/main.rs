// SPDX-License-Identifier: GPL-3.0-only
mod album;
mod api;
mod cache;
mod config;
mod downloader;
mod logging;
mod search;
mod store;

#[cfg(test)]
mod test_helpers;

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use album::AlbumSync;
use api::{ApiHandlers, HttpServer};
use cache::ImageCache;
use config::Config;
use downloader::HttpClient;
use logging::setup_logging;
use search::{FlickrClient, SearchSettings};
use store::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    setup_logging(&config.log_level, config.log_format)?;

    info!("Starting VirtualTouristDaemon v{}", env!("CARGO_PKG_VERSION"));

    if config.search_api_key.is_empty() {
        warn!("No search API key configured; photo searches will be rejected");
    }

    // Initialize image cache and store
    let cache = ImageCache::new(config.image_cache_dir.clone()).await?;
    info!(dir = %cache.dir().display(), "Image cache initialized");

    let store = Arc::new(SqliteStore::new(&config.database_path, cache.clone()).await?);
    info!("Store initialized at {}", config.database_path.display());

    // Initialize remote clients
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let search = Arc::new(FlickrClient::new(
        config.search_api_url.clone(),
        SearchSettings::from_config(&config),
        timeout,
    )?);
    let downloader = Arc::new(HttpClient::new(timeout)?.with_max_retries(config.download_max_retries));

    let album = Arc::new(
        AlbumSync::new(store.clone(), store.clone(), search, downloader, cache)
            .with_album_limit(config.photos_per_page as usize),
    );

    // Start HTTP server
    let http_server = HttpServer::new(ApiHandlers::new(album, store), config.local_api_bind);
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.serve().await {
            error!(error = %e, "HTTP server error");
        }
    });

    info!("All services started. Waiting for shutdown signal...");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal (Ctrl+C)");
        }
        Err(err) => {
            error!(error = %err, "Unable to listen for shutdown signal");
        }
    }

    info!("Initiating graceful shutdown...");
    http_task.abort();

    info!("Shutdown complete");
    Ok(())
}
