// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use crate::config::app::AppConfig;
use crate::db::db_health::DBHealth;
use crate::db::pool::DBPool;
use crate::driver::filesystem::FilesystemStorage;
use crate::error::registry::RegistryError;
use crate::handlers::command::cache::persist::CachePersistHandler;
use crate::models::commands::{CACHE_BLOB, CACHE_MANIFEST};
use crate::pubsub::command_bus::CommandBus;
use crate::services::manifests::ManifestService;
use crate::storage::blobs::BlobStore;

mod api;
mod auth;
mod config;
mod db;
mod driver;
mod error;
mod handlers;
mod metrics;
mod models;
mod proxy;
mod pubsub;
mod registry;
mod services;
mod storage;

#[tokio::main]
async fn main() -> Result<(), RegistryError> {

    // Logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "registry_adapter=info,actix_web=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Get access to the config
    let config = AppConfig::load()?;
    if !config.is_valid() {
        tracing::error!("invalid config.yaml");
        return Ok(());
    }

    // Init the command bus
    let command_bus = CommandBus::spawn(4096);

    // Tag index
    let pool = DBPool::from_config(&config.db()).await?;
    DBHealth::health(&pool).await?;

    // Blob and manifest stores
    let blobs = BlobStore::new(Arc::new(FilesystemStorage::new(&config.storage)));
    let manifests = ManifestService::new(pool, blobs.clone());
    spawn_upload_expiry(blobs.clone(), config.storage.upload_expiry());

    // Subscribe the persistence handler of the pull-through cache
    let cache_handler = CachePersistHandler::new(blobs.clone(), manifests.clone());
    command_bus.subscribe(CACHE_BLOB, cache_handler.clone()).await;
    command_bus.subscribe(CACHE_MANIFEST, cache_handler).await;

    // Start the API server
    if let Err(e) = api::server::start(config, command_bus, blobs, manifests).await {
        e.log();
        return Err(e);
    }

    tracing::info!("Shutdown completed");

    Ok(())
}

/// Periodically close the upload sessions clients abandoned
fn spawn_upload_expiry(blobs: BlobStore, max_age: Duration) {
    let period = max_age.clamp(Duration::from_secs(1), Duration::from_secs(60 * 60));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            match blobs.expire_uploads(max_age).await {
                Ok(0) => {}
                Ok(expired) => tracing::info!("Expired {} abandoned upload sessions", expired),
                Err(e) => e.log(),
            }
        }
    });
}
