// SPDX-License-Identifier: Apache-2.0
use sqlx::{Executor, SqlitePool};
use sqlx::sqlite::SqlitePoolOptions;
use crate::config::db::DBConfig;
use crate::db::db_manifests::DBManifests;
use crate::error::registry::RegistryError;

/// Database Pool
pub struct DBPool;

impl DBPool {

    /// Create a new DB Pool from the DBConfig parameter
    pub async fn from_config(config: &DBConfig) -> Result<SqlitePool, RegistryError> {
        // Build the pool from the config file
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(config.max_connections)
            .connect(&config.uri)
            .await
            .map_err(|e| RegistryError::from(e).with_context(format!("Failed to open the index database {}", config.uri)))?;

        // in memory databases do not support WAL
        if !config.uri.contains(":memory:") {
            pool.execute("PRAGMA journal_mode=WAL;").await?;
        }
        pool.execute("PRAGMA cache_size=10000;").await?;

        // Create the tables
        DBManifests::create_tables(&pool).await?;

        Ok(pool)
    }

    /// Single connection in memory database, every connection would see its own database
    pub async fn memory() -> Result<SqlitePool, RegistryError> {
        DBPool::from_config(&DBConfig::default()).await
    }
}
