// SPDX-License-Identifier: Apache-2.0
use sqlx::SqlitePool;
use crate::error::error_kind::ErrorKind;
use crate::error::registry::RegistryError;

// Both index tables answer
const HEALTH:&str = "SELECT (SELECT count(*) FROM tags) + (SELECT count(*) FROM revisions);";

pub struct DBHealth;

impl DBHealth {

    /// Check the index is reachable and its schema is in place
    pub async fn health(pool: &SqlitePool) -> Result<i64, RegistryError> {
        let entries: i64 = sqlx::query_scalar(HEALTH).fetch_one(pool).await.map_err(|e| {
            RegistryError::new(ErrorKind::SQLError)
                .with_context("the manifest index is not usable")
                .with_error(e.to_string())
        })?;

        tracing::info!("Manifest index holds {} entries", entries);
        Ok(entries)
    }
}

#[cfg(test)]
mod test {
    use sqlx::SqlitePool;
    use crate::db::db_manifests::DBManifests;
    use crate::db::pool::DBPool;
    use crate::error::error_kind::ErrorKind;
    use crate::registry::digest::Digest;

    #[tokio::test]
    async fn db_health_test() {
        let pool = DBPool::memory().await.expect("Failed to create the database");
        assert_eq!(0, super::DBHealth::health(&pool).await.expect("healthy"));

        let digest = Digest::compute(b"manifest");
        DBManifests::upsert_revision(&pool, "my-alpine", &digest, 8, "application/json").await.expect("revision");
        DBManifests::upsert_tag(&pool, "my-alpine", "1", &digest, 8, "application/json").await.expect("tag");
        assert_eq!(2, super::DBHealth::health(&pool).await.expect("healthy"));
    }

    #[tokio::test]
    async fn missing_schema_test() {
        let pool = SqlitePool::connect("sqlite::memory:").await.expect("pool");
        let err = super::DBHealth::health(&pool).await.expect_err("no tables");
        assert_eq!(ErrorKind::SQLError, err.kind);
    }
}
