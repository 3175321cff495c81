// SPDX-License-Identifier: Apache-2.0
use sqlx::{Row, Error, Executor, SqlitePool};
use sqlx::sqlite::SqliteRow;
use crate::models::records::{RevisionRecord, TagRecord};
use crate::registry::digest::Digest;

/// Return the manifest bound to the specific container image name and tag
const MANIFEST_FOR_TAG:&str = "SELECT name, tag, reference, size, mime FROM tags WHERE name = $1 AND tag = $2;";

/// Upsert a record in the tags table, the last write wins
const TAG_UPSERT_QUERY: &str = "INSERT INTO tags (name, tag, reference, size, mime) VALUES ($1, $2, $3, $4, $5) ON CONFLICT(name, tag) DO UPDATE SET reference=EXCLUDED.reference, size=EXCLUDED.size, mime=EXCLUDED.mime;";

/// Return a manifest revision of the repository
const REVISION_FOR_DIGEST:&str = "SELECT name, reference, size, mime FROM revisions WHERE name = $1 AND reference = $2;";

/// Record a manifest revision, recording it twice keeps the latest media type
const REVISION_UPSERT_QUERY: &str = "INSERT INTO revisions (name, reference, size, mime) VALUES ($1, $2, $3, $4) ON CONFLICT(name, reference) DO UPDATE SET size=EXCLUDED.size, mime=EXCLUDED.mime;";

#[cfg(test)]
const TAGS_DELETE_ALL:&str = "DELETE FROM tags;";
#[cfg(test)]
const REVISIONS_DELETE_ALL:&str = "DELETE FROM revisions;";

/// Create the index tables
const MANIFESTS_TABLES:&str = r#"
-- CREATORS
CREATE TABLE IF NOT EXISTS tags (
name             TEXT NOT NULL,
tag              TEXT NOT NULL,
reference        TEXT NOT NULL,
size             INTEGER NOT NULL,
mime             TEXT NOT NULL,
PRIMARY KEY(name, tag)
);

CREATE INDEX IF NOT EXISTS tags_name_ids ON tags(name);
CREATE INDEX IF NOT EXISTS tags_reference_ids ON tags(reference);

CREATE TABLE IF NOT EXISTS revisions (
name             TEXT NOT NULL,
reference        TEXT NOT NULL,
size             INTEGER NOT NULL,
mime             TEXT NOT NULL,
PRIMARY KEY(name, reference)
);

CREATE INDEX IF NOT EXISTS revisions_reference_ids ON revisions(reference);

"#;

/// Database Manifests Helper
pub struct DBManifests;

impl DBManifests {

    /// Parse a tags row
    fn parse_tag(row: SqliteRow) -> TagRecord {
        let parsed_digest = Digest::parse(row.get(2)).ok();
        TagRecord::new(row.get(0), row.get(1),
                       parsed_digest, row.get(3),
                       row.get(4))
    }

    /// Parse a revisions row
    fn parse_revision(row: SqliteRow) -> RevisionRecord {
        let parsed_digest = Digest::parse(row.get(1)).ok();
        RevisionRecord::new(row.get(0), parsed_digest,
                            row.get(2), row.get(3))
    }

    /// Creates the database tables
    pub async fn create_tables(pool: &SqlitePool) -> Result<(), Error> {
        pool.execute(MANIFESTS_TABLES).await?;
        Ok(())
    }

    /// Return an optional tag record
    pub async fn manifest_for_tag(pool: &SqlitePool, name: &str, tag: &str) -> Result<Option<TagRecord>, Error> {

        sqlx::query(MANIFEST_FOR_TAG)
            .bind(name)
            .bind(tag)
            .map(|row: SqliteRow| {
                DBManifests::parse_tag(row)
            })
            .fetch_optional(pool).await

    }

    /// Return an optional revision record
    pub async fn revision(pool: &SqlitePool, name: &str, reference: &Digest) -> Result<Option<RevisionRecord>, Error> {

        sqlx::query(REVISION_FOR_DIGEST)
            .bind(name)
            .bind(reference.to_string())
            .map(|row: SqliteRow| {
                DBManifests::parse_revision(row)
            })
            .fetch_optional(pool).await

    }

    /// Upsert a tag binding
    pub async fn upsert_tag(pool: &SqlitePool, name: &str, tag: &str, reference: &Digest, size: i64, mime: &str) -> Result<u64, Error> {

        let digest = reference.to_string();

        let query = sqlx::query(TAG_UPSERT_QUERY)
            .bind(name)
            .bind(tag)
            .bind(digest)
            .bind(size)
            .bind(mime);

        Ok(query.execute(pool).await?.rows_affected())
    }

    /// Upsert a manifest revision
    pub async fn upsert_revision(pool: &SqlitePool, name: &str, reference: &Digest, size: i64, mime: &str) -> Result<u64, Error> {

        let query = sqlx::query(REVISION_UPSERT_QUERY)
            .bind(name)
            .bind(reference.to_string())
            .bind(size)
            .bind(mime);

        Ok(query.execute(pool).await?.rows_affected())
    }

    /// Delete all records (used for testing purposes only)
    #[cfg(test)]
    pub async fn delete_all(pool: &SqlitePool) -> Result<u64, Error> {

        let tags = sqlx::query(TAGS_DELETE_ALL).execute(pool)
            .await?.rows_affected();
        let revisions = sqlx::query(REVISIONS_DELETE_ALL).execute(pool)
            .await?.rows_affected();

        Ok(tags + revisions)

    }
}

#[cfg(test)]
mod test {
    use crate::db::db_manifests::DBManifests;
    use crate::db::pool::DBPool;
    use crate::registry::digest::Digest;

    #[tokio::test]
    async fn db_tags_test() {

        // Get an in memory database
        let pool = DBPool::memory().await.expect("Failed to create the database");

        let name = String::from("nvidia/cuda");
        let tag = String::from("12.2.0-devel-ubuntu20.04");
        let digest = Digest::parse("sha256:c1d07892979445e720a5cf1f5abe6a910f45c6d638bf9997d6a807924eee5190").expect("Failed to parse digest");
        let updated_digest = Digest::parse("sha256:77c8fe4188129f39831d01bd626696d8bbff5831180eb8061041181e1b1d17a0").expect("Failed to parse updated digest");
        let mime = "application/vnd.docker.distribution.manifest.v2+json";
        let size = 5117;

        DBManifests::delete_all(&pool).await.expect("Failed to truncate the index");

        // add a a new record
        let total = DBManifests::upsert_tag(&pool, &name, &tag, &digest, size, mime).await.expect("Failed to upsert tag record");
        assert_eq!(1, total);

        // get the manifest for the name and tag
        let manifest = DBManifests::manifest_for_tag(&pool, &name, &tag).await
            .expect("Failed to get manifest for image")
            .expect("tag should be bound");
        assert_eq!(name, manifest.name);
        assert_eq!(tag, manifest.tag);
        assert_eq!(Some(digest.clone()), manifest.reference);
        assert_eq!(size, manifest.size);
        assert_eq!(mime, manifest.mime);

        // Rebind the tag
        let total = DBManifests::upsert_tag(&pool, &name, &tag, &updated_digest, 42, mime).await.expect("Failed to update tag");
        assert_eq!(1, total);

        let manifest = DBManifests::manifest_for_tag(&pool, &name, &tag).await
            .expect("Failed to get manifest for image")
            .expect("tag should be bound");
        assert_eq!(Some(updated_digest), manifest.reference);
        assert_eq!(42, manifest.size);

        // Tags are per repository
        assert!(DBManifests::manifest_for_tag(&pool, "nvidia/other", &tag).await.expect("query").is_none());
    }

    #[tokio::test]
    async fn db_revisions_test() {
        let pool = DBPool::memory().await.expect("Failed to create the database");

        let digest = Digest::compute(b"{}");
        let mime = "application/vnd.oci.image.manifest.v1+json";

        assert!(DBManifests::revision(&pool, "library/alpine", &digest).await.expect("query").is_none());

        DBManifests::upsert_revision(&pool, "library/alpine", &digest, 2, mime).await.expect("Failed to record revision");
        DBManifests::upsert_revision(&pool, "library/alpine", &digest, 2, mime).await.expect("recording twice is fine");

        let revision = DBManifests::revision(&pool, "library/alpine", &digest).await
            .expect("query")
            .expect("revision recorded");
        assert_eq!(Some(digest.clone()), revision.reference);
        assert_eq!(mime, revision.mime);

        assert!(DBManifests::revision(&pool, "library/nginx", &digest).await.expect("query").is_none());
    }
}
