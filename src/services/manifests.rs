// SPDX-License-Identifier: Apache-2.0
use std::fmt::Display;
use std::sync::Arc;
use bytes::Bytes;
use futures_util::Stream;
use serde_json::json;
use sqlx::SqlitePool;
use crate::db::db_manifests::DBManifests;
use crate::error::error_kind::ErrorKind;
use crate::error::registry::RegistryError;
use crate::metrics;
use crate::registry::digest::Digest;
use crate::registry::manifest::Manifest;
use crate::registry::reference::ManifestRef;
use crate::registry::repository::RepoName;
use crate::storage::blobs::BlobStore;

/// Resolves manifest references of a repository and keeps the tag index consistent with the blobs
pub struct ManifestService {
    pool: SqlitePool,
    blobs: BlobStore,
}

impl ManifestService {
    pub fn new(pool: SqlitePool, blobs: BlobStore) -> Arc<ManifestService> {
        Arc::new(ManifestService {
            pool,
            blobs,
        })
    }

    /// The manifest a reference points to, None when the tag is unbound or the digest
    /// is not a revision of the repository
    pub async fn get(&self, name: &RepoName, reference: &ManifestRef) -> Result<Option<Manifest>, RegistryError> {
        let (digest, mime) = match self.resolve(name, reference).await? {
            Some(resolved) => resolved,
            None => return Ok(None),
        };

        match self.blobs.read(&digest).await {
            Ok(content) => Ok(Some(Manifest::stored(digest, mime, content))),
            Err(e) if e.kind == ErrorKind::RegistryBlobUnknown => {
                tracing::warn!("Manifest {} of {} is indexed but its content is gone", digest, name);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Whether the reference currently resolves to a manifest
    pub async fn exists(&self, name: &RepoName, reference: &ManifestRef) -> Result<bool, RegistryError> {
        match self.resolve(name, reference).await? {
            Some((digest, _)) => self.blobs.exists(&digest).await,
            None => Ok(false),
        }
    }

    /// Store a pushed manifest. The content lands in the blob store first, then the revision
    /// and, for a tag reference, the tag binding are recorded.
    pub async fn put<S, E>(&self, name: &RepoName, reference: &ManifestRef, stream: S, content_type: Option<&str>) -> Result<Manifest, RegistryError>
        where
            S: Stream<Item = Result<Bytes, E>>,
            E: Display
    {
        let digest = match reference {
            ManifestRef::Digest(expected) => self.blobs.put_verified(expected, stream).await?,
            ManifestRef::Tag(_) => self.blobs.put(stream).await?,
        };

        let content = self.blobs.read(&digest).await?;
        let manifest = Manifest::parse(digest, content, content_type)?;

        for referenced in manifest.references()? {
            if !self.blobs.exists(&referenced).await? {
                return Err(RegistryError::new(ErrorKind::RegistryManifestBlobUnknown)
                    .with_context("blob unknown to registry")
                    .with_error(format!("{} references {}", manifest.digest(), referenced))
                    .with_detail(json!({"digest": referenced.to_string()})));
            }
        }

        self.record(name, reference, &manifest).await?;
        metrics::STORED_MANIFESTS.inc();

        tracing::info!("Manifest {}:{} stored as {}", name, reference, manifest.digest());
        Ok(manifest)
    }

    /// Persist a manifest fetched from the upstream registry.
    /// Its layers are fetched lazily, so they are not required to be present.
    pub async fn cache(&self, name: &RepoName, reference: &ManifestRef, manifest: &Manifest) -> Result<(), RegistryError> {
        self.blobs.put_verified_bytes(manifest.digest(), manifest.content().clone()).await?;
        self.record(name, reference, manifest).await?;

        tracing::info!("Manifest {}:{} cached as {}", name, reference, manifest.digest());
        Ok(())
    }

    // =============================================================================================
    // Private functions

    async fn resolve(&self, name: &RepoName, reference: &ManifestRef) -> Result<Option<(Digest, String)>, RegistryError> {
        match reference {
            ManifestRef::Tag(tag) => {
                let record = DBManifests::manifest_for_tag(&self.pool, name.as_str(), tag.as_str()).await?;
                Ok(record.and_then(|record| record.reference.map(|digest| (digest, record.mime))))
            }
            ManifestRef::Digest(digest) => {
                let record = DBManifests::revision(&self.pool, name.as_str(), digest).await?;
                Ok(record.map(|record| (digest.clone(), record.mime)))
            }
        }
    }

    /// The revision goes first so a tag never points at an unrecorded revision
    async fn record(&self, name: &RepoName, reference: &ManifestRef, manifest: &Manifest) -> Result<(), RegistryError> {
        let size = manifest.size() as i64;

        DBManifests::upsert_revision(&self.pool, name.as_str(), manifest.digest(), size, manifest.media_type()).await?;

        if let ManifestRef::Tag(tag) = reference {
            DBManifests::upsert_tag(&self.pool, name.as_str(), tag.as_str(), manifest.digest(), size, manifest.media_type()).await?;
        }
        Ok(())
    }
}
