// SPDX-License-Identifier: Apache-2.0
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures_util::{pin_mut, Stream, StreamExt, TryStreamExt};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;
use crate::driver::StorageDriver;
use crate::error::error_kind::ErrorKind;
use crate::error::registry::RegistryError;
use crate::metrics;
use crate::registry::digest::{Digest, DigestHasher};
use crate::storage::layout;

/// Lazy content of a blob
pub type ByteStream = BoxStream<'static, Result<Bytes, RegistryError>>;

/// Content addressable store of immutable blobs
#[derive(Clone)]
pub struct BlobStore {
    driver: Arc<dyn StorageDriver>,
}

impl BlobStore {

    pub fn new(driver: Arc<dyn StorageDriver>) -> BlobStore {
        BlobStore {
            driver
        }
    }

    /// Stores the stream and returns the digest of its content.
    /// Storing content that is already there is a no-op.
    pub async fn put<S, E>(&self, stream: S) -> Result<Digest, RegistryError>
        where
            S: Stream<Item = Result<Bytes, E>>,
            E: Display
    {
        let (staging, digest) = self.stage(stream).await?;
        self.publish(staging, &digest).await?;
        Ok(digest)
    }

    /// Stores the stream only if its content hashes to the expected digest
    pub async fn put_verified<S, E>(&self, expected: &Digest, stream: S) -> Result<Digest, RegistryError>
        where
            S: Stream<Item = Result<Bytes, E>>,
            E: Display
    {
        let (staging, digest) = self.stage(stream).await?;

        if digest != *expected {
            staging.discard().await;
            tracing::warn!("Digest mismatch {} - {}", digest, expected);
            return Err(RegistryError::new(ErrorKind::RegistryDigestInvalid)
                .with_context("provided digest did not match uploaded content")
                .with_error(format!("expected {} got {}", expected, digest))
                .with_detail(json!({"expected": expected.to_string(), "actual": digest.to_string()})));
        }

        self.publish(staging, &digest).await?;
        Ok(digest)
    }

    pub async fn put_bytes(&self, data: Bytes) -> Result<Digest, RegistryError> {
        self.put(futures::stream::once(async move { Ok::<Bytes, RegistryError>(data) })).await
    }

    pub async fn put_verified_bytes(&self, expected: &Digest, data: Bytes) -> Result<Digest, RegistryError> {
        self.put_verified(expected, futures::stream::once(async move { Ok::<Bytes, RegistryError>(data) })).await
    }

    /// Lazy stream over the blob content
    pub async fn get(&self, digest: &Digest) -> Result<ByteStream, RegistryError> {
        let reader = self.driver.reader(&layout::blob_data(digest)).await
            .map_err(|e| blob_error(digest, e))?;

        Ok(ReaderStream::new(reader).map_err(RegistryError::from).boxed())
    }

    /// The whole blob content
    pub async fn read(&self, digest: &Digest) -> Result<Bytes, RegistryError> {
        self.driver.read(&layout::blob_data(digest)).await
            .map_err(|e| blob_error(digest, e))
    }

    /// The size of the blob, None when it is not stored
    pub async fn size(&self, digest: &Digest) -> Result<Option<u64>, RegistryError> {
        self.driver.size(&layout::blob_data(digest)).await
    }

    pub async fn exists(&self, digest: &Digest) -> Result<bool, RegistryError> {
        self.driver.exists(&layout::blob_data(digest)).await
    }

    /// Open an upload session the client completes later with its content
    pub async fn start_upload(&self) -> Result<Uuid, RegistryError> {
        let id = Uuid::new_v4();
        let started_at = Bytes::from(Utc::now().to_rfc3339());
        self.driver.write(&layout::upload_started(&id), started_at).await?;

        tracing::debug!("Upload session {} started", id);
        Ok(id)
    }

    /// Store the content of an upload session and close it.
    /// A failed verification leaves the session open for another attempt.
    pub async fn complete_upload<S, E>(&self, id: &Uuid, expected: &Digest, stream: S) -> Result<Digest, RegistryError>
        where
            S: Stream<Item = Result<Bytes, E>>,
            E: Display
    {
        let started = layout::upload_started(id);
        if !self.driver.exists(&started).await? {
            return Err(RegistryError::new(ErrorKind::RegistryBlobUploadUnknown)
                .with_context("blob upload unknown to registry")
                .with_detail(json!({"uuid": id.to_string()})));
        }

        let digest = self.put_verified(expected, stream).await?;
        self.driver.delete(&started).await?;
        Ok(digest)
    }

    /// Close the upload sessions started more than `max_age` ago and drop what they staged.
    /// Returns the number of sessions closed.
    pub async fn expire_uploads(&self, max_age: Duration) -> Result<usize, RegistryError> {
        let max_age = chrono::Duration::from_std(max_age).map_err(|e| RegistryError::new(ErrorKind::ConfigError)
            .with_context("upload expiry out of range")
            .with_error(e.to_string()))?;
        let cutoff = Utc::now() - max_age;

        let mut expired = 0;
        for path in self.driver.list(&layout::uploads()).await? {
            if !path.ends_with(&format!("/{}", layout::UPLOAD_STARTED)) {
                continue;
            }

            // completed while listing
            let Ok(marker) = self.driver.read(&path).await else {
                continue;
            };

            // an unreadable marker can never be completed either
            let started = std::str::from_utf8(&marker).ok()
                .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok());
            if matches!(started, Some(started) if started.with_timezone(&Utc) > cutoff) {
                continue;
            }

            self.driver.delete(&path).await?;
            if let Some(session) = path.strip_suffix(layout::UPLOAD_STARTED) {
                self.driver.delete(&format!("{}data", session)).await?;
            }

            tracing::debug!("Upload session {} expired", path);
            expired += 1;
        }

        Ok(expired)
    }

    // =============================================================================================
    // Private functions

    /// Writes the stream to a unique staging path, hashing it on the way
    async fn stage<S, E>(&self, stream: S) -> Result<(Staging, Digest), RegistryError>
        where
            S: Stream<Item = Result<Bytes, E>>,
            E: Display
    {
        let staging = Staging::new(self.driver.clone(), layout::upload_data(&Uuid::new_v4()));
        let mut writer = self.driver.writer(&staging.path).await?;
        let mut hasher = DigestHasher::default();

        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| RegistryError::new(ErrorKind::RegistryBlobUploadInvalid)
                .with_context("failed to receive the content")
                .with_error(e.to_string()))?;

            hasher.update(&chunk);
            writer.write_all(&chunk).await?;
        }

        // Flush everything before the content can be published
        writer.shutdown().await?;

        tracing::debug!("Staged {} bytes in {}", hasher.size(), staging.path);
        Ok((staging, hasher.finish()))
    }

    /// Moves the staged content under its digest, the single visible state transition
    async fn publish(&self, mut staging: Staging, digest: &Digest) -> Result<(), RegistryError> {
        let target = layout::blob_data(digest);

        if self.driver.exists(&target).await? {
            tracing::debug!("Blob {} already stored", digest);
            staging.discard().await;
            return Ok(());
        }

        self.driver.rename(&staging.path, &target).await?;
        staging.published = true;

        metrics::STORED_BLOBS.inc();
        tracing::info!("Blob stored successfully: {}", digest);
        Ok(())
    }
}

fn blob_error(digest: &Digest, e: RegistryError) -> RegistryError {
    if e.kind != ErrorKind::NotFound {
        return e;
    }
    RegistryError::new(ErrorKind::RegistryBlobUnknown)
        .with_context("blob unknown to registry")
        .with_detail(json!({"digest": digest.to_string()}))
}

/// Content being uploaded, removed unless it gets published
struct Staging {
    driver: Arc<dyn StorageDriver>,
    path: String,
    published: bool,
}

impl Staging {
    fn new(driver: Arc<dyn StorageDriver>, path: String) -> Staging {
        Staging {
            driver,
            path,
            published: false,
        }
    }

    async fn discard(mut self) {
        if let Err(e) = self.driver.delete(&self.path).await {
            tracing::error!("Failed to remove staged content {}: {}", self.path, e);
        }
        self.published = true;
    }
}

impl Drop for Staging {
    // Upload failed or was cancelled: nothing may stay behind
    fn drop(&mut self) {
        if self.published {
            return;
        }

        let driver = self.driver.clone();
        let path = std::mem::take(&mut self.path);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = driver.delete(&path).await {
                    tracing::error!("Failed to remove abandoned upload {}: {}", path, e);
                }
            });
        }
    }
}
