// SPDX-License-Identifier: Apache-2.0
pub mod filesystem;

use std::pin::Pin;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use crate::error::registry::RegistryError;

/// Interface to the byte storage substrate, addressed by relative paths such as
/// `docker/registry/v2/blobs/sha256/05/<hash>/data`
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Open a path for writing, truncating any previous content
    async fn writer(&self, path: &str) -> Result<Pin<Box<dyn AsyncWrite + Send>>, RegistryError>;

    /// Get a reader over the content of the path
    async fn reader(&self, path: &str) -> Result<Pin<Box<dyn AsyncRead + Send>>, RegistryError>;

    /// Whether the path holds content
    async fn exists(&self, path: &str) -> Result<bool, RegistryError>;

    /// Size in bytes of the content, None when absent
    async fn size(&self, path: &str) -> Result<Option<u64>, RegistryError>;

    /// Atomically move content from one path to another, replacing the target
    async fn rename(&self, from: &str, to: &str) -> Result<(), RegistryError>;

    /// Remove the content of the path, removing an absent path is not an error
    async fn delete(&self, path: &str) -> Result<(), RegistryError>;

    /// Every path below the prefix
    async fn list(&self, prefix: &str) -> Result<Vec<String>, RegistryError>;

    /// Store a complete payload
    async fn write(&self, path: &str, data: Bytes) -> Result<(), RegistryError> {
        let mut writer = self.writer(path).await?;
        writer.write_all(&data).await?;
        writer.shutdown().await?;
        Ok(())
    }

    /// Read a complete payload
    async fn read(&self, path: &str) -> Result<Bytes, RegistryError> {
        let mut reader = self.reader(path).await?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        Ok(Bytes::from(data))
    }
}
