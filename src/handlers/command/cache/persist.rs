// SPDX-License-Identifier: Apache-2.0
use std::convert::Infallible;
use std::sync::Arc;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing_attributes::instrument;
use crate::models::commands::RegistryCommand;
use crate::models::events::RegistryEvent;
use crate::pubsub::subscriber::CommandSubscriberTrait;
use crate::registry::digest::Digest;
use crate::registry::manifest::Manifest;
use crate::registry::reference::ManifestRef;
use crate::registry::repository::RepoName;
use crate::services::manifests::ManifestService;
use crate::storage::blobs::BlobStore;

/// Persists the content fetched from the upstream registry
pub struct CachePersistHandler {
    blobs: BlobStore,
    manifests: Arc<ManifestService>
}

impl CachePersistHandler {

    /// Create a new ARC wrapped instance of the CachePersistHandler
    pub fn new(blobs: BlobStore, manifests: Arc<ManifestService>) -> Arc<Self> {
        Arc::new(CachePersistHandler {
            blobs,
            manifests
        })
    }

    /// Persists the blob and verifies its sha256
    #[instrument(skip_all, fields(digest = %digest))]
    async fn persist_blob(&self, digest: Digest, receiver: UnboundedReceiver<Bytes>) -> Option<RegistryEvent> {
        // Content another request already cached is left alone
        match self.blobs.exists(&digest).await {
            Ok(true) => {
                tracing::debug!("Blob already cached: {}", digest);
                return None;
            }
            Ok(false) => {}
            Err(e) => {
                e.log();
                return None;
            }
        }

        // Process the chunks coming from upstream while the client receives them
        let stream = UnboundedReceiverStream::new(receiver).map(Ok::<Bytes, Infallible>);

        match self.blobs.put_verified(&digest, stream).await {
            Ok(digest) => {
                tracing::info!("Blob stored in cache successfully: {}", digest);
                Some(RegistryEvent::BlobCached(digest))
            }
            Err(e) => {
                tracing::error!("Failed to persist blob {}: {}", digest, e);
                None
            }
        }
    }

    /// Persists the manifest and its index
    #[instrument(skip_all, fields(name = %name, reference = %reference))]
    async fn persist_manifest(&self, name: RepoName, reference: ManifestRef, manifest: Manifest) -> Option<RegistryEvent> {
        if let Err(e) = self.manifests.cache(&name, &reference, &manifest).await {
            tracing::error!("Failed to persist manifest {}:{}: {}", name, reference, e);
            return None;
        }
        Some(RegistryEvent::ManifestCached(manifest.digest().clone()))
    }
}

#[async_trait]
impl CommandSubscriberTrait for CachePersistHandler {
    async fn run(&self, cmd: RegistryCommand) -> Option<RegistryEvent> {

        match cmd {
            RegistryCommand::Shutdown => {
                None
            }
            RegistryCommand::CacheBlob(digest, receiver) => {
                self.persist_blob(digest, receiver).await
            }
            RegistryCommand::CacheManifest(name, reference, manifest) => {
                self.persist_manifest(name, reference, manifest).await
            }
        }
    }

    /// One worker persists one digest at a time
    fn supports_concurrency(&self) -> bool {
        false
    }
}
