// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use crate::auth::policy::Policy;
use crate::proxy::registry::UpstreamRegistry;
use crate::pubsub::command_bus::CommandBus;
use crate::services::manifests::ManifestService;
use crate::storage::blobs::BlobStore;

#[derive(Clone)]
pub struct AppState {
    pub blobs: BlobStore,
    pub manifests: Arc<ManifestService>,
    pub policy: Arc<dyn Policy>,

    /// Set when the registry is a pull-through cache
    pub upstream: Option<Arc<UpstreamRegistry>>,

    pub command_bus: Arc<CommandBus>,
}

impl AppState {
    pub fn new(blobs: BlobStore,
               manifests: Arc<ManifestService>,
               policy: Arc<dyn Policy>,
               upstream: Option<Arc<UpstreamRegistry>>,
               command_bus: Arc<CommandBus>) -> Self {
        AppState {
            blobs,
            manifests,
            policy,
            upstream,
            command_bus,
        }
    }
}
