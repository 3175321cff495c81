// SPDX-License-Identifier: Apache-2.0
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use bytes::Bytes;
use tokio::sync::mpsc::UnboundedReceiver;
use crate::pubsub::command::ChannelId;
use crate::registry::digest::Digest;
use crate::registry::manifest::Manifest;
use crate::registry::reference::ManifestRef;
use crate::registry::repository::RepoName;

pub const SHUTDOWN:&str = "shutdown";
pub const CACHE_BLOB:&str = "cache_blob";
pub const CACHE_MANIFEST:&str = "cache_manifest";

#[derive(Debug)]
pub enum RegistryCommand {
    Shutdown,
    /// Persist the blob content streamed from upstream while it is served to the client
    CacheBlob(Digest, UnboundedReceiver<Bytes>),
    /// Persist a manifest fetched from upstream and bind its reference
    CacheManifest(RepoName, ManifestRef, Manifest),
}

impl RegistryCommand {
    pub fn id(&self) -> String {
        match self {
            RegistryCommand::Shutdown => String::from(SHUTDOWN),
            RegistryCommand::CacheBlob(digest, _) => digest.to_string(),
            RegistryCommand::CacheManifest(_, _, manifest) => manifest.digest().to_string(),
        }

    }

    pub fn topic(&self) -> String {
        match self {
            RegistryCommand::Shutdown => String::from(SHUTDOWN),
            RegistryCommand::CacheBlob(_, _) => String::from(CACHE_BLOB),
            RegistryCommand::CacheManifest(_, _, _) => String::from(CACHE_MANIFEST),
        }

    }

}

impl ChannelId for RegistryCommand {
    /// Commands about the same digest always land on the same queue
    fn queue_id(&self) -> u64 {

        let mut hasher = DefaultHasher::new();

        // Hash the command ID
        let cmd_id = self.id();
        cmd_id.hash(&mut hasher);

        // Terminate the hashing
        hasher.finish()

    }

    fn topic_id(&self) -> String {
        self.topic()
    }
}
