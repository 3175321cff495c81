// SPDX-License-Identifier: Apache-2.0
use crate::registry::digest::Digest;

/// Outcome of a processed command
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    BlobCached(Digest),
    ManifestCached(Digest),
}
