// SPDX-License-Identifier: Apache-2.0
use std::fmt;
use crate::error::registry::RegistryError;
use crate::registry::digest::{Digest, REGEX_ALGO};
use crate::registry::repository::Tag;

/// Reference to a manifest, either through a mutable tag or its immutable digest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ManifestRef {
    Tag(Tag),
    Digest(Digest),
}

impl ManifestRef {
    /// Parse the reference path segment.
    /// Anything shaped like `algo:value` is a digest and must be a valid one, the rest is a tag.
    pub fn parse(reference: &str) -> Result<ManifestRef, RegistryError> {
        match reference.split_once(':') {
            Some((algo, _)) if REGEX_ALGO.is_match(algo) => Ok(ManifestRef::Digest(Digest::parse(reference)?)),
            _ => Ok(ManifestRef::Tag(Tag::parse(reference)?)),
        }
    }

    pub fn digest(&self) -> Option<&Digest> {
        match self {
            ManifestRef::Digest(digest) => Some(digest),
            ManifestRef::Tag(_) => None,
        }
    }

    pub fn tag(&self) -> Option<&Tag> {
        match self {
            ManifestRef::Tag(tag) => Some(tag),
            ManifestRef::Digest(_) => None,
        }
    }
}

impl fmt::Display for ManifestRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ManifestRef::Tag(tag) => write!(f, "{}", tag),
            ManifestRef::Digest(digest) => write!(f, "{}", digest),
        }
    }
}

impl From<Digest> for ManifestRef {
    fn from(digest: Digest) -> Self {
        ManifestRef::Digest(digest)
    }
}

impl From<Tag> for ManifestRef {
    fn from(tag: Tag) -> Self {
        ManifestRef::Tag(tag)
    }
}
