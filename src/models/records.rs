// SPDX-License-Identifier: Apache-2.0
use crate::registry::digest::Digest;

/// TagRecord keeps an index between the container image manifest tag and its reference
#[derive(Debug, Clone, PartialEq)]
pub struct TagRecord {
    pub name: String,
    pub tag: String,
    pub reference: Option<Digest>,
    pub size: i64,
    pub mime: String,
}

impl TagRecord {
    pub fn new(name: String, tag: String, reference: Option<Digest>, size: i64, mime: String) -> TagRecord {
        TagRecord {
            name,
            tag,
            reference,
            size,
            mime
        }
    }
}

/// RevisionRecord marks a manifest digest as part of a repository
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionRecord {
    pub name: String,
    pub reference: Option<Digest>,
    pub size: i64,
    pub mime: String,
}

impl RevisionRecord {
    pub fn new(name: String, reference: Option<Digest>, size: i64, mime: String) -> RevisionRecord {
        RevisionRecord {
            name,
            reference,
            size,
            mime
        }
    }
}
