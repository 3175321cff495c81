// SPDX-License-Identifier: Apache-2.0
use lazy_static::lazy_static;
use regex::Regex;
use std::str::FromStr;
use std::fmt;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use sha2::Digest as Sha2Digest;
use crate::error::error_kind::ErrorKind::RegistryDigestInvalid;
use crate::error::registry::RegistryError;

// These regex are used to do a simple validation of the digest fields
lazy_static! {
    pub(crate) static ref REGEX_ALGO: Regex = Regex::new(r"^[A-Za-z0-9_+.-]+$").unwrap();
    static ref REGEX_HEX: Regex = Regex::new(r"^[a-f0-9]+$").unwrap();
}

#[derive(Hash, Serialize, Deserialize, Debug, Clone, Copy, PartialOrd, Ord, Eq, PartialEq, Default)]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
}

impl DigestAlgorithm {
    /// Length of the hex encoded hash produced by the algorithm
    pub fn hex_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 64,
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(DigestAlgorithm::Sha256),
            _ => Err(format!("'{}' is not a supported DigestAlgorithm", s)),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

/// This contains the algorithm and the hashed value
#[derive(Debug, PartialEq, Clone, PartialOrd, Ord, Eq, Hash)]
pub struct Digest {
    pub algo: DigestAlgorithm,
    pub hash: String,
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.algo, self.hash)
    }
}

impl FromStr for Digest {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Digest::parse(s)
    }
}

/// Implemented custom deserializer from string
impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error> where D: Deserializer<'de> {
        let s = String::deserialize(deserializer)?;
        Digest::parse(s.as_str()).map_err(|e| de::Error::custom(format!("error parsing digest: {}", e)))
    }
}

/// Implemented custom serializer to String
impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

impl Digest {

    /// Parse the digest with the form: algo:hash
    pub fn parse(component: &str) -> Result<Digest, RegistryError> {
        Digest::parse_parts(component).map_err(|e|
            RegistryError::new(RegistryDigestInvalid)
                .with_context(format!("failed to parse digest {}", component)).with_error(e))
    }

    /// Hash a complete payload
    pub fn compute(data: &[u8]) -> Digest {
        let mut hasher = DigestHasher::default();
        hasher.update(data);
        hasher.finish()
    }

    /// The first two characters of the hash, used to fan out the blob directories
    pub fn shard(&self) -> &str {
        &self.hash[..2]
    }

    // =============================================================================================
    // Private functions

    /// Parses and verifies the two parts: algo and hex encoded hash
    fn parse_parts(component: &str) -> Result<Digest, String> {
        // check that we have both parts: algo and digest
        let (algo, hash) = component.split_once(':')
            .ok_or_else(|| format!("Component cannot be parsed into a digest: {}", component))?;

        if !REGEX_ALGO.is_match(algo) {
            return Err(format!("wrong digest algorithm format: {}", algo));
        }

        let algo = DigestAlgorithm::from_str(algo)?;

        if !REGEX_HEX.is_match(hash) {
            return Err(format!("digest must be lower case hex: {}", hash));
        }

        if hash.len() != algo.hex_len() {
            return Err(format!("{} digest must be {} chars long, got {}", algo, algo.hex_len(), hash.len()));
        }

        Ok(Digest {
            algo,
            hash: hash.to_string(),
        })
    }
}

/// Incremental digest computation, fed chunk by chunk while content is streamed to storage
#[derive(Default)]
pub struct DigestHasher {
    hasher: Sha256,
    size: u64,
}

impl DigestHasher {
    pub fn update(&mut self, chunk: &[u8]) {
        self.size += chunk.len() as u64;
        self.hasher.update(chunk);
    }

    /// Amount of bytes hashed so far
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn finish(self) -> Digest {
        Digest {
            algo: DigestAlgorithm::Sha256,
            hash: hex::encode(self.hasher.finalize()),
        }
    }
}
