//! Content hashing for published artifacts.
//!
//! Every hosted artifact is recorded with its SHA-256 digest and size so a
//! download can be checked against what was published.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A content hash (SHA-256 hex digest).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Compute the SHA-256 hash of the given data.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentHash(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that the given data matches this hash.
    pub fn verify(&self, data: &[u8]) -> bool {
        ContentHash::compute(data) == *self
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hash and length of an uploaded artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDigest {
    pub hash: ContentHash,
    pub size: u64,
}

impl ArtifactDigest {
    pub fn of(data: &[u8]) -> Self {
        ArtifactDigest {
            hash: ContentHash::compute(data),
            size: data.len() as u64,
        }
    }

    /// Check that `data` is exactly the artifact this digest describes.
    pub fn matches(&self, data: &[u8]) -> bool {
        self.size == data.len() as u64 && self.hash.verify(data)
    }
}
