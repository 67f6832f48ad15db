//! Content digests for rendered documents and build contexts.
//!
//! Two builds with identical inputs produce identical digests.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A full 64-character SHA256 hash.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
  /// Short form used in human-facing output.
  pub fn short(&self) -> &str {
    let len = self.0.len().min(12);
    &self.0[..len]
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Hash arbitrary bytes.
///
/// Returns the full 64-character SHA256 hash.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(hex::encode(hasher.finalize()))
}
