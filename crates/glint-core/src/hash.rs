//! Content hashing for deterministic emission verification.
//!
//! Produces a SHA-256 hash of emitted shader text, so hosts can confirm
//! byte-identical output across runs and key compiled-program caches.

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

/// A content hash digest (SHA-256, 32 bytes).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash {
    bytes: [u8; 32],
}

impl ContentHash {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Compute the content hash of a piece of shader source.
pub fn hash_source(source: &str) -> ContentHash {
    let mut hasher = Sha256::new();
    // Length prefix keeps concatenations of different splits distinct.
    hasher.update((source.len() as u64).to_le_bytes());
    hasher.update(source.as_bytes());
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    ContentHash::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let a = hash_source("void main() {}\n");
        let b = hash_source("void main() {}\n");
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_different_content() {
        assert_ne!(hash_source("uniform float a;"), hash_source("uniform float b;"));
    }

    #[test]
    fn test_hash_hex_format() {
        let hex = hash_source("").to_hex();
        assert_eq!(hex.len(), 64); // SHA-256 = 64 hex chars
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_display() {
        let hash = hash_source("x");
        assert_eq!(format!("{}", hash), hash.to_hex());
    }
}
