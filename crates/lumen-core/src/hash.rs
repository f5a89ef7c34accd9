//! Content hashing.
//!
//! SHA-256 digests identify fused shader programs (by source text) and give
//! bit-exact output verification for rendered frames.

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::frame::Surface;

/// A content hash digest (SHA-256, 32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash {
    bytes: [u8; 32],
}

impl ContentHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// First 12 hex characters, for log lines and labels.
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    fn from_hasher(hasher: Sha256) -> Self {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        Self { bytes }
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

/// Hash of a piece of source text.
pub fn hash_source(source: &str) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    ContentHash::from_hasher(hasher)
}

/// Hash of a float surface, over the exact bit patterns of its texels.
pub fn hash_surface(surface: &Surface) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(surface.width.to_le_bytes());
    hasher.update(surface.height.to_le_bytes());
    for texel in &surface.data {
        for v in texel {
            hasher.update(v.to_bits().to_le_bytes());
        }
    }
    ContentHash::from_hasher(hasher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;

    #[test]
    fn test_surface_hash_deterministic() {
        let a = Surface::solid(10, 10, &Color::RED);
        let b = Surface::solid(10, 10, &Color::RED);
        assert_eq!(hash_surface(&a), hash_surface(&b));
    }

    #[test]
    fn test_surface_hash_different_size() {
        let a = Surface::solid(10, 10, &Color::RED);
        let b = Surface::solid(20, 5, &Color::RED);
        assert_ne!(hash_surface(&a), hash_surface(&b));
    }

    #[test]
    fn test_source_hash_tracks_text() {
        assert_eq!(hash_source("fn a() {}"), hash_source("fn a() {}"));
        assert_ne!(hash_source("fn a() {}"), hash_source("fn b() {}"));
    }

    #[test]
    fn test_surface_hash_sees_small_changes() {
        let a = Surface::solid(4, 4, &Color::BLACK);
        let mut b = a.clone();
        b.set(3, 3, [0.0, 0.0, 1e-6, 1.0]);
        assert_ne!(hash_surface(&a), hash_surface(&b));
    }

    #[test]
    fn test_hash_hex_format() {
        let hash = hash_surface(&Surface::solid(2, 2, &Color::BLACK));
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(hex.starts_with(&hash.short()));
    }
}
