//! Sector roots: BLAKE3 Merkle roots over fixed-size segments
//!
//! A sector is identified by the Merkle root of its 64-byte segments. Leaves
//! and interior nodes use distinct prefixes so a leaf can never be confused
//! with a node.

use super::{decode_hex_32, impl_hex_serde, CryptoError};
use std::fmt;

/// Size of a Merkle leaf within a sector
pub const SEGMENT_SIZE: usize = 64;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Merkle root identifying one physically stored sector (32 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectorRoot(pub(crate) [u8; 32]);

impl_hex_serde!(SectorRoot);

impl SectorRoot {
    /// Compute the root of a sector's data
    pub fn of_sector(data: &[u8]) -> Self {
        let leaves: Vec<[u8; 32]> = if data.is_empty() {
            vec![hash_leaf(&[])]
        } else {
            data.chunks(SEGMENT_SIZE).map(hash_leaf).collect()
        };
        Self(compute_root(leaves))
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        decode_hex_32(s).map(Self)
    }

    /// Verify that data matches this root
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::of_sector(data) == *self
    }
}

impl fmt::Debug for SectorRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SectorRoot({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for SectorRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

fn hash_leaf(segment: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    hasher.update(segment);
    *hasher.finalize().as_bytes()
}

fn hash_node(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

/// Fold a non-empty level of leaves up to a single root
fn compute_root(mut current_level: Vec<[u8; 32]>) -> [u8; 32] {
    while current_level.len() > 1 {
        current_level = current_level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_node(left, right),
                // Odd number of nodes, promote the last one
                [single] => *single,
                _ => unreachable!("chunks(2) yields one or two nodes"),
            })
            .collect();
    }
    current_level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sector_root() {
        let data = vec![7u8; SEGMENT_SIZE * 4];
        let root = SectorRoot::of_sector(&data);

        assert!(root.verify(&data));
        assert!(!root.verify(&data[..SEGMENT_SIZE * 3]));
    }

    #[test]
    fn test_root_hex() {
        let root = SectorRoot::of_sector(b"test data");

        let hex = root.to_hex();
        assert_eq!(SectorRoot::from_hex(&hex).unwrap(), root);
        assert!(SectorRoot::from_hex("abcd").is_err());
    }

    #[test]
    fn test_single_segment_is_leaf_hash() {
        let root = SectorRoot::of_sector(b"short");
        assert_eq!(root.as_bytes(), &hash_leaf(b"short"));
    }

    #[test]
    fn test_odd_segment_count() {
        let data: Vec<u8> = (0..SEGMENT_SIZE * 3).map(|i| i as u8).collect();
        let leaves: Vec<[u8; 32]> = data.chunks(SEGMENT_SIZE).map(hash_leaf).collect();
        let expected = hash_node(&hash_node(&leaves[0], &leaves[1]), &leaves[2]);

        assert_eq!(SectorRoot::of_sector(&data).as_bytes(), &expected);
    }

    #[test]
    fn test_json_uses_hex() {
        let root = SectorRoot::of_sector(b"json");
        let json = serde_json::to_string(&root).unwrap();
        assert_eq!(json, format!("\"{}\"", root.to_hex()));

        let back: SectorRoot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, root);
    }
}
