//! Host public keys and contract identifiers

use super::{decode_hex_32, impl_hex_serde, CryptoError};
use std::fmt;
use std::str::FromStr;

const HOST_KEY_PREFIX: &str = "ed25519:";

/// Ed25519 public key identifying a storage host
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostKey(pub(crate) [u8; 32]);

impl_hex_serde!(HostKey);

impl HostKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Abbreviated form used in report lines
    pub fn short_key(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", HOST_KEY_PREFIX, hex::encode(self.0))
    }
}

impl fmt::Debug for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostKey({})", self.short_key())
    }
}

impl FromStr for HostKey {
    type Err = CryptoError;

    /// Accepts both `ed25519:<hex>` and bare hex
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s.strip_prefix(HOST_KEY_PREFIX).unwrap_or(s);
        decode_hex_32(hex_part)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKey(format!("{}: {}", s, e)))
    }
}

/// Identifier of a storage contract
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContractId(pub(crate) [u8; 32]);

impl_hex_serde!(ContractId);

impl ContractId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContractId({})", hex::encode(&self.0[..4]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_key_parse() {
        let key = HostKey::from_bytes([0xab; 32]);
        let display = key.to_string();

        assert!(display.starts_with("ed25519:"));
        assert_eq!(display.parse::<HostKey>().unwrap(), key);
        assert_eq!(hex::encode([0xab; 32]).parse::<HostKey>().unwrap(), key);
        assert!("ed25519:zz".parse::<HostKey>().is_err());
    }

    #[test]
    fn test_short_key() {
        let key = HostKey::from_bytes([0x01; 32]);
        assert_eq!(key.short_key(), "01010101");
    }
}
