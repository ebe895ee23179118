//! Cryptography Module - content roots and signing keys
//!
//! Provides BLAKE3 sector Merkle roots, host public keys, contract IDs and
//! the Ed25519 renter keys used to authorize contract writes.

/// Serde for 32-byte newtypes: hex strings in human-readable formats (JSON,
/// TOML), raw arrays in binary ones (bincode).
macro_rules! impl_hex_serde {
    ($ty:ident) => {
        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                if s.is_human_readable() {
                    s.serialize_str(&hex::encode(self.0))
                } else {
                    serde::Serialize::serialize(&self.0, s)
                }
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                if d.is_human_readable() {
                    let s = <String as serde::Deserialize>::deserialize(d)?;
                    $crate::crypto::decode_hex_32(&s)
                        .map($ty)
                        .map_err(serde::de::Error::custom)
                } else {
                    <[u8; 32] as serde::Deserialize>::deserialize(d).map($ty)
                }
            }
        }
    };
}

pub(crate) use impl_hex_serde;

mod hashing;
mod keys;

pub use hashing::{SectorRoot, SEGMENT_SIZE};
pub use keys::{ContractId, HostKey};

use ed25519_dalek::{Signature, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Signature verification failed")]
    SignatureVerificationFailed,
}

/// Signing key pair (Ed25519)
#[derive(Clone)]
pub struct SigningKeyPair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl SigningKeyPair {
    /// Derive a key pair from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Generate a fresh random key pair
    pub fn generate() -> Self {
        Self::from_seed(&random_32_bytes())
    }

    /// Get the public key bytes
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Get the secret seed bytes
    pub fn seed_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        use ed25519_dalek::Signer;
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    /// Verify a signature made by this key pair
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        verify_signature(&self.public_key_bytes(), message, signature)
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKeyPair({})", hex::encode(self.public_key_bytes()))
    }
}

/// Verify an Ed25519 signature against raw public key bytes
pub fn verify_signature(
    public_key: &[u8; 32],
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let verifying_key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    let sig_bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| CryptoError::InvalidData("Invalid signature length".into()))?;
    let sig = Signature::from_bytes(&sig_bytes);

    verifying_key
        .verify(message, &sig)
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}

/// Secure random 32-byte array
pub fn random_32_bytes() -> [u8; 32] {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Decode a hex string into a fixed 32-byte array
pub(crate) fn decode_hex_32(s: &str) -> Result<[u8; 32], CryptoError> {
    let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidData(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidData(format!("expected 32 bytes, got hex {:?}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes() {
        let bytes1 = random_32_bytes();
        let bytes2 = random_32_bytes();

        assert_ne!(bytes1, bytes2); // Should be different (with overwhelming probability)
    }

    #[test]
    fn test_signing_keypair() {
        let keypair = SigningKeyPair::generate();

        let message = b"Test message";
        let signature = keypair.sign(message);

        assert!(keypair.verify(message, &signature).is_ok());
        assert!(keypair.verify(b"Wrong message", &signature).is_err());
    }

    #[test]
    fn test_keypair_from_seed_is_deterministic() {
        let seed = random_32_bytes();
        let a = SigningKeyPair::from_seed(&seed);
        let b = SigningKeyPair::from_seed(&seed);

        assert_eq!(a.public_key_bytes(), b.public_key_bytes());
        assert_eq!(a.seed_bytes(), seed);
    }

    #[test]
    fn test_verify_rejects_short_signature() {
        let keypair = SigningKeyPair::generate();
        let result = verify_signature(&keypair.public_key_bytes(), b"msg", &[0u8; 10]);
        assert!(matches!(result, Err(CryptoError::InvalidData(_))));
    }
}
