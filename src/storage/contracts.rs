//! Contracts - the renter's authority to modify a host's sector array

use super::StorageError;
use crate::crypto::{ContractId, HostKey, SigningKeyPair};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Extension used for contract files on disk
pub const CONTRACT_EXT: &str = "contract";

/// A storage contract with one host
#[derive(Debug, Clone)]
pub struct Contract {
    pub id: ContractId,
    pub host_key: HostKey,
    /// Key that signs write batches for this contract
    pub renter_key: SigningKeyPair,
}

/// On-disk representation of a contract
#[derive(Serialize, Deserialize)]
struct ContractFile {
    id: ContractId,
    host_key: HostKey,
    renter_seed: String,
}

impl Contract {
    pub fn new(id: ContractId, host_key: HostKey, renter_key: SigningKeyPair) -> Self {
        Self {
            id,
            host_key,
            renter_key,
        }
    }

    /// Read a contract file
    pub fn read(path: &Path) -> Result<Self, StorageError> {
        let invalid = |reason: String| StorageError::InvalidContract {
            path: path.display().to_string(),
            reason,
        };

        let data = std::fs::read(path)?;
        let file: ContractFile =
            serde_json::from_slice(&data).map_err(|e| invalid(e.to_string()))?;
        let seed =
            crate::crypto::decode_hex_32(&file.renter_seed).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            id: file.id,
            host_key: file.host_key,
            renter_key: SigningKeyPair::from_seed(&seed),
        })
    }

    /// Write the contract to a file
    pub fn write(&self, path: &Path) -> Result<(), StorageError> {
        let file = ContractFile {
            id: self.id,
            host_key: self.host_key,
            renter_seed: hex::encode(self.renter_key.seed_bytes()),
        };
        let data = serde_json::to_vec_pretty(&file)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

/// Contracts keyed by host, iterated in a stable order
#[derive(Debug, Clone, Default)]
pub struct ContractSet {
    contracts: BTreeMap<HostKey, Contract>,
}

impl ContractSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.contract` file in a directory
    pub fn load_dir(dir: &Path) -> Result<Self, StorageError> {
        if !dir.is_dir() {
            return Err(StorageError::FileNotFound(dir.display().to_string()));
        }

        let mut set = Self::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CONTRACT_EXT) {
                continue;
            }
            let contract = Contract::read(&path)?;
            tracing::debug!(host = %contract.host_key, path = %path.display(), "Loaded contract");
            set.insert(contract);
        }
        Ok(set)
    }

    /// Add a contract, replacing any previous contract with the same host
    pub fn insert(&mut self, contract: Contract) -> Option<Contract> {
        self.contracts.insert(contract.host_key, contract)
    }

    pub fn get(&self, host_key: &HostKey) -> Option<&Contract> {
        self.contracts.get(host_key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contract> {
        self.contracts.values()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

impl FromIterator<Contract> for ContractSet {
    fn from_iter<I: IntoIterator<Item = Contract>>(iter: I) -> Self {
        let mut set = Self::new();
        for contract in iter {
            set.insert(contract);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::random_32_bytes;
    use tempfile::TempDir;

    fn test_contract(host_byte: u8) -> Contract {
        Contract::new(
            ContractId::from_bytes(random_32_bytes()),
            HostKey::from_bytes([host_byte; 32]),
            SigningKeyPair::generate(),
        )
    }

    #[test]
    fn test_load_contract_dir() {
        let temp_dir = TempDir::new().unwrap();
        let a = test_contract(1);
        let b = test_contract(2);
        a.write(&temp_dir.path().join("a.contract")).unwrap();
        b.write(&temp_dir.path().join("b.contract")).unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), b"ignored").unwrap();

        let set = ContractSet::load_dir(temp_dir.path()).unwrap();
        assert_eq!(set.len(), 2);

        let loaded = set.get(&a.host_key).unwrap();
        assert_eq!(loaded.id, a.id);
        assert_eq!(
            loaded.renter_key.public_key_bytes(),
            a.renter_key.public_key_bytes()
        );
    }

    #[test]
    fn test_invalid_contract_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("bad.contract"), b"{}").unwrap();

        let err = ContractSet::load_dir(temp_dir.path()).unwrap_err();
        assert!(matches!(err, StorageError::InvalidContract { .. }));
    }

    #[test]
    fn test_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let err = ContractSet::load_dir(&temp_dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, StorageError::FileNotFound(_)));
    }
}
