//! Renter Core - client side of a contract-based storage network
//!
//! A renter stores file shards as 4 MiB sectors on hosts it holds contracts
//! with, and keeps one metafile per uploaded file describing where every
//! shard lives. This crate reads those metafiles and contracts, talks to
//! hosts over a framed RPC protocol, and garbage-collects sectors that no
//! metafile references any more.

pub mod crypto;
pub mod gc;
pub mod host;
pub mod logging;
pub mod storage;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main error type for renter operations
#[derive(Error, Debug)]
pub enum RenterError {
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Host error: {0}")]
    Host(#[from] host::HostError),

    #[error("Garbage collection error: {0}")]
    Gc(#[from] gc::GcError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RenterError>;

/// Renter configuration, read from `config.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenterConfig {
    /// Directory holding `*.contract` files
    pub contracts_dir: PathBuf,

    /// Host key -> network address
    pub hosts: BTreeMap<String, String>,

    /// Hosts contacted at once during a cycle
    pub parallelism: usize,

    /// Default log level when `RUST_LOG` is unset
    pub log_level: String,

    /// Seconds to wait for a host to accept a connection
    pub connect_timeout_secs: u64,

    /// Seconds to wait for a host to answer any single request
    pub io_timeout_secs: u64,
}

impl Default for RenterConfig {
    fn default() -> Self {
        Self {
            contracts_dir: Self::base_dir()
                .map(|dir| dir.join("contracts"))
                .unwrap_or_else(|| PathBuf::from("contracts")),
            hosts: BTreeMap::new(),
            parallelism: gc::DEFAULT_PARALLELISM,
            log_level: "info".to_string(),
            connect_timeout_secs: 30,
            io_timeout_secs: 60,
        }
    }
}

impl RenterConfig {
    fn base_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("renter"))
    }

    /// `~/.config/renter/config.toml` or the platform equivalent
    pub fn default_path() -> Option<PathBuf> {
        Self::base_dir().map(|dir| dir.join("config.toml"))
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&contents)
            .map_err(|e| RenterError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| RenterError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Resolver over the `[hosts]` table
    pub fn resolver(&self) -> Result<host::StaticResolver> {
        self.hosts
            .iter()
            .map(|(key, address)| {
                let host_key: crypto::HostKey = key
                    .parse()
                    .map_err(|e| RenterError::Config(format!("host key {}: {}", key, e)))?;
                Ok((host_key, address.clone()))
            })
            .collect()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }
}
