//! Storage Module - metafiles and contracts kept on the renter's disk
//!
//! A metafile records which hosts hold which sector roots of a file; a
//! contract binds a host key to the renter key allowed to modify its sectors.

mod contracts;
mod metafile;

pub use contracts::{Contract, ContractSet, CONTRACT_EXT};
pub use metafile::{filesize_units, MetaFile, MetaInfo, SectorSlice, METAFILE_EXT};

use thiserror::Error;

/// Size of one sector stored on a host (4 MiB)
pub const SECTOR_SIZE: u64 = 1 << 22;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid metafile {path}: {reason}")]
    InvalidMetaFile { path: String, reason: String },

    #[error("Invalid contract {path}: {reason}")]
    InvalidContract { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
