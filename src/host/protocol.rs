//! Host Protocol - Request/Response messages and framing

use super::HostError;
use crate::crypto::{ContractId, HostKey, SectorRoot};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame a host accepts (20 MiB)
pub const MAX_FRAME_LEN: usize = 20 << 20;

/// Roots requested per `SectorRoots` call; keeps each response well under
/// `MAX_FRAME_LEN`
pub const ROOTS_PER_REQUEST: u64 = 1 << 16;

/// Most sectors one contract may hold (16 PiB of 4 MiB sectors)
pub const MAX_CONTRACT_SECTORS: u64 = 1 << 32;

const WRITE_SIGNING_TAG: &[u8] = b"renter/write/v1";
const UPLOAD_SIGNING_TAG: &[u8] = b"renter/upload/v1";

/// One mutation of a host's sector array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteAction {
    /// Exchange the sectors at positions `a` and `b`
    Swap { a: u64, b: u64 },

    /// Drop the last `n` sectors
    Trim { n: u64 },
}

impl fmt::Display for WriteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteAction::Swap { a, b } => write!(f, "swap({}, {})", a, b),
            WriteAction::Trim { n } => write!(f, "trim({})", n),
        }
    }
}

/// Requests a renter sends to a host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HostRequest {
    /// Ask for the host key and current sector count
    Settings,

    /// List sector roots in on-host order
    SectorRoots { offset: u64, count: u64 },

    /// Apply a batch of actions atomically
    Write {
        contract_id: ContractId,
        actions: Vec<WriteAction>,
        /// Renter signature over `write_signing_data`
        signature: Vec<u8>,
    },

    /// Append one sector
    Upload {
        contract_id: ContractId,
        data: Vec<u8>,
        /// Renter signature over `upload_signing_data`
        signature: Vec<u8>,
    },

    /// End the session
    Close,
}

/// Host responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HostResponse {
    Settings { host_key: HostKey, num_sectors: u64 },

    SectorRoots(Vec<SectorRoot>),

    /// Write applied; sector count after the batch
    WriteAck { num_sectors: u64 },

    Uploaded(SectorRoot),

    Closed,

    Error { code: ErrorCode, message: String },
}

/// Error codes for host operations
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    /// Action out of bounds for the current array
    InvalidAction,

    /// Invalid signature
    InvalidSignature,

    /// No such contract on this host
    UnknownContract,

    /// Invalid request
    InvalidRequest,

    /// Internal error
    InternalError,
}

/// Bytes the renter signs to authorize a write batch
pub fn write_signing_data(contract_id: &ContractId, actions: &[WriteAction]) -> Vec<u8> {
    let mut data = Vec::with_capacity(WRITE_SIGNING_TAG.len() + 32 + actions.len() * 17);
    data.extend_from_slice(WRITE_SIGNING_TAG);
    data.extend_from_slice(contract_id.as_bytes());
    for action in actions {
        match *action {
            WriteAction::Swap { a, b } => {
                data.push(0);
                data.extend_from_slice(&a.to_be_bytes());
                data.extend_from_slice(&b.to_be_bytes());
            }
            WriteAction::Trim { n } => {
                data.push(1);
                data.extend_from_slice(&n.to_be_bytes());
            }
        }
    }
    data
}

/// Bytes the renter signs to authorize an upload
pub fn upload_signing_data(contract_id: &ContractId, data: &[u8]) -> Vec<u8> {
    let root = SectorRoot::of_sector(data);
    let mut out = Vec::with_capacity(UPLOAD_SIGNING_TAG.len() + 64);
    out.extend_from_slice(UPLOAD_SIGNING_TAG);
    out.extend_from_slice(contract_id.as_bytes());
    out.extend_from_slice(root.as_bytes());
    out
}

/// Write one length-prefixed bincode frame
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), HostError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = bincode::serialize(message).map_err(|e| HostError::Protocol(e.to_string()))?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(HostError::Protocol(format!(
            "frame of {} bytes exceeds limit of {}",
            payload.len(),
            MAX_FRAME_LEN
        )));
    }

    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed bincode frame
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, HostError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(HostError::Protocol(format!(
            "frame of {} bytes exceeds limit of {}",
            len, MAX_FRAME_LEN
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    bincode::deserialize(&payload).map_err(|e| HostError::Protocol(e.to_string()))
}
