//! Host Module - sessions with storage hosts
//!
//! Handles address resolution, the framed RPC protocol spoken with hosts, and
//! the host-side sector array that the protocol's swap/trim writes operate on.

mod protocol;
mod resolver;
mod sector_array;
mod server;
mod session;

pub use protocol::{
    read_frame, upload_signing_data, write_frame, write_signing_data, ErrorCode, HostRequest,
    HostResponse, WriteAction, MAX_CONTRACT_SECTORS, MAX_FRAME_LEN, ROOTS_PER_REQUEST,
};
pub use resolver::StaticResolver;
pub use sector_array::{ActionError, SectorArray};
pub use server::HostServer;
pub use session::{HostResolver, HostSession, SessionOpener, TcpSession, TcpSessionOpener};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Unknown host: {0}")]
    UnknownHost(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Host key mismatch: expected {expected}, host reported {actual}")]
    HostKeyMismatch { expected: String, actual: String },

    #[error("Host rejected request ({code:?}): {message}")]
    Rejected { code: ErrorCode, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout")]
    Timeout,
}
