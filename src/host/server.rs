//! Loopback host - serves one sector array over the framed TCP protocol
//!
//! Used as a development host and by integration tests. It enforces the same
//! rules a real host does for the subset of the protocol the renter speaks:
//! contract lookup, renter signatures and atomic write batches.

use super::protocol::{
    read_frame, upload_signing_data, write_frame, write_signing_data, ErrorCode, HostRequest,
    HostResponse,
};
use super::{HostError, SectorArray};
use crate::crypto::{verify_signature, ContractId, HostKey, SectorRoot};

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::BufStream;
use tokio::net::{TcpListener, TcpStream};

struct HostState {
    host_key: HostKey,
    sectors: Mutex<SectorArray>,
    /// Contract ID -> renter public key
    contracts: RwLock<HashMap<ContractId, [u8; 32]>>,
}

/// In-process storage host
#[derive(Clone)]
pub struct HostServer {
    state: Arc<HostState>,
}

impl HostServer {
    pub fn new(host_key: HostKey) -> Self {
        Self {
            state: Arc::new(HostState {
                host_key,
                sectors: Mutex::new(SectorArray::new()),
                contracts: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn host_key(&self) -> HostKey {
        self.state.host_key
    }

    /// Accept writes for a contract signed by the given renter key
    pub fn add_contract(&self, id: ContractId, renter_public_key: [u8; 32]) {
        self.state.contracts.write().insert(id, renter_public_key);
    }

    /// Append sectors directly, bypassing the protocol
    pub fn seed<I: IntoIterator<Item = SectorRoot>>(&self, roots: I) {
        let mut sectors = self.state.sectors.lock();
        for root in roots {
            sectors.append(root);
        }
    }

    /// Snapshot of the current layout
    pub fn sectors(&self) -> SectorArray {
        self.state.sectors.lock().clone()
    }

    /// Bind and serve in the background; returns the bound address
    pub async fn listen(&self, addr: &str) -> Result<SocketAddr, HostError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(host = %self.state.host_key, "Listening on {}", local_addr);

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        tracing::debug!("Connection from {}", peer);
                        tokio::spawn(serve_connection(Arc::clone(&state), stream));
                    }
                    Err(e) => {
                        tracing::warn!("Accept failed: {}", e);
                    }
                }
            }
        });

        Ok(local_addr)
    }
}

async fn serve_connection(state: Arc<HostState>, stream: TcpStream) {
    let mut stream = BufStream::new(stream);
    loop {
        let request: HostRequest = match read_frame(&mut stream).await {
            Ok(request) => request,
            Err(HostError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                tracing::warn!("Dropping connection: {}", e);
                break;
            }
        };

        let closing = matches!(request, HostRequest::Close);
        let response = state.handle(request);
        if let Err(e) = write_frame(&mut stream, &response).await {
            tracing::warn!("Failed to send response: {}", e);
            break;
        }
        if closing {
            break;
        }
    }
}

impl HostState {
    fn handle(&self, request: HostRequest) -> HostResponse {
        match request {
            HostRequest::Settings => HostResponse::Settings {
                host_key: self.host_key,
                num_sectors: self.sectors.lock().len(),
            },

            HostRequest::SectorRoots { offset, count } => {
                match self.sectors.lock().range(offset, count) {
                    Some(roots) => HostResponse::SectorRoots(roots.to_vec()),
                    None => error(ErrorCode::InvalidRequest, "offset past end of contract"),
                }
            }

            HostRequest::Write {
                contract_id,
                actions,
                signature,
            } => {
                if let Err(response) =
                    self.authorize(&contract_id, &write_signing_data(&contract_id, &actions), &signature)
                {
                    return response;
                }
                let mut sectors = self.sectors.lock();
                match sectors.apply(&actions) {
                    Ok(()) => {
                        tracing::debug!(actions = actions.len(), num_sectors = sectors.len(), "Applied write");
                        HostResponse::WriteAck {
                            num_sectors: sectors.len(),
                        }
                    }
                    Err(e) => error(ErrorCode::InvalidAction, &e.to_string()),
                }
            }

            HostRequest::Upload {
                contract_id,
                data,
                signature,
            } => {
                if let Err(response) =
                    self.authorize(&contract_id, &upload_signing_data(&contract_id, &data), &signature)
                {
                    return response;
                }
                let root = SectorRoot::of_sector(&data);
                self.sectors.lock().append(root);
                HostResponse::Uploaded(root)
            }

            HostRequest::Close => HostResponse::Closed,
        }
    }

    fn authorize(
        &self,
        contract_id: &ContractId,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), HostResponse> {
        let renter_key = self
            .contracts
            .read()
            .get(contract_id)
            .copied()
            .ok_or_else(|| error(ErrorCode::UnknownContract, &contract_id.to_string()))?;

        verify_signature(&renter_key, message, signature)
            .map_err(|e| error(ErrorCode::InvalidSignature, &e.to_string()))
    }
}

fn error(code: ErrorCode, message: &str) -> HostResponse {
    HostResponse::Error {
        code,
        message: message.to_string(),
    }
}
