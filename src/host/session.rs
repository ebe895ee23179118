//! Renter-side host sessions

use super::protocol::{
    read_frame, upload_signing_data, write_frame, write_signing_data, HostRequest, HostResponse,
    WriteAction, MAX_CONTRACT_SECTORS, ROOTS_PER_REQUEST,
};
use super::HostError;
use crate::crypto::{HostKey, SectorRoot};
use crate::storage::Contract;

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufStream};
use tokio::net::TcpStream;

/// Resolves a host's public key to a network address
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host_key: &HostKey) -> Result<String, HostError>;
}

/// An open session with one host under one contract
#[async_trait]
pub trait HostSession: Send {
    /// Host key confirmed during the handshake
    fn host_key(&self) -> &HostKey;

    /// Current number of sectors in the contract
    fn num_sectors(&self) -> u64;

    /// All sector roots in on-host order
    async fn sector_roots(&mut self) -> Result<Vec<SectorRoot>, HostError>;

    /// Apply a batch of actions atomically; returns the new sector count
    async fn write(&mut self, actions: &[WriteAction]) -> Result<u64, HostError>;

    async fn close(&mut self) -> Result<(), HostError>;
}

/// Opens sessions with hosts
#[async_trait]
pub trait SessionOpener: Send + Sync {
    async fn open(
        &self,
        address: &str,
        contract: &Contract,
    ) -> Result<Box<dyn HostSession>, HostError>;
}

/// Session over the framed TCP protocol
pub struct TcpSession {
    stream: BufStream<TcpStream>,
    host_key: HostKey,
    contract: Contract,
    num_sectors: u64,
    io_timeout: Duration,
}

impl TcpSession {
    /// Connect and perform the settings handshake. Every later round trip is
    /// bounded by `io_timeout`.
    pub async fn connect(
        address: &str,
        contract: &Contract,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<Self, HostError> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| HostError::Timeout)?
            .map_err(|e| HostError::ConnectionFailed(format!("{}: {}", address, e)))?;

        let mut session = Self {
            stream: BufStream::new(stream),
            host_key: contract.host_key,
            contract: contract.clone(),
            num_sectors: 0,
            io_timeout,
        };

        match session.round_trip(&HostRequest::Settings).await? {
            HostResponse::Settings {
                host_key,
                num_sectors,
            } => {
                if host_key != contract.host_key {
                    return Err(HostError::HostKeyMismatch {
                        expected: contract.host_key.to_string(),
                        actual: host_key.to_string(),
                    });
                }
                if num_sectors > MAX_CONTRACT_SECTORS {
                    return Err(HostError::Protocol(format!(
                        "host reported {} sectors, limit is {}",
                        num_sectors, MAX_CONTRACT_SECTORS
                    )));
                }
                session.num_sectors = num_sectors;
            }
            other => return Err(unexpected(&other)),
        }

        tracing::debug!(
            host = %session.host_key,
            num_sectors = session.num_sectors,
            "Session established"
        );
        Ok(session)
    }

    /// Upload one sector, appending it to the contract
    pub async fn upload(&mut self, data: &[u8]) -> Result<SectorRoot, HostError> {
        let signature = self
            .contract
            .renter_key
            .sign(&upload_signing_data(&self.contract.id, data));
        let request = HostRequest::Upload {
            contract_id: self.contract.id,
            data: data.to_vec(),
            signature,
        };

        match self.round_trip(&request).await? {
            HostResponse::Uploaded(root) => {
                self.num_sectors += 1;
                Ok(root)
            }
            other => Err(unexpected(&other)),
        }
    }

    async fn round_trip(&mut self, request: &HostRequest) -> Result<HostResponse, HostError> {
        let stream = &mut self.stream;
        let exchange = async move {
            write_frame(stream, request).await?;
            read_frame::<_, HostResponse>(stream).await
        };
        match tokio::time::timeout(self.io_timeout, exchange)
            .await
            .map_err(|_| HostError::Timeout)??
        {
            HostResponse::Error { code, message } => Err(HostError::Rejected { code, message }),
            response => Ok(response),
        }
    }
}

#[async_trait]
impl HostSession for TcpSession {
    fn host_key(&self) -> &HostKey {
        &self.host_key
    }

    fn num_sectors(&self) -> u64 {
        self.num_sectors
    }

    async fn sector_roots(&mut self) -> Result<Vec<SectorRoot>, HostError> {
        let total = self.num_sectors;
        // Grows page by page; the host's count alone never sizes an allocation
        let mut roots = Vec::with_capacity(total.min(ROOTS_PER_REQUEST) as usize);

        while (roots.len() as u64) < total {
            let offset = roots.len() as u64;
            let count = ROOTS_PER_REQUEST.min(total - offset);
            match self
                .round_trip(&HostRequest::SectorRoots { offset, count })
                .await?
            {
                HostResponse::SectorRoots(page) => {
                    if page.len() as u64 != count {
                        return Err(HostError::Protocol(format!(
                            "requested {} roots at offset {}, host sent {}",
                            count,
                            offset,
                            page.len()
                        )));
                    }
                    roots.extend(page);
                }
                other => return Err(unexpected(&other)),
            }
        }

        Ok(roots)
    }

    async fn write(&mut self, actions: &[WriteAction]) -> Result<u64, HostError> {
        let signature = self
            .contract
            .renter_key
            .sign(&write_signing_data(&self.contract.id, actions));
        let request = HostRequest::Write {
            contract_id: self.contract.id,
            actions: actions.to_vec(),
            signature,
        };

        match self.round_trip(&request).await? {
            HostResponse::WriteAck { num_sectors } => {
                self.num_sectors = num_sectors;
                Ok(num_sectors)
            }
            other => Err(unexpected(&other)),
        }
    }

    async fn close(&mut self) -> Result<(), HostError> {
        // The host may drop the connection before acknowledging
        if let Err(e) = self.round_trip(&HostRequest::Close).await {
            tracing::debug!(host = %self.host_key, "Close not acknowledged: {}", e);
        }
        self.stream.shutdown().await?;
        Ok(())
    }
}

fn unexpected(response: &HostResponse) -> HostError {
    HostError::Protocol(format!("unexpected response: {:?}", response))
}

/// Opens `TcpSession`s
#[derive(Debug, Clone)]
pub struct TcpSessionOpener {
    pub connect_timeout: Duration,
    /// Bound on each request/response exchange after connecting
    pub io_timeout: Duration,
}

impl Default for TcpSessionOpener {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
        }
    }
}

#[async_trait]
impl SessionOpener for TcpSessionOpener {
    async fn open(
        &self,
        address: &str,
        contract: &Contract,
    ) -> Result<Box<dyn HostSession>, HostError> {
        let session = TcpSession::connect(address, contract, self.connect_timeout, self.io_timeout).await?;
        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{random_32_bytes, ContractId, SigningKeyPair};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    const TIMEOUT: Duration = Duration::from_millis(200);

    fn contract(host_key: HostKey) -> Contract {
        Contract::new(
            ContractId::from_bytes(random_32_bytes()),
            host_key,
            SigningKeyPair::generate(),
        )
    }

    /// A host that answers the handshake with `num_sectors` (or not at all),
    /// then keeps the connection open without replying
    async fn unresponsive_host(host_key: HostKey, num_sectors: Option<u64>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _: HostRequest = read_frame(&mut socket).await.unwrap();
            if let Some(num_sectors) = num_sectors {
                let settings = HostResponse::Settings {
                    host_key,
                    num_sectors,
                };
                write_frame(&mut socket, &settings).await.unwrap();
            }
            let mut buf = [0u8; 256];
            while matches!(socket.read(&mut buf).await, Ok(n) if n > 0) {}
        });
        address
    }

    #[tokio::test]
    async fn test_absurd_sector_count_rejected() {
        let host_key = HostKey::from_bytes([7; 32]);
        let address = unresponsive_host(host_key, Some(u64::MAX)).await;

        let result = TcpSession::connect(&address, &contract(host_key), TIMEOUT, TIMEOUT).await;

        assert!(matches!(result, Err(HostError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_silent_handshake_times_out() {
        let host_key = HostKey::from_bytes([7; 32]);
        let address = unresponsive_host(host_key, None).await;

        let result = TcpSession::connect(&address, &contract(host_key), TIMEOUT, TIMEOUT).await;

        assert!(matches!(result, Err(HostError::Timeout)));
    }

    #[tokio::test]
    async fn test_stalled_listing_times_out() {
        let host_key = HostKey::from_bytes([7; 32]);
        let address = unresponsive_host(host_key, Some(MAX_CONTRACT_SECTORS)).await;

        let mut session = TcpSession::connect(&address, &contract(host_key), TIMEOUT, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(session.num_sectors(), MAX_CONTRACT_SECTORS);

        let err = session.sector_roots().await.unwrap_err();
        assert!(matches!(err, HostError::Timeout));
    }
}
