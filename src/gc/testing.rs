//! In-memory hosts for exercising the cycle without sockets

use super::{Confirm, GcReport, GcSummary, HostOutcome, Reporter};
use crate::crypto::{random_32_bytes, ContractId, HostKey, SectorRoot, SigningKeyPair};
use crate::host::{HostError, HostSession, SectorArray, SessionOpener, StaticResolver, WriteAction};
use crate::storage::{Contract, ContractSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct FakeHost {
    pub host_key: HostKey,
    pub sectors: Arc<Mutex<SectorArray>>,
    pub fail_list: bool,
    pub fail_writes: bool,
}

impl FakeHost {
    pub fn new(host_key: HostKey, roots: Vec<SectorRoot>) -> Self {
        Self {
            host_key,
            sectors: Arc::new(Mutex::new(SectorArray::from_roots(roots))),
            fail_list: false,
            fail_writes: false,
        }
    }

    pub fn roots(&self) -> Vec<SectorRoot> {
        self.sectors.lock().roots().to_vec()
    }
}

struct FakeSession {
    host: FakeHost,
    writes: Arc<AtomicUsize>,
}

#[async_trait]
impl HostSession for FakeSession {
    fn host_key(&self) -> &HostKey {
        &self.host.host_key
    }

    fn num_sectors(&self) -> u64 {
        self.host.sectors.lock().len()
    }

    async fn sector_roots(&mut self) -> Result<Vec<SectorRoot>, HostError> {
        if self.host.fail_list {
            return Err(HostError::Protocol("listing refused".to_string()));
        }
        Ok(self.host.roots())
    }

    async fn write(&mut self, actions: &[WriteAction]) -> Result<u64, HostError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.host.fail_writes {
            return Err(HostError::ConnectionFailed("reset by peer".to_string()));
        }
        let mut sectors = self.host.sectors.lock();
        sectors
            .apply(actions)
            .map_err(|e| HostError::Protocol(e.to_string()))?;
        Ok(sectors.len())
    }

    async fn close(&mut self) -> Result<(), HostError> {
        Ok(())
    }
}

/// Hosts keyed by address; counts opened sessions and write batches
#[derive(Default)]
pub struct FakeNetwork {
    hosts: HashMap<String, FakeHost>,
    pub opened: AtomicUsize,
    pub writes: Arc<AtomicUsize>,
}

impl FakeNetwork {
    pub fn add(&mut self, address: &str, host: FakeHost) {
        self.hosts.insert(address.to_string(), host);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionOpener for FakeNetwork {
    async fn open(
        &self,
        address: &str,
        _contract: &Contract,
    ) -> Result<Box<dyn HostSession>, HostError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let host = self
            .hosts
            .get(address)
            .cloned()
            .ok_or_else(|| HostError::ConnectionFailed(format!("{}: connection refused", address)))?;
        Ok(Box::new(FakeSession {
            host,
            writes: Arc::clone(&self.writes),
        }))
    }
}

/// Confirm with a fixed answer, remembering what it was shown
pub struct RecordingConfirm {
    answer: bool,
    pub seen: Mutex<Vec<GcSummary>>,
}

impl RecordingConfirm {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }
}

impl Confirm for RecordingConfirm {
    fn confirm(&self, summary: &GcSummary) -> bool {
        self.seen.lock().push(*summary);
        self.answer
    }
}

/// Reporter that keeps the rendered host lines
#[derive(Default)]
pub struct RecordingReporter {
    pub lines: Mutex<Vec<String>>,
    pub finished: AtomicUsize,
}

impl Reporter for RecordingReporter {
    fn host_outcome(&self, host_key: &HostKey, outcome: &HostOutcome) {
        self.lines
            .lock()
            .push(format!("{}: {}", host_key.short_key(), outcome));
    }

    fn finish(&self, _report: &GcReport) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn root(b: u8) -> SectorRoot {
    SectorRoot::from_bytes([b; 32])
}

pub fn contract(host_key: HostKey) -> Contract {
    Contract::new(
        ContractId::from_bytes(random_32_bytes()),
        host_key,
        SigningKeyPair::generate(),
    )
}

/// Contracts and a resolver for `(address, host)` pairs
pub fn wire(hosts: &[(&str, HostKey)]) -> (ContractSet, StaticResolver) {
    let contracts = hosts.iter().map(|(_, key)| contract(*key)).collect();
    let resolver = hosts
        .iter()
        .map(|(address, key)| (*key, address.to_string()))
        .collect();
    (contracts, resolver)
}
