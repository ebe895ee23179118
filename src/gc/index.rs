//! Reference index - each host's current sector layout

use super::{FailureStage, HostFailure};
use crate::crypto::{HostKey, SectorRoot};
use crate::host::{HostResolver, SessionOpener};
use crate::storage::{Contract, ContractSet};

use dashmap::DashMap;
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap};

/// Root -> position snapshot of one host's sector array
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostSectorMap {
    positions: HashMap<SectorRoot, u64>,
    original_count: u64,
}

impl HostSectorMap {
    /// Build from a listing in on-host order. A root listed twice keeps its
    /// last position.
    pub fn from_roots(roots: &[SectorRoot]) -> Self {
        let positions = roots
            .iter()
            .enumerate()
            .map(|(i, root)| (*root, i as u64))
            .collect();
        Self {
            positions,
            original_count: roots.len() as u64,
        }
    }

    /// Sector count of the host when it was listed
    pub fn original_count(&self) -> u64 {
        self.original_count
    }

    /// Number of distinct roots
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position(&self, root: &SectorRoot) -> Option<u64> {
        self.positions.get(root).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SectorRoot, u64)> {
        self.positions.iter().map(|(root, index)| (root, *index))
    }
}

/// Result of listing one host
#[derive(Debug)]
pub enum HostListing {
    Listed(HostSectorMap),
    Unreachable(HostFailure),
}

impl HostListing {
    pub fn sector_map(&self) -> Option<&HostSectorMap> {
        match self {
            HostListing::Listed(map) => Some(map),
            HostListing::Unreachable(_) => None,
        }
    }
}

/// Download one host's sector roots. Failures are returned as
/// `HostListing::Unreachable`, never as an error.
pub async fn list_host(
    contract: &Contract,
    resolver: &dyn HostResolver,
    opener: &dyn SessionOpener,
) -> HostListing {
    let host_key = contract.host_key;

    let address = match resolver.resolve(&host_key).await {
        Ok(address) => address,
        Err(e) => return unreachable(&host_key, HostFailure::new(FailureStage::Resolve, e)),
    };

    let mut session = match opener.open(&address, contract).await {
        Ok(session) => session,
        Err(e) => return unreachable(&host_key, HostFailure::new(FailureStage::Connect, e)),
    };

    let listed = session.sector_roots().await;
    if let Err(e) = session.close().await {
        tracing::debug!(host = %host_key, "Error closing session: {}", e);
    }

    match listed {
        Ok(roots) => {
            let map = HostSectorMap::from_roots(&roots);
            tracing::info!(
                host = %host_key.short_key(),
                sectors = map.original_count(),
                "Downloaded sector roots"
            );
            HostListing::Listed(map)
        }
        Err(e) => unreachable(&host_key, HostFailure::new(FailureStage::List, e)),
    }
}

fn unreachable(host_key: &HostKey, failure: HostFailure) -> HostListing {
    tracing::warn!(
        host = %host_key.short_key(),
        "Could not download sector roots from host: {}",
        failure
    );
    HostListing::Unreachable(failure)
}

/// List every contracted host, up to `parallelism` at a time
pub async fn list_hosts(
    contracts: &ContractSet,
    resolver: &dyn HostResolver,
    opener: &dyn SessionOpener,
    parallelism: usize,
) -> BTreeMap<HostKey, HostListing> {
    let listings = DashMap::new();

    futures::stream::iter(contracts.iter())
        .for_each_concurrent(parallelism.max(1), |contract| {
            let listings = &listings;
            async move {
                let listing = list_host(contract, resolver, opener).await;
                listings.insert(contract.host_key, listing);
            }
        })
        .await;

    listings.into_iter().collect()
}
