//! Deletion executor - applies each host's plan in one write batch

use super::{plan_deletion, FailureStage, GarbageSet, HostFailure};
use crate::crypto::HostKey;
use crate::host::{HostError, HostResolver, SessionOpener};
use crate::storage::{Contract, ContractSet};

use futures::StreamExt;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Final state of one host in a cycle
#[derive(Debug)]
pub enum HostOutcome {
    /// Garbage removed; the count of deleted sectors
    Deleted(u64),
    NothingToDelete,
    Failed(HostFailure),
    /// Not started because the cycle was cancelled
    Skipped,
}

impl HostOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, HostOutcome::Failed(_))
    }
}

impl fmt::Display for HostOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostOutcome::Deleted(n) => write!(f, "Deleted {} sectors", n),
            HostOutcome::NothingToDelete => f.write_str("Nothing to delete"),
            HostOutcome::Failed(failure) if failure.stage == FailureStage::Write => {
                write!(f, "Deletion failed: {}", failure.source)
            }
            HostOutcome::Failed(failure) => write!(f, "Failed: {}", failure),
            HostOutcome::Skipped => f.write_str("Skipped (cancelled)"),
        }
    }
}

/// Shared stop signal; hosts that have not started when it is raised are
/// skipped, batches already submitted finish
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<CancelState>);

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.0.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Delete one host's garbage.
///
/// The host is not contacted when there is nothing to delete. The session's
/// sector count must still match the listing the plan was computed from.
pub async fn delete_from_host(
    contract: &Contract,
    garbage: &GarbageSet,
    resolver: &dyn HostResolver,
    opener: &dyn SessionOpener,
    cancel: &CancellationFlag,
) -> HostOutcome {
    if garbage.is_empty() {
        return HostOutcome::NothingToDelete;
    }
    if cancel.is_cancelled() {
        return HostOutcome::Skipped;
    }

    let host_key = contract.host_key;
    let address = match resolver.resolve(&host_key).await {
        Ok(address) => address,
        Err(e) => return failed(&host_key, FailureStage::Resolve, e),
    };
    let mut session = match opener.open(&address, contract).await {
        Ok(session) => session,
        Err(e) => return failed(&host_key, FailureStage::Connect, e),
    };

    let outcome = if session.num_sectors() != garbage.original_count {
        failed(
            &host_key,
            FailureStage::Write,
            HostError::Protocol(format!(
                "sector count changed from {} to {} since listing",
                garbage.original_count,
                session.num_sectors()
            )),
        )
    } else {
        let actions = plan_deletion(&garbage.indices(), garbage.original_count);
        tracing::debug!(
            host = %host_key.short_key(),
            actions = actions.len(),
            "Submitting deletion batch"
        );
        match session.write(&actions).await {
            Ok(remaining) => {
                tracing::info!(
                    host = %host_key.short_key(),
                    deleted = garbage.len(),
                    remaining,
                    "Deleted unreferenced sectors"
                );
                HostOutcome::Deleted(garbage.len() as u64)
            }
            Err(e) => failed(&host_key, FailureStage::Write, e),
        }
    };

    if let Err(e) = session.close().await {
        tracing::debug!(host = %host_key, "Error closing session: {}", e);
    }
    outcome
}

fn failed(host_key: &HostKey, stage: FailureStage, source: HostError) -> HostOutcome {
    let failure = HostFailure::new(stage, source);
    tracing::warn!(host = %host_key.short_key(), "Deletion failed: {}", failure);
    HostOutcome::Failed(failure)
}

/// Delete garbage on every host in `garbage`, up to `parallelism` at a time
pub async fn delete_garbage(
    contracts: &ContractSet,
    garbage: &BTreeMap<HostKey, GarbageSet>,
    resolver: &dyn HostResolver,
    opener: &dyn SessionOpener,
    parallelism: usize,
    cancel: &CancellationFlag,
) -> BTreeMap<HostKey, HostOutcome> {
    futures::stream::iter(garbage.iter())
        .map(|(host_key, set)| async move {
            let outcome = match contracts.get(host_key) {
                Some(contract) => delete_from_host(contract, set, resolver, opener, cancel).await,
                None => failed(
                    host_key,
                    FailureStage::Resolve,
                    HostError::UnknownHost(format!("no contract with {}", host_key)),
                ),
            };
            (*host_key, outcome)
        })
        .buffer_unordered(parallelism.max(1))
        .collect()
        .await
}
