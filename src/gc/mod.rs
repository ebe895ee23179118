//! Garbage Collection Module - deletes sectors no metafile references
//!
//! A cycle scans every metafile under a directory, lists every host's sector
//! roots, subtracts the referenced roots to find garbage, asks for
//! confirmation, and then compiles each host's garbage into swap/trim writes.
//!
//! Only an unreadable metafile aborts the cycle. Everything that goes wrong
//! with a single host is recorded as that host's outcome and the cycle carries
//! on with the others.

mod confirm;
mod engine;
mod executor;
mod index;
mod planner;
mod reconcile;
mod report;
mod scanner;

#[cfg(test)]
pub(crate) mod testing;

pub use confirm::{AlwaysConfirm, AlwaysDeny, Confirm, PromptConfirm};
pub use engine::{CycleOutcome, CyclePhase, GarbageCollector, DEFAULT_PARALLELISM};
pub use executor::{delete_from_host, delete_garbage, CancellationFlag, HostOutcome};
pub use index::{list_host, list_hosts, HostListing, HostSectorMap};
pub use planner::{plan_deletion, swap_count};
pub use reconcile::{reconcile, GarbageSet, GcSummary, Reconciliation};
pub use report::{ConsoleReporter, GcReport, HostReport, Reporter};
pub use scanner::{scan_metadir, JsonMetaReader, MetaReader, ScanResult};

use crate::host::HostError;
use crate::storage::StorageError;

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a whole cycle
#[derive(Error, Debug)]
pub enum GcError {
    #[error("Could not read metafile {}: {source}", .path.display())]
    MetadataUnreadable {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Step at which a host dropped out of the cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Resolve,
    Connect,
    List,
    Write,
}

impl FailureStage {
    /// Whether the host could not be reached at all
    pub fn is_unreachable(&self) -> bool {
        matches!(self, FailureStage::Resolve | FailureStage::Connect)
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureStage::Resolve => "could not resolve host",
            FailureStage::Connect => "could not connect to host",
            FailureStage::List => "could not download sector roots",
            FailureStage::Write => "deletion failed",
        };
        f.write_str(s)
    }
}

/// A host-scoped failure; never propagates past the host boundary
#[derive(Error, Debug)]
#[error("{stage}: {source}")]
pub struct HostFailure {
    pub stage: FailureStage,
    #[source]
    pub source: HostError,
}

impl HostFailure {
    pub fn new(stage: FailureStage, source: HostError) -> Self {
        Self { stage, source }
    }
}
