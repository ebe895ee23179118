//! Cycle driver - scan, list, reconcile, confirm, delete

use super::{
    delete_garbage, list_hosts, reconcile, scan_metadir, CancellationFlag, Confirm,
    ConsoleReporter, GcError, GcReport, GcSummary, HostListing, HostOutcome, HostReport,
    JsonMetaReader, MetaReader, Reporter, ScanResult,
};
use crate::host::{HostResolver, SessionOpener};
use crate::storage::ContractSet;

use chrono::Utc;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Default number of hosts contacted at once
pub const DEFAULT_PARALLELISM: usize = 4;

/// Where a cycle currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Scanning,
    Listing,
    Reconciling,
    AwaitingConfirmation,
    Deleting,
    Done,
    Cancelled,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CyclePhase::Scanning => "scanning",
            CyclePhase::Listing => "listing",
            CyclePhase::Reconciling => "reconciling",
            CyclePhase::AwaitingConfirmation => "awaiting confirmation",
            CyclePhase::Deleting => "deleting",
            CyclePhase::Done => "done",
            CyclePhase::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No listed host had garbage; no writes were attempted
    NothingToDelete,
    /// Confirmation was refused or the cycle was interrupted before deleting
    Cancelled,
    /// Deletion was attempted on every host with garbage
    Completed,
}

/// Runs garbage collection cycles against a set of contracted hosts
pub struct GarbageCollector {
    resolver: Arc<dyn HostResolver>,
    opener: Arc<dyn SessionOpener>,
    reader: Arc<dyn MetaReader>,
    confirm: Arc<dyn Confirm>,
    reporter: Arc<dyn Reporter>,
    parallelism: usize,
    cancel: CancellationFlag,
}

impl GarbageCollector {
    pub fn new(
        resolver: Arc<dyn HostResolver>,
        opener: Arc<dyn SessionOpener>,
        confirm: Arc<dyn Confirm>,
    ) -> Self {
        Self {
            resolver,
            opener,
            reader: Arc::new(JsonMetaReader),
            confirm,
            reporter: Arc::new(ConsoleReporter::stdout()),
            parallelism: DEFAULT_PARALLELISM,
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_reader(mut self, reader: Arc<dyn MetaReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Hosts contacted at once; 1 is sequential
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancel
    }

    /// Run one cycle over the metafiles under `meta_dir`.
    ///
    /// Only an unreadable metafile fails the cycle, and it does so before any
    /// host is contacted. Host failures are part of the report.
    pub async fn run(&self, contracts: &ContractSet, meta_dir: &Path) -> Result<GcReport, GcError> {
        let mut report = GcReport::new(Uuid::new_v4(), Utc::now());
        tracing::info!(
            run_id = %report.run_id,
            hosts = contracts.len(),
            "Starting garbage collection in {}",
            meta_dir.display()
        );

        self.enter(CyclePhase::Scanning);
        let scan = self.scan(meta_dir).await?;

        self.enter(CyclePhase::Listing);
        let listings = list_hosts(
            contracts,
            self.resolver.as_ref(),
            self.opener.as_ref(),
            self.parallelism,
        )
        .await;

        self.enter(CyclePhase::Reconciling);
        let reconciliation = reconcile(&scan, &listings);
        report.summary = reconciliation.summary;

        for (host_key, listing) in listings {
            let host_report = match listing {
                HostListing::Listed(map) => HostReport {
                    original_count: Some(map.original_count()),
                    garbage_count: reconciliation
                        .garbage
                        .get(&host_key)
                        .map_or(0, |g| g.len() as u64),
                    outcome: HostOutcome::NothingToDelete,
                },
                HostListing::Unreachable(failure) => HostReport {
                    original_count: None,
                    garbage_count: 0,
                    outcome: HostOutcome::Failed(failure),
                },
            };
            report.hosts.insert(host_key, host_report);
        }

        if !reconciliation.has_garbage() {
            tracing::info!("No unreferenced sectors found");
            self.enter(CyclePhase::Done);
            return Ok(self.finish(report, CycleOutcome::NothingToDelete));
        }

        self.enter(CyclePhase::AwaitingConfirmation);
        let approved = self.await_confirmation(reconciliation.summary).await?;

        if !approved || self.cancel.is_cancelled() {
            tracing::info!(approved, "Garbage collection aborted before deleting");
            self.skip_pending(&mut report);
            self.enter(CyclePhase::Cancelled);
            return Ok(self.finish(report, CycleOutcome::Cancelled));
        }

        self.enter(CyclePhase::Deleting);
        let outcomes = delete_garbage(
            contracts,
            &reconciliation.garbage,
            self.resolver.as_ref(),
            self.opener.as_ref(),
            self.parallelism,
            &self.cancel,
        )
        .await;
        for (host_key, outcome) in outcomes {
            if let Some(host_report) = report.hosts.get_mut(&host_key) {
                host_report.outcome = outcome;
            }
        }

        self.enter(CyclePhase::Done);
        Ok(self.finish(report, CycleOutcome::Completed))
    }

    async fn scan(&self, meta_dir: &Path) -> Result<ScanResult, GcError> {
        let reader = Arc::clone(&self.reader);
        let dir = meta_dir.to_path_buf();
        tokio::task::spawn_blocking(move || scan_metadir(&dir, reader.as_ref()))
            .await
            .map_err(|e| GcError::Task(e.to_string()))?
    }

    /// Ask for confirmation. Cancelling while the prompt is open counts as a
    /// refusal; the blocked prompt thread is abandoned.
    async fn await_confirmation(&self, summary: GcSummary) -> Result<bool, GcError> {
        if self.cancel.is_cancelled() {
            return Ok(false);
        }
        let confirm = Arc::clone(&self.confirm);
        let prompt = tokio::task::spawn_blocking(move || confirm.confirm(&summary));
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(false),
            answer = prompt => answer.map_err(|e| GcError::Task(e.to_string())),
        }
    }

    /// Hosts that had garbage but were never written to
    fn skip_pending(&self, report: &mut GcReport) {
        for host_report in report.hosts.values_mut() {
            if host_report.garbage_count > 0 && !host_report.outcome.is_failed() {
                host_report.outcome = HostOutcome::Skipped;
            }
        }
    }

    fn finish(&self, mut report: GcReport, outcome: CycleOutcome) -> GcReport {
        report.outcome = outcome;
        report.finished_at = Utc::now();

        for (host_key, host_report) in &report.hosts {
            self.reporter.host_outcome(host_key, &host_report.outcome);
        }
        self.reporter.finish(&report);

        tracing::info!(
            run_id = %report.run_id,
            outcome = ?report.outcome,
            deleted = report.total_deleted(),
            failed = report.hosts_failed(),
            duration_ms = report.duration_ms(),
            "Garbage collection finished"
        );
        report
    }

    fn enter(&self, phase: CyclePhase) {
        tracing::debug!(%phase, "Garbage collection phase");
    }
}
