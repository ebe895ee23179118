//! Cycle report and its console rendering

use super::{CycleOutcome, GcSummary, HostOutcome};
use crate::crypto::HostKey;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::{self, Write};
use uuid::Uuid;

/// What happened to one host
#[derive(Debug)]
pub struct HostReport {
    /// Sector count at listing time; `None` if the host was never listed
    pub original_count: Option<u64>,
    pub garbage_count: u64,
    pub outcome: HostOutcome,
}

/// Result of one garbage collection cycle
#[derive(Debug)]
pub struct GcReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: CycleOutcome,
    pub summary: GcSummary,
    pub hosts: BTreeMap<HostKey, HostReport>,
}

impl GcReport {
    pub fn new(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: started_at,
            outcome: CycleOutcome::NothingToDelete,
            summary: GcSummary::default(),
            hosts: BTreeMap::new(),
        }
    }

    /// Sectors actually removed across all hosts
    pub fn total_deleted(&self) -> u64 {
        self.hosts
            .values()
            .map(|h| match h.outcome {
                HostOutcome::Deleted(n) => n,
                _ => 0,
            })
            .sum()
    }

    pub fn hosts_deleted(&self) -> usize {
        self.count(|o| matches!(o, HostOutcome::Deleted(_)))
    }

    pub fn hosts_failed(&self) -> usize {
        self.count(HostOutcome::is_failed)
    }

    pub fn hosts_skipped(&self) -> usize {
        self.count(|o| matches!(o, HostOutcome::Skipped))
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    fn count(&self, pred: impl Fn(&HostOutcome) -> bool) -> usize {
        self.hosts.values().filter(|h| pred(&h.outcome)).count()
    }
}

/// Receives every host outcome once the cycle ends, then the final report
pub trait Reporter: Send + Sync {
    fn host_outcome(&self, host_key: &HostKey, outcome: &HostOutcome);
    fn finish(&self, report: &GcReport);
}

/// Writes the user-facing report lines
pub struct ConsoleReporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleReporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    fn emit(&self, line: &str) {
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            tracing::debug!("Could not write report line: {}", e);
        }
    }
}

impl Reporter for ConsoleReporter {
    fn host_outcome(&self, host_key: &HostKey, outcome: &HostOutcome) {
        self.emit(&format!("{}: {}", host_key.short_key(), outcome));
    }

    fn finish(&self, report: &GcReport) {
        let line = match report.outcome {
            CycleOutcome::NothingToDelete => "No unreferenced sectors found.".to_string(),
            CycleOutcome::Cancelled => "Garbage collection cancelled; nothing was deleted.".to_string(),
            CycleOutcome::Completed => {
                let mut line = format!(
                    "Deleted {} of {} unreferenced sectors on {} hosts.",
                    report.total_deleted(),
                    report.summary.garbage_count,
                    report.hosts_deleted()
                );
                if report.hosts_failed() > 0 {
                    line.push_str(&format!(" {} hosts failed.", report.hosts_failed()));
                }
                if report.hosts_skipped() > 0 {
                    line.push_str(&format!(" {} hosts skipped.", report.hosts_skipped()));
                }
                line
            }
        };
        self.emit(&line);
    }
}
