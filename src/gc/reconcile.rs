//! Reconciliation - listed sectors minus referenced sectors

use super::{HostListing, ScanResult};
use crate::crypto::{HostKey, SectorRoot};
use crate::storage::{filesize_units, SECTOR_SIZE};

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Unreferenced sectors of one host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GarbageSet {
    /// Sector count of the listing the indices refer to
    pub original_count: u64,
    /// `(root, index)` pairs, sorted by index
    pub entries: Vec<(SectorRoot, u64)>,
}

impl GarbageSet {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn indices(&self) -> Vec<u64> {
        self.entries.iter().map(|(_, index)| *index).collect()
    }

    pub fn roots(&self) -> impl Iterator<Item = &SectorRoot> {
        self.entries.iter().map(|(root, _)| root)
    }
}

/// Totals shown before asking for confirmation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GcSummary {
    pub files_scanned: usize,
    /// Shard references seen in metafiles, not deduplicated
    pub referenced_count: u64,
    /// Sectors stored on the listed hosts
    pub original_count: u64,
    /// Hosts whose roots were downloaded
    pub host_count: usize,
    pub garbage_count: u64,
    pub garbage_bytes: u64,
}

impl fmt::Display for GcSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Cross-referenced {} sectors in {} metafiles with {} sectors stored on {} hosts.",
            self.referenced_count, self.files_scanned, self.original_count, self.host_count
        )?;
        write!(
            f,
            "{} unreferenced sectors ({}) will be deleted.",
            self.garbage_count,
            filesize_units(self.garbage_bytes)
        )
    }
}

/// Garbage per listed host plus the cycle totals
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub garbage: BTreeMap<HostKey, GarbageSet>,
    pub summary: GcSummary,
}

impl Reconciliation {
    pub fn has_garbage(&self) -> bool {
        self.summary.garbage_count > 0
    }
}

/// Subtract every referenced root from every listed host's sectors.
///
/// Unreachable hosts take no part; referenced roots missing from a listing
/// are ignored.
pub fn reconcile(
    scan: &ScanResult,
    listings: &BTreeMap<HostKey, HostListing>,
) -> Reconciliation {
    let mut reconciliation = Reconciliation::default();
    reconciliation.summary.files_scanned = scan.files_scanned;
    reconciliation.summary.referenced_count = scan.shard_references;

    for (host_key, listing) in listings {
        let Some(map) = listing.sector_map() else {
            continue;
        };

        let mut entries: Vec<(SectorRoot, u64)> = map
            .iter()
            .filter(|(root, _)| !scan.is_referenced(host_key, root))
            .map(|(root, index)| (*root, index))
            .collect();
        entries.sort_unstable_by_key(|(_, index)| *index);

        if !entries.is_empty() {
            tracing::info!(
                host = %host_key.short_key(),
                garbage = entries.len(),
                sectors = map.original_count(),
                "Found unreferenced sectors"
            );
        }

        let summary = &mut reconciliation.summary;
        summary.host_count += 1;
        summary.original_count += map.original_count();
        summary.garbage_count += entries.len() as u64;

        reconciliation.garbage.insert(
            *host_key,
            GarbageSet {
                original_count: map.original_count(),
                entries,
            },
        );
    }

    reconciliation.summary.garbage_bytes = reconciliation.summary.garbage_count * SECTOR_SIZE;
    reconciliation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::{FailureStage, HostFailure, HostSectorMap};
    use crate::host::HostError;
    use crate::storage::{MetaFile, SectorSlice};

    fn root(b: u8) -> SectorRoot {
        SectorRoot::from_bytes([b; 32])
    }

    fn scan_of(host_key: HostKey, roots: &[SectorRoot]) -> ScanResult {
        let mut meta = MetaFile::new(1, vec![host_key]);
        meta.shards[0] = roots
            .iter()
            .map(|r| SectorSlice {
                merkle_root: *r,
                segment_index: 0,
                num_segments: 64,
            })
            .collect();
        let mut scan = ScanResult::default();
        scan.add_metafile(&meta);
        scan
    }

    fn listed(roots: &[SectorRoot]) -> HostListing {
        HostListing::Listed(HostSectorMap::from_roots(roots))
    }

    #[test]
    fn test_garbage_is_set_difference() {
        let host = HostKey::from_bytes([1; 32]);
        let scan = scan_of(host, &[root(0), root(2), root(4)]);
        let listings = BTreeMap::from([(
            host,
            listed(&[root(0), root(1), root(2), root(3), root(4)]),
        )]);

        let result = reconcile(&scan, &listings);
        let garbage = &result.garbage[&host];

        assert_eq!(garbage.indices(), vec![1, 3]);
        assert_eq!(garbage.original_count, 5);
        assert_eq!(result.summary.garbage_count, 2);
        assert_eq!(result.summary.garbage_bytes, 2 * SECTOR_SIZE);
        assert_eq!(result.summary.original_count, 5);
        assert_eq!(result.summary.host_count, 1);
        assert!(result.has_garbage());
    }

    #[test]
    fn test_superset_of_references_yields_no_garbage() {
        let host = HostKey::from_bytes([1; 32]);
        // root(9) is referenced but not stored
        let scan = scan_of(host, &[root(0), root(1), root(9)]);
        let listings = BTreeMap::from([(host, listed(&[root(0), root(1)]))]);

        let result = reconcile(&scan, &listings);
        assert!(!result.has_garbage());
        assert!(result.garbage[&host].is_empty());
    }

    #[test]
    fn test_references_are_per_host() {
        let host_a = HostKey::from_bytes([1; 32]);
        let host_b = HostKey::from_bytes([2; 32]);
        let scan = scan_of(host_a, &[root(0)]);
        let listings = BTreeMap::from([(host_a, listed(&[root(0)])), (host_b, listed(&[root(0)]))]);

        let result = reconcile(&scan, &listings);
        assert!(result.garbage[&host_a].is_empty());
        assert_eq!(result.garbage[&host_b].indices(), vec![0]);
    }

    #[test]
    fn test_unreachable_hosts_excluded() {
        let host_a = HostKey::from_bytes([1; 32]);
        let host_b = HostKey::from_bytes([2; 32]);
        let scan = ScanResult::default();
        let listings = BTreeMap::from([
            (host_a, listed(&[root(0), root(1)])),
            (
                host_b,
                HostListing::Unreachable(HostFailure::new(
                    FailureStage::Connect,
                    HostError::Timeout,
                )),
            ),
        ]);

        let result = reconcile(&scan, &listings);
        assert_eq!(result.garbage.len(), 1);
        assert_eq!(result.summary.host_count, 1);
        assert_eq!(result.summary.garbage_count, 2);
    }

    #[test]
    fn test_summary_display() {
        let summary = GcSummary {
            files_scanned: 3,
            referenced_count: 12,
            original_count: 20,
            host_count: 2,
            garbage_count: 8,
            garbage_bytes: 8 * SECTOR_SIZE,
        };
        assert_eq!(
            summary.to_string(),
            "Cross-referenced 12 sectors in 3 metafiles with 20 sectors stored on 2 hosts.\n\
             8 unreferenced sectors (33.55 MB) will be deleted."
        );
    }
}
