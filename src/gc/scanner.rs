//! Metadata scanner - collects every sector root the metafiles reference

use super::GcError;
use crate::crypto::{HostKey, SectorRoot};
use crate::storage::{MetaFile, StorageError, METAFILE_EXT};

use std::collections::{HashMap, HashSet};
use std::path::Path;
use walkdir::WalkDir;

/// Reads one metafile
pub trait MetaReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<MetaFile, StorageError>;
}

/// Reads the JSON metafiles written by `MetaFile::write`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMetaReader;

impl MetaReader for JsonMetaReader {
    fn read(&self, path: &Path) -> Result<MetaFile, StorageError> {
        MetaFile::read(path)
    }
}

/// Everything the metafiles reference, per host
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub referenced: HashMap<HostKey, HashSet<SectorRoot>>,
    pub files_scanned: usize,
    /// Shard slots seen across all files. Roots shared between files are
    /// counted once per file, so this is for reporting only.
    pub shard_references: u64,
}

impl ScanResult {
    /// Record the roots of one metafile
    pub fn add_metafile(&mut self, meta: &MetaFile) {
        for (host_key, slices) in meta.host_shards() {
            self.shard_references += slices.len() as u64;
            self.referenced
                .entry(*host_key)
                .or_default()
                .extend(slices.iter().map(|s| s.merkle_root));
        }
        self.files_scanned += 1;
    }

    pub fn is_referenced(&self, host_key: &HostKey, root: &SectorRoot) -> bool {
        self.referenced
            .get(host_key)
            .is_some_and(|roots| roots.contains(root))
    }
}

/// Walk `dir` recursively and read every metafile in it.
///
/// Any unreadable entry fails the whole scan: garbage can only be identified
/// against complete knowledge of what is referenced.
pub fn scan_metadir(dir: &Path, reader: &dyn MetaReader) -> Result<ScanResult, GcError> {
    let mut result = ScanResult::default();

    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| GcError::MetadataUnreadable {
            path: e.path().unwrap_or(dir).to_path_buf(),
            source: StorageError::Io(e.into()),
        })?;

        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(METAFILE_EXT)
        {
            continue;
        }

        let meta = reader
            .read(path)
            .map_err(|source| GcError::MetadataUnreadable {
                path: path.to_path_buf(),
                source,
            })?;
        result.add_metafile(&meta);
    }

    tracing::info!(
        files = result.files_scanned,
        shard_references = result.shard_references,
        hosts = result.referenced.len(),
        "Scanned metafiles in {}",
        dir.display()
    );
    Ok(result)
}
