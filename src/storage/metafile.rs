//! Metafiles - per-file records of which hosts store which sectors

use super::StorageError;
use crate::crypto::{HostKey, SectorRoot, SEGMENT_SIZE};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Extension used for metafiles on disk
pub const METAFILE_EXT: &str = "usa";

const METAFILE_VERSION: u32 = 2;

/// Metadata for one uploaded file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    /// Format version
    pub version: u32,

    /// Original file size (bytes)
    pub filesize: u64,

    /// Unix permission bits of the original file
    pub mode: u32,

    /// Last modification time of the original file
    pub mod_time: DateTime<Utc>,

    /// Minimum number of shards needed to recover the file
    pub min_shards: usize,

    /// Hosts storing shards, parallel to `shards`
    pub hosts: Vec<HostKey>,

    /// Ordered sector slices per host
    pub shards: Vec<Vec<SectorSlice>>,
}

/// A contiguous run of segments within one stored sector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorSlice {
    pub merkle_root: SectorRoot,
    pub segment_index: u32,
    pub num_segments: u32,
}

impl MetaFile {
    /// Create an empty metafile for the given host set
    pub fn new(min_shards: usize, hosts: Vec<HostKey>) -> Self {
        let shards = vec![Vec::new(); hosts.len()];
        Self {
            version: METAFILE_VERSION,
            filesize: 0,
            mode: 0o644,
            mod_time: Utc::now(),
            min_shards,
            hosts,
            shards,
        }
    }

    /// Read and validate a metafile
    pub fn read(path: &Path) -> Result<Self, StorageError> {
        let data = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::FileNotFound(path.display().to_string()),
            _ => StorageError::Io(e),
        })?;

        let meta: MetaFile =
            serde_json::from_slice(&data).map_err(|e| StorageError::InvalidMetaFile {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        meta.validate().map_err(|reason| StorageError::InvalidMetaFile {
            path: path.display().to_string(),
            reason,
        })?;

        Ok(meta)
    }

    /// Write the metafile, replacing any existing file atomically
    pub fn write(&self, path: &Path) -> Result<(), StorageError> {
        let data = serde_json::to_vec_pretty(self)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let tmp_path = path.with_extension(format!("{}_tmp", METAFILE_EXT));
        std::fs::write(&tmp_path, data)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), String> {
        if self.shards.len() != self.hosts.len() {
            return Err(format!(
                "{} hosts but {} shard lists",
                self.hosts.len(),
                self.shards.len()
            ));
        }
        if self.min_shards == 0 || self.min_shards > self.hosts.len() {
            return Err(format!(
                "min_shards {} out of range for {} hosts",
                self.min_shards,
                self.hosts.len()
            ));
        }
        Ok(())
    }

    /// Hosts paired with the sector slices they hold for this file
    pub fn host_shards(&self) -> impl Iterator<Item = (&HostKey, &[SectorSlice])> {
        self.hosts
            .iter()
            .zip(self.shards.iter().map(Vec::as_slice))
    }

    /// Bytes uploaded across all hosts
    pub fn uploaded_bytes(&self) -> u64 {
        self.shards
            .iter()
            .flatten()
            .map(|s| s.num_segments as u64 * SEGMENT_SIZE as u64)
            .sum()
    }

    /// Summary of size and redundancy
    pub fn info(&self) -> MetaInfo {
        let uploaded = self.uploaded_bytes();
        let redundancy = self.hosts.len() as f64 / self.min_shards as f64;
        let mut pct_full_redundancy =
            100.0 * uploaded as f64 / (self.filesize as f64 * redundancy);
        if self.filesize == 0 || pct_full_redundancy > 100.0 {
            pct_full_redundancy = 100.0;
        }

        MetaInfo {
            filesize: self.filesize,
            min_shards: self.min_shards,
            hosts: self.hosts.clone(),
            redundancy,
            uploaded_bytes: uploaded,
            pct_full_redundancy,
        }
    }
}

/// Human-facing summary of a metafile
#[derive(Debug, Clone)]
pub struct MetaInfo {
    pub filesize: u64,
    pub min_shards: usize,
    pub hosts: Vec<HostKey>,
    pub redundancy: f64,
    pub uploaded_bytes: u64,
    pub pct_full_redundancy: f64,
}

impl fmt::Display for MetaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Filesize:   {}", filesize_units(self.filesize))?;
        writeln!(
            f,
            "Redundancy: {}-of-{} ({:.2}x replication)",
            self.min_shards,
            self.hosts.len(),
            self.redundancy
        )?;
        writeln!(
            f,
            "Uploaded:   {} ({:.2}% of full redundancy)",
            filesize_units(self.uploaded_bytes),
            self.pct_full_redundancy
        )?;
        writeln!(f, "Hosts:")?;
        for host in &self.hosts {
            writeln!(f, "    {}", host)?;
        }
        Ok(())
    }
}

/// Render a byte count in decimal units, one more decimal place per unit step
pub fn filesize_units(size: u64) -> String {
    if size == 0 {
        return "0 B".to_string();
    }
    const SIZES: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];
    let i = (((size as f64).log10() / 3.0) as usize).min(SIZES.len() - 1);
    let scaled = size as f64 / 10f64.powi(3 * i as i32);
    format!("{:.*} {}", i, scaled, SIZES[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn slice(seed: &[u8], num_segments: u32) -> SectorSlice {
        SectorSlice {
            merkle_root: SectorRoot::of_sector(seed),
            segment_index: 0,
            num_segments,
        }
    }

    #[test]
    fn test_write_read_metafile() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("file.usa");

        let hosts = vec![HostKey::from_bytes([1; 32]), HostKey::from_bytes([2; 32])];
        let mut meta = MetaFile::new(1, hosts);
        meta.filesize = 128;
        meta.shards[0].push(slice(b"a", 2));
        meta.shards[1].push(slice(b"b", 2));
        meta.write(&path).unwrap();

        let read = MetaFile::read(&path).unwrap();
        assert_eq!(read, meta);
    }

    #[test]
    fn test_read_rejects_mismatched_shards() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.usa");

        let mut meta = MetaFile::new(1, vec![HostKey::from_bytes([1; 32])]);
        meta.shards.push(Vec::new());
        std::fs::write(&path, serde_json::to_vec(&meta).unwrap()).unwrap();

        let err = MetaFile::read(&path).unwrap_err();
        assert!(matches!(err, StorageError::InvalidMetaFile { .. }));
    }

    #[test]
    fn test_read_garbage_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("garbage.usa");
        std::fs::write(&path, b"not json").unwrap();

        assert!(matches!(
            MetaFile::read(&path),
            Err(StorageError::InvalidMetaFile { .. })
        ));
        assert!(matches!(
            MetaFile::read(&temp_dir.path().join("missing.usa")),
            Err(StorageError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_info_redundancy() {
        let hosts = vec![
            HostKey::from_bytes([1; 32]),
            HostKey::from_bytes([2; 32]),
            HostKey::from_bytes([3; 32]),
        ];
        let mut meta = MetaFile::new(1, hosts);
        meta.filesize = 64;
        meta.shards[0].push(slice(b"a", 1));

        let info = meta.info();
        assert_eq!(info.redundancy, 3.0);
        assert_eq!(info.uploaded_bytes, 64);
        assert!((info.pct_full_redundancy - 100.0 / 3.0).abs() < 1e-9);

        meta.filesize = 0;
        assert_eq!(meta.info().pct_full_redundancy, 100.0);
    }

    #[test]
    fn test_filesize_units() {
        assert_eq!(filesize_units(0), "0 B");
        assert_eq!(filesize_units(999), "999 B");
        assert_eq!(filesize_units(1_500), "1.5 KB");
        assert_eq!(filesize_units(4_194_304), "4.19 MB");
        assert_eq!(filesize_units(2_000_000_000), "2.000 GB");
    }
}
