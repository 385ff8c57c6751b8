//! Size-keyed view of the data directory.
//!
//! Files whose sizes differ can never be identical, so matching only ever
//! hashes candidates from a single size bucket.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::naming::is_temp_name;
use crate::{IoContext, Result, StoreError};

/// Files in the data directory grouped by byte size.
///
/// Buckets keep insertion order: scan order first, then files stored
/// during the batch.
#[derive(Debug, Clone, Default)]
pub struct SizeIndex {
    buckets: HashMap<u64, Vec<PathBuf>>,
    known: HashSet<PathBuf>,
}

impl SizeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Candidate files of exactly `size` bytes, in insertion order.
    pub fn candidates(&self, size: u64) -> &[PathBuf] {
        self.buckets.get(&size).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Add a file, keyed by its current on-disk size.
    pub fn insert(&mut self, path: &Path) -> Result<()> {
        let size = fs::metadata(path).at("stat", path)?.len();
        self.insert_with_size(size, path.to_path_buf());
        Ok(())
    }

    /// Add a file whose size is already known. A path already indexed is
    /// left where it is.
    pub fn insert_with_size(&mut self, size: u64, path: PathBuf) {
        if self.known.insert(path.clone()) {
            self.buckets.entry(size).or_default().push(path);
        }
    }

    /// Remove and return one size bucket.
    pub(crate) fn take_bucket(&mut self, size: u64) -> Vec<PathBuf> {
        let bucket = self.buckets.remove(&size).unwrap_or_default();
        for path in &bucket {
            self.known.remove(path);
        }
        bucket
    }

    /// Total number of indexed files.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(Vec::is_empty)
    }

    /// Iterate `(size, files)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[PathBuf])> {
        self.buckets.iter().map(|(size, files)| (*size, files.as_slice()))
    }
}

/// Lists "what files of what size live in a directory".
pub trait SizeIndexProvider: Send + Sync {
    fn list_files_by_size(&self, dir: &Path) -> Result<SizeIndex>;
}

/// Scans the top level of a directory in file-name order.
///
/// Subdirectories, symlinks and in-flight temporary files are skipped.
/// A missing directory yields an empty index.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryScanner;

impl SizeIndexProvider for DirectoryScanner {
    fn list_files_by_size(&self, dir: &Path) -> Result<SizeIndex> {
        let mut index = SizeIndex::new();
        if !dir.exists() {
            return Ok(index);
        }

        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(dir).to_path_buf();
                StoreError::io("scan data directory", path, e.into())
            })?;
            if !entry.file_type().is_file() || is_temp_name(entry.file_name()) {
                continue;
            }
            let size = entry
                .metadata()
                .map_err(|e| StoreError::io("stat", entry.path(), e.into()))?
                .len();
            index.insert_with_size(size, entry.into_path());
        }

        Ok(index)
    }
}
