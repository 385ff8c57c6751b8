//! Finding a byte-identical stored file for a source.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::checksum::{hash_file, Blake3Hash};
use crate::size_index::SizeIndex;
use crate::{IoContext, Result};

/// Checksums of data-directory files computed during one batch.
#[derive(Debug, Default)]
pub struct HashCache {
    entries: HashMap<PathBuf, Blake3Hash>,
}

impl HashCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<&Blake3Hash> {
        self.entries.get(path)
    }

    /// Cached checksum of `path`, hashing and caching it on first use.
    pub fn hash(&mut self, path: &Path) -> Result<Blake3Hash> {
        if let Some(hash) = self.entries.get(path) {
            return Ok(*hash);
        }
        let hash = hash_file(path)?;
        self.entries.insert(path.to_path_buf(), hash);
        Ok(hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Look for a stored file with the same content as `source`.
///
/// Only candidates of the same size are considered; when there are none
/// nothing is hashed. Candidates are tried in index order and the first
/// match wins.
pub fn find_existing_copy(
    source: &Path,
    index: &SizeIndex,
    cache: &mut HashCache,
) -> Result<Option<PathBuf>> {
    let size = fs::metadata(source).at("stat", source)?.len();
    match_candidates(source, index.candidates(size), cache)
}

pub(crate) fn match_candidates(
    source: &Path,
    candidates: &[PathBuf],
    cache: &mut HashCache,
) -> Result<Option<PathBuf>> {
    if candidates.is_empty() {
        return Ok(None);
    }

    let source_hash = hash_file(source)?;
    for candidate in candidates {
        if cache.hash(candidate)? == source_hash {
            trace!(candidate = %candidate.display(), "content match");
            return Ok(Some(candidate.clone()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_no_candidates_hashes_nothing() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.txt");
        fs::write(&source, b"unique size").unwrap();

        let mut index = SizeIndex::new();
        index.insert_with_size(3, temp.path().join("other"));
        let mut cache = HashCache::new();

        assert_eq!(find_existing_copy(&source, &index, &mut cache).unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_first_matching_candidate_wins() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src.txt");
        let other = temp.path().join("x.v0001.txt");
        let match1 = temp.path().join("y.v0001.txt");
        let match2 = temp.path().join("z.v0001.txt");
        fs::write(&source, b"abc").unwrap();
        fs::write(&other, b"xyz").unwrap();
        fs::write(&match1, b"abc").unwrap();
        fs::write(&match2, b"abc").unwrap();

        let mut index = SizeIndex::new();
        for p in [&other, &match1, &match2] {
            index.insert(p).unwrap();
        }
        let mut cache = HashCache::new();

        let found = find_existing_copy(&source, &index, &mut cache).unwrap();
        assert_eq!(found, Some(match1.clone()));
        // Stopped at the first hit: match2 was never hashed
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&match2).is_none());
    }

    #[test]
    fn test_cache_is_consulted_before_hashing() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src.txt");
        let candidate = temp.path().join("c.v0001.txt");
        fs::write(&source, b"abc").unwrap();
        fs::write(&candidate, b"abc").unwrap();

        let mut index = SizeIndex::new();
        index.insert(&candidate).unwrap();
        let mut cache = HashCache::new();
        assert!(find_existing_copy(&source, &index, &mut cache)
            .unwrap()
            .is_some());

        // Same size, different bytes on disk now; the cached checksum still
        // describes the candidate for the rest of this batch.
        fs::write(&candidate, b"zzz").unwrap();
        assert_eq!(
            find_existing_copy(&source, &index, &mut cache).unwrap(),
            Some(candidate)
        );
    }

    #[test]
    fn test_same_size_different_content_misses() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src.txt");
        let candidate = temp.path().join("c.v0001.txt");
        fs::write(&source, b"aaaa").unwrap();
        fs::write(&candidate, b"bbbb").unwrap();

        let mut index = SizeIndex::new();
        index.insert(&candidate).unwrap();
        let mut cache = HashCache::new();

        assert_eq!(find_existing_copy(&source, &index, &mut cache).unwrap(), None);
        assert_eq!(cache.len(), 1);
    }
}
