//! Parallel deduplicating batch using Rayon.
//!
//! Only files of equal size can be identical, so requests are grouped by
//! source size and each group runs sequentially, in input order, against its
//! own size bucket and hash cache. Groups run concurrently. Two groups may
//! race for the same versioned name; `copy_and_version` claims names with a
//! no-clobber link, so the loser simply takes the next slot.
//!
//! Links are bound after all content is resolved, sequentially and in input
//! order, so the last request for a destination wins exactly as in the
//! sequential batch.
//!
//! # Thread Pool Configuration
//!
//! To preserve system resources, threads default to half of the CPU cores,
//! capped at [`MAX_BATCH_THREADS`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, info, instrument};

use crate::descriptor::CopyDescriptor;
use crate::link::{bind, bind_direct};
use crate::resolver::{match_candidates, HashCache};
use crate::store::{DataStore, PreparedBatch, StoredPaths};
use crate::{IoContext, Result};

// ============================================================================
// Thread Pool Configuration
// ============================================================================

/// Maximum threads for a parallel batch
pub const MAX_BATCH_THREADS: usize = 4;

/// Calculate default thread count: min(cpu_cores / 2, MAX_BATCH_THREADS)
pub fn default_thread_count() -> usize {
    (num_cpus::get() / 2).clamp(1, MAX_BATCH_THREADS)
}

fn create_thread_pool(threads: Option<usize>) -> Result<ThreadPool> {
    let num_threads = threads.unwrap_or_else(default_thread_count).max(1);
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("vfiles-batch-{}", i))
        .build()?)
}

// ============================================================================
// Parallel Batch
// ============================================================================

/// Requests sharing one source size, with that size's candidates.
struct SizeGroup {
    /// Request positions in input order
    members: Vec<usize>,
    bucket: Vec<PathBuf>,
}

/// Outcome of one request inside a group.
struct Resolved {
    position: usize,
    stored: PathBuf,
    is_new: bool,
}

impl DataStore {
    /// Same contract as [`DataStore::copy_deduplicated`], with content
    /// resolution spread over a thread pool.
    ///
    /// On failure no destination links are touched; files already stored by
    /// other groups stay in the data directory and are found again on the
    /// next run.
    #[instrument(skip(self, requests), fields(requests = requests.len()), level = "debug")]
    pub fn copy_deduplicated_parallel(
        &self,
        requests: &[CopyDescriptor],
        dest_root: &Path,
    ) -> Result<StoredPaths> {
        let PreparedBatch {
            dest_paths,
            mut index,
        } = self.prepare(requests, dest_root)?;

        let mut by_size: HashMap<u64, Vec<usize>> = HashMap::new();
        for (position, request) in requests.iter().enumerate() {
            if request.link_in_place() {
                continue;
            }
            let source = request.source();
            let size = fs::metadata(source).at("stat", source)?.len();
            by_size.entry(size).or_default().push(position);
        }

        let groups: Vec<SizeGroup> = by_size
            .into_iter()
            .map(|(size, members)| SizeGroup {
                members,
                bucket: index.take_bucket(size),
            })
            .collect();
        debug!(groups = groups.len(), "grouped requests by size");

        let pool = create_thread_pool(self.options.threads)?;
        let resolved: Vec<Vec<Resolved>> = pool.install(|| {
            groups
                .into_par_iter()
                .map(|group| self.resolve_group(group, requests, &dest_paths))
                .collect::<Result<Vec<_>>>()
        })?;

        let mut stored_at: Vec<Option<PathBuf>> = vec![None; requests.len()];
        let mut stored_new = 0usize;
        for r in resolved.into_iter().flatten() {
            if r.is_new {
                stored_new += 1;
            }
            stored_at[r.position] = Some(r.stored);
        }

        let mut output = StoredPaths::new();
        for ((request, dest_path), stored) in requests.iter().zip(&dest_paths).zip(stored_at) {
            match stored {
                Some(stored) => {
                    bind(dest_path, &stored)?;
                    output.insert(request.source().to_path_buf(), stored);
                }
                None => bind_direct(dest_path, request.source())?,
            }
        }

        info!(
            requests = requests.len(),
            stored_new,
            threads = pool.current_num_threads(),
            "parallel batch complete"
        );
        Ok(output)
    }

    fn resolve_group(
        &self,
        group: SizeGroup,
        requests: &[CopyDescriptor],
        dest_paths: &[PathBuf],
    ) -> Result<Vec<Resolved>> {
        let SizeGroup {
            members,
            mut bucket,
        } = group;
        let mut cache = HashCache::new();
        let mut out = Vec::with_capacity(members.len());

        for position in members {
            let source = requests[position].source();
            let (stored, is_new) = match match_candidates(source, &bucket, &mut cache)? {
                Some(existing) => (existing, false),
                None => {
                    let stored = self.store_new(source, &dest_paths[position])?;
                    bucket.push(stored.clone());
                    (stored, true)
                }
            };
            out.push(Resolved {
                position,
                stored,
                is_new,
            });
        }
        Ok(out)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_thread_count() {
        let n = default_thread_count();
        assert!(n >= 1 && n <= MAX_BATCH_THREADS);
    }

    #[test]
    fn test_create_thread_pool_respects_count() {
        let pool = create_thread_pool(Some(2)).unwrap();
        assert_eq!(pool.current_num_threads(), 2);
    }

    #[test]
    fn test_parallel_dedups_within_size_group() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        let mut requests = Vec::new();
        for i in 0..12 {
            let path = src.join(format!("f{}.txt", i));
            // Three distinct contents of equal size, plus unique sizes
            let content = match i % 4 {
                0 => "aaaa".to_string(),
                1 => "bbbb".to_string(),
                2 => "cccc".to_string(),
                _ => "x".repeat(10 + i),
            };
            fs::write(&path, content).unwrap();
            requests.push(CopyDescriptor::new(&path, format!("out/f{}.txt", i), false).unwrap());
        }

        let store = DataStore::new(temp.path().join("data")).unwrap();
        let stored = store
            .copy_deduplicated_parallel(&requests, &temp.path().join("dest"))
            .unwrap();

        assert_eq!(stored.len(), 12);
        assert_eq!(stored[&src.join("f0.txt")], stored[&src.join("f4.txt")]);
        assert_eq!(stored[&src.join("f1.txt")], stored[&src.join("f9.txt")]);
        assert_ne!(stored[&src.join("f0.txt")], stored[&src.join("f1.txt")]);
        // 3 shared contents + 3 unique sizes
        assert_eq!(store.stats().unwrap().file_count, 6);
    }
}
