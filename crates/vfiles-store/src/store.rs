//! The data store handle and the deduplicating batch.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{self, Component, Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::copy::copy_and_version;
use crate::copy_strategy::{CopyStrategy, ReflinkOrCopy};
use crate::descriptor::{
    directory_descriptors, file_list_descriptors, validate_source, CopyDescriptor,
};
use crate::link::{bind, bind_direct};
use crate::naming::VersionFormat;
use crate::resolver::{find_existing_copy, HashCache};
use crate::size_index::{DirectoryScanner, SizeIndex, SizeIndexProvider};
use crate::{IoContext, Result, StoreError};

/// Source path → stored path in the data directory.
///
/// Link-in-place requests have no stored path and are absent.
pub type StoredPaths = BTreeMap<PathBuf, PathBuf>;

/// Knobs for a deduplicating batch.
#[derive(Debug, Clone, Default)]
pub struct DedupOptions {
    /// Version suffix used for stored names
    pub format: VersionFormat,
    /// Re-read and compare checksums after every new copy
    pub verify: bool,
    /// Worker threads for parallel batches (None = auto)
    pub threads: Option<usize>,
}

/// Statistics about the data directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of stored files
    pub file_count: u64,
    /// Total bytes stored (deduplicated)
    pub total_bytes: u64,
}

impl StoreStats {
    /// Calculate average stored file size
    pub fn avg_file_size(&self) -> u64 {
        if self.file_count == 0 {
            0
        } else {
            self.total_bytes / self.file_count
        }
    }
}

/// A data directory plus the policy used to fill it.
///
/// The data directory belongs to the store: nothing else should write into
/// it. One batch at a time per data directory.
pub struct DataStore {
    pub(crate) data_dir: PathBuf,
    pub(crate) options: DedupOptions,
    pub(crate) copier: Box<dyn CopyStrategy>,
    pub(crate) scanner: Box<dyn SizeIndexProvider>,
}

impl fmt::Debug for DataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStore")
            .field("data_dir", &self.data_dir)
            .field("options", &self.options)
            .field("copier", &self.copier.name())
            .finish()
    }
}

/// Work shared by the sequential and parallel batch.
pub(crate) struct PreparedBatch {
    /// Absolute destination path per request, in input order
    pub(crate) dest_paths: Vec<PathBuf>,
    pub(crate) index: SizeIndex,
}

impl DataStore {
    /// Open a store rooted at `data_dir`. The directory is created on the
    /// first batch that stores something.
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            data_dir: normalize(data_dir.as_ref())?,
            options: DedupOptions::default(),
            copier: Box::new(ReflinkOrCopy),
            scanner: Box::new(DirectoryScanner),
        })
    }

    pub fn with_options(mut self, options: DedupOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_copier(mut self, copier: Box<dyn CopyStrategy>) -> Self {
        self.copier = copier;
        self
    }

    pub fn with_scanner(mut self, scanner: Box<dyn SizeIndexProvider>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn options(&self) -> &DedupOptions {
        &self.options
    }

    /// Make every request's source appear at `dest_root/<dest_relative>`,
    /// storing each distinct content once.
    ///
    /// Requests are processed in order. A file stored for an earlier
    /// request is visible to later ones, so duplicates within one batch
    /// are stored once. The first failure aborts the batch; links and files
    /// already committed stay in place and re-running the batch picks up
    /// where it stopped.
    #[instrument(skip(self, requests), fields(requests = requests.len()), level = "debug")]
    pub fn copy_deduplicated(
        &self,
        requests: &[CopyDescriptor],
        dest_root: &Path,
    ) -> Result<StoredPaths> {
        let PreparedBatch {
            dest_paths,
            mut index,
        } = self.prepare(requests, dest_root)?;
        let mut cache = HashCache::new();
        let mut output = StoredPaths::new();
        let mut stored_new = 0usize;
        let mut reused = 0usize;

        for (request, dest_path) in requests.iter().zip(&dest_paths) {
            if request.link_in_place() {
                debug!(source = %request.source().display(), "link in place");
                bind_direct(dest_path, request.source())?;
                continue;
            }

            let (stored, is_new) =
                self.resolve(request.source(), dest_path, &mut index, &mut cache)?;
            bind(dest_path, &stored)?;
            if is_new {
                stored_new += 1;
            } else {
                reused += 1;
            }
            output.insert(request.source().to_path_buf(), stored);
        }

        info!(
            requests = requests.len(),
            stored_new,
            reused,
            hashed_candidates = cache.len(),
            "batch complete"
        );
        Ok(output)
    }

    /// Store (or find) one source and return its stored path and whether
    /// a new file was created.
    fn resolve(
        &self,
        source: &Path,
        dest_path: &Path,
        index: &mut SizeIndex,
        cache: &mut HashCache,
    ) -> Result<(PathBuf, bool)> {
        if let Some(existing) = find_existing_copy(source, index, cache)? {
            debug!(source = %source.display(), stored = %existing.display(), "dedup hit");
            return Ok((existing, false));
        }

        let stored = self.store_new(source, dest_path)?;
        index.insert(&stored)?;
        Ok((stored, true))
    }

    /// Copy `source` into the data directory under a versioned form of
    /// `dest_path`'s file name.
    pub(crate) fn store_new(&self, source: &Path, dest_path: &Path) -> Result<PathBuf> {
        let dest_name = dest_path
            .file_name()
            .ok_or_else(|| StoreError::SourceNotAFile {
                path: dest_path.to_path_buf(),
            })?;
        debug!(source = %source.display(), "dedup miss, storing");
        copy_and_version(
            source,
            &self.data_dir,
            dest_name,
            &self.options.format,
            self.options.verify,
            self.copier.as_ref(),
        )
    }

    /// Validate the whole batch before touching the filesystem, then
    /// snapshot the data directory.
    pub(crate) fn prepare(
        &self,
        requests: &[CopyDescriptor],
        dest_root: &Path,
    ) -> Result<PreparedBatch> {
        let dest_root = normalize(dest_root)?;
        let data_real = resolve_existing_prefix(&self.data_dir);
        if resolve_existing_prefix(&dest_root).starts_with(&data_real) {
            return Err(StoreError::NestedDestination {
                dest_root,
                data_dir: self.data_dir.clone(),
            });
        }

        let mut dest_paths = Vec::with_capacity(requests.len());
        for request in requests {
            validate_source(request.source())?;
            let dest_path = dest_path_for(&dest_root, request)?;
            if resolve_existing_prefix(&dest_path).starts_with(&data_real) {
                return Err(StoreError::DestinationInsideDataDir {
                    dest_path,
                    data_dir: self.data_dir.clone(),
                });
            }
            dest_paths.push(dest_path);
        }

        if requests.iter().any(|r| !r.link_in_place()) {
            fs::create_dir_all(&self.data_dir).at("create data directory", &self.data_dir)?;
        }
        let index = self.scanner.list_files_by_size(&self.data_dir)?;
        debug!(indexed = index.len(), "scanned data directory");

        Ok(PreparedBatch { dest_paths, index })
    }

    /// Store one file at `dest_root/<file name>`.
    pub fn store_file(&self, source: &Path, dest_root: &Path) -> Result<PathBuf> {
        let requests = file_list_descriptors([source], None, false)?;
        let mut stored = self.copy_deduplicated(&requests, dest_root)?;
        stored
            .remove(source)
            .ok_or_else(|| StoreError::SourceMissing {
                path: source.to_path_buf(),
            })
    }

    /// Store files at `dest_root/<relative_dir>/<file name>`.
    pub fn store_files<I, P>(
        &self,
        items: I,
        dest_root: &Path,
        relative_dir: Option<&Path>,
        link_in_place: bool,
    ) -> Result<StoredPaths>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let requests = file_list_descriptors(items, relative_dir, link_in_place)?;
        self.copy_deduplicated(&requests, dest_root)
    }

    /// Mirror every file under `dir` into `dest_root`.
    pub fn store_directory(
        &self,
        dir: &Path,
        dest_root: &Path,
        link_in_place: bool,
    ) -> Result<StoredPaths> {
        let requests = directory_descriptors(dir, link_in_place)?;
        self.copy_deduplicated(&requests, dest_root)
    }

    /// Count the stored files and their bytes.
    pub fn stats(&self) -> Result<StoreStats> {
        let index = self.scanner.list_files_by_size(&self.data_dir)?;
        let mut stats = StoreStats::default();
        for (size, files) in index.iter() {
            stats.file_count += files.len() as u64;
            stats.total_bytes += size * files.len() as u64;
        }
        Ok(stats)
    }
}

/// Run one deduplicating batch against `data_dir` with default strategies.
pub fn copy_deduplicated(
    requests: &[CopyDescriptor],
    dest_root: &Path,
    data_dir: &Path,
    options: DedupOptions,
) -> Result<StoredPaths> {
    DataStore::new(data_dir)?
        .with_options(options)
        .copy_deduplicated(requests, dest_root)
}

/// `dest_root/<dest_relative>`; an empty relative path falls back to the
/// source's file name.
///
/// The result must name an entry strictly below `dest_root`: absolute
/// relative paths and `..` walks out of the root are rejected.
fn dest_path_for(dest_root: &Path, request: &CopyDescriptor) -> Result<PathBuf> {
    let relative = request.dest_relative();
    let outside = || StoreError::DestinationOutsideRoot {
        dest_path: relative.to_path_buf(),
        dest_root: dest_root.to_path_buf(),
    };
    if relative.has_root() || relative.is_absolute() {
        return Err(outside());
    }
    let relative = if relative.file_name().is_some() {
        relative
    } else {
        Path::new(request.source().file_name().unwrap_or_default())
    };
    let dest_path = lexical_normalize(&dest_root.join(relative));
    if dest_path == dest_root || !dest_path.starts_with(dest_root) {
        return Err(outside());
    }
    Ok(dest_path)
}

/// Absolute, with `.` and `..` folded away (no symlink resolution).
pub(crate) fn normalize(path: &Path) -> Result<PathBuf> {
    let absolute = path::absolute(path).at("resolve absolute path", path)?;
    Ok(lexical_normalize(&absolute))
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Canonicalize the deepest existing ancestor and re-append the rest, so
/// paths that do not exist yet still compare through symlinked parents.
fn resolve_existing_prefix(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut rest = Vec::new();
    loop {
        if let Ok(real) = existing.canonicalize() {
            let mut resolved = real;
            for name in rest.iter().rev() {
                resolved.push(name);
            }
            return resolved;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}
