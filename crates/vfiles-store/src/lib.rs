//! # vfiles-store
//!
//! Deduplicating, versioned file store.
//!
//! Callers ask for source files to *appear* at paths inside a destination
//! tree. The bytes are stored once in a shared data directory and the
//! destination entries are relative symlinks into it, so the destination
//! tree looks like an ordinary copy to downstream tools.
//!
//! ## Data Directory Layout
//!
//! ```text
//! data/
//! ├── hero.v0001.png      # first distinct content stored as "hero.png"
//! ├── hero.v0002.png      # different bytes, same name
//! └── notes.v0001.txt
//!
//! project/
//! └── assets/
//!     └── hero.png -> ../../data/hero.v0002.png
//! ```
//!
//! There is no index on disk. Every batch scans the data directory once,
//! groups files by byte size, and only hashes (BLAKE3) when sizes collide.
//!
//! ## Pipeline
//!
//! For each [`CopyDescriptor`] in a batch:
//! - link-in-place requests are linked straight to their source;
//! - otherwise [`find_existing_copy`] looks for byte-identical content,
//!   on a miss [`copy_and_version`] stores a new versioned file, and
//!   [`bind`] points the destination at the stored file.

mod checksum;
mod copy;
mod copy_strategy;
mod descriptor;
mod link;
mod naming;
mod parallel;
pub mod protection;
mod resolver;
mod size_index;
mod store;

pub use checksum::{
    files_identical, hash_file, hash_file_with_block_size, hash_to_hex, Blake3Hash,
    DEFAULT_BLOCK_SIZE,
};
pub use copy::{copy_and_version, plain_copy, verified_copy};
pub use copy_strategy::{default_strategy, CopyStrategy, PlainCopy, ReflinkOrCopy};
pub use descriptor::{
    directory_descriptors, file_list_descriptors, single_file_descriptors, CopyDescriptor,
};
pub use link::{bind, bind_direct};
pub use naming::{next_versioned_path, split_name, VersionFormat};
pub use parallel::{default_thread_count, MAX_BATCH_THREADS};
pub use resolver::{find_existing_copy, HashCache};
pub use size_index::{DirectoryScanner, SizeIndex, SizeIndexProvider};
pub use store::{copy_deduplicated, DataStore, DedupOptions, StoreStats, StoredPaths};

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(
        "destination root {} may not be inside the data directory {}",
        dest_root.display(),
        data_dir.display()
    )]
    NestedDestination { dest_root: PathBuf, data_dir: PathBuf },

    #[error(
        "destination {} resolves inside the data directory {}",
        dest_path.display(),
        data_dir.display()
    )]
    DestinationInsideDataDir { dest_path: PathBuf, data_dir: PathBuf },

    #[error(
        "destination {} is not inside the destination root {}",
        dest_path.display(),
        dest_root.display()
    )]
    DestinationOutsideRoot { dest_path: PathBuf, dest_root: PathBuf },

    #[error("invalid version format: {0}")]
    InvalidFormat(String),

    #[error("source file does not exist: {}", path.display())]
    SourceMissing { path: PathBuf },

    #[error("source is not a regular file: {}", path.display())]
    SourceNotAFile { path: PathBuf },

    #[error(
        "verification of copy failed (checksums do not match): {} --> {}",
        source_path.display(),
        copy_path.display()
    )]
    VerificationFailed { source_path: PathBuf, copy_path: PathBuf },

    #[error("I/O error during {operation} on {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to start batch thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl StoreError {
    /// Wrap an I/O error with the operation and path it failed on.
    pub fn io(operation: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        StoreError::Io {
            operation,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// True for the configuration errors raised before any mutation.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StoreError::NestedDestination { .. }
                | StoreError::DestinationInsideDataDir { .. }
                | StoreError::DestinationOutsideRoot { .. }
                | StoreError::InvalidFormat(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Attach operation/path context to a raw I/O result.
pub(crate) trait IoContext<T> {
    fn at(self, operation: &'static str, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, operation: &'static str, path: &Path) -> Result<T> {
        self.map_err(|e| StoreError::io(operation, path, e))
    }
}
