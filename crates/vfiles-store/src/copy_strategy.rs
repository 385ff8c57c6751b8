//! How bytes get from a source file into the data directory.
//!
//! # Usage
//!
//! ```ignore
//! use vfiles_store::default_strategy;
//!
//! let strategy = default_strategy();
//! strategy.copy_file(source, target)?;
//! ```

use std::fs;
use std::io;
use std::path::Path;

// ============================================================================
// CopyStrategy Trait
// ============================================================================

/// Produces an independent copy of `source` at `target`.
///
/// `target` never exists beforehand. The result must be a separate file:
/// later changes to the source may not show through.
pub trait CopyStrategy: Send + Sync {
    /// Copy `source` to `target`, returning the number of bytes written.
    fn copy_file(&self, source: &Path, target: &Path) -> io::Result<u64>;

    /// Name of this strategy (for logging/debugging)
    fn name(&self) -> &'static str;
}

// ============================================================================
// Implementations
// ============================================================================

/// Copy-on-write clone where the filesystem supports it (btrfs, xfs, APFS),
/// byte copy otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReflinkOrCopy;

impl CopyStrategy for ReflinkOrCopy {
    fn copy_file(&self, source: &Path, target: &Path) -> io::Result<u64> {
        match reflink_copy::reflink_or_copy(source, target)? {
            Some(bytes) => Ok(bytes),
            // Cloned: report the logical size
            None => Ok(fs::metadata(target)?.len()),
        }
    }

    fn name(&self) -> &'static str {
        "reflink-or-copy"
    }
}

/// Always a full byte copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCopy;

impl CopyStrategy for PlainCopy {
    fn copy_file(&self, source: &Path, target: &Path) -> io::Result<u64> {
        fs::copy(source, target)
    }

    fn name(&self) -> &'static str {
        "plain-copy"
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// The strategy used when none is configured.
pub fn default_strategy() -> &'static dyn CopyStrategy {
    static STRATEGY: ReflinkOrCopy = ReflinkOrCopy;
    &STRATEGY
}

// ============================================================================
// Tests
// ============================================================================
