//! Copy primitives: plain, verified, and versioned into the data directory.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::checksum::files_identical;
use crate::copy_strategy::CopyStrategy;
use crate::naming::{next_versioned_path_from, split_name, temp_path, VersionFormat};
use crate::protection::normalize_data_file_mode;
use crate::{IoContext, Result, StoreError};

/// Copy `source` to `target` with no post-check.
pub fn plain_copy(strategy: &dyn CopyStrategy, source: &Path, target: &Path) -> Result<u64> {
    strategy.copy_file(source, target).at("copy", target)
}

/// Copy `source` to `target`, then re-read both and compare checksums.
///
/// On mismatch the copy is left in place.
pub fn verified_copy(strategy: &dyn CopyStrategy, source: &Path, target: &Path) -> Result<u64> {
    let bytes = plain_copy(strategy, source, target)?;
    verify(source, target)?;
    Ok(bytes)
}

fn verify(source: &Path, copy: &Path) -> Result<()> {
    if files_identical(source, copy)? {
        Ok(())
    } else {
        Err(StoreError::VerificationFailed {
            source_path: source.to_path_buf(),
            copy_path: copy.to_path_buf(),
        })
    }
}

/// Copy `source` into `dest_dir` under the next free versioned name derived
/// from `dest_name`, returning the stored path.
///
/// The bytes land in a temporary file first; the versioned name is then
/// claimed with a no-clobber hard link, so a name taken in the meantime just
/// moves the claim to the next slot. The stored file's mode is normalized.
/// With `verify`, a checksum mismatch fails with
/// [`StoreError::VerificationFailed`] and the stored copy stays on disk.
#[instrument(skip(format, strategy), level = "debug")]
pub fn copy_and_version(
    source: &Path,
    dest_dir: &Path,
    dest_name: &OsStr,
    format: &VersionFormat,
    verify_copy: bool,
    strategy: &dyn CopyStrategy,
) -> Result<PathBuf> {
    let (base, ext) = split_name(dest_name);

    let temp = temp_path(dest_dir);
    if let Err(e) = plain_copy(strategy, source, &temp) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }

    let claimed = claim_versioned_name(&temp, dest_dir, &base, &ext, format);
    // The temp name is only a staging handle; the claimed name owns the data
    let _ = fs::remove_file(&temp);
    let stored = claimed?;

    normalize_data_file_mode(&stored).at("set permissions", &stored)?;

    if verify_copy {
        verify(source, &stored)?;
    }

    debug!(
        stored = %stored.display(),
        strategy = strategy.name(),
        "stored new version"
    );
    Ok(stored)
}

fn claim_versioned_name(
    temp: &Path,
    dest_dir: &Path,
    base: &OsStr,
    ext: &OsStr,
    format: &VersionFormat,
) -> Result<PathBuf> {
    let mut start = 1;
    loop {
        let (version, candidate) = next_versioned_path_from(dest_dir, base, ext, format, start);
        match fs::hard_link(temp, &candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(candidate = %candidate.display(), "version slot taken, rescanning");
                start = version + 1;
            }
            Err(e) if e.kind() == io::ErrorKind::Unsupported => {
                if reserve_and_rename(temp, &candidate)? {
                    return Ok(candidate);
                }
                debug!(candidate = %candidate.display(), "version slot taken, rescanning");
                start = version + 1;
            }
            Err(e) => return Err(StoreError::io("claim versioned name", candidate, e)),
        }
    }
}

/// Claim `candidate` on filesystems without hard links: reserve the name
/// with an exclusive create, then move the staged copy over the reservation.
///
/// Returns `false` when the name already exists; nothing is overwritten.
fn reserve_and_rename(temp: &Path, candidate: &Path) -> Result<bool> {
    match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(candidate)
    {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(StoreError::io("reserve versioned name", candidate, e)),
    }
    if let Err(e) = fs::rename(temp, candidate) {
        let _ = fs::remove_file(candidate);
        return Err(StoreError::io("rename into data directory", candidate, e));
    }
    Ok(true)
}
