//! Destination links.
//!
//! Links into the data directory are relative to the link's own directory,
//! so moving the destination tree and the data directory together keeps
//! every link valid. Link-in-place entries point at the source's absolute
//! path.

use std::fs;
use std::io;
use std::path::{self, Path, PathBuf};

use tracing::trace;

use crate::naming::temp_path;
use crate::{IoContext, Result, StoreError};

/// Point `dest_path` at `target_path` through a relative symlink.
///
/// Missing parent directories are created and any existing file or link
/// at `dest_path` is replaced.
pub fn bind(dest_path: &Path, target_path: &Path) -> Result<()> {
    let dest_path = absolute(dest_path)?;
    let target_path = absolute(target_path)?;
    let parent = prepare_parent(&dest_path)?;

    let relative = pathdiff::diff_paths(&target_path, parent).unwrap_or(target_path);
    replace_with_symlink(&dest_path, &relative)
}

/// Point `dest_path` straight at `source_path` (absolute), bypassing the
/// data directory.
pub fn bind_direct(dest_path: &Path, source_path: &Path) -> Result<()> {
    let dest_path = absolute(dest_path)?;
    let source_path = absolute(source_path)?;
    prepare_parent(&dest_path)?;
    replace_with_symlink(&dest_path, &source_path)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    path::absolute(path).at("resolve absolute path", path)
}

fn prepare_parent(dest_path: &Path) -> Result<&Path> {
    let parent = dest_path.parent().ok_or_else(|| {
        StoreError::io(
            "link",
            dest_path,
            io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent"),
        )
    })?;
    fs::create_dir_all(parent).at("create destination directory", parent)?;
    Ok(parent)
}

/// Swap a new symlink into place with a rename, so readers see either the
/// old entry or the new link.
fn replace_with_symlink(dest_path: &Path, link_target: &Path) -> Result<()> {
    if let Ok(meta) = fs::symlink_metadata(dest_path) {
        if meta.is_dir() {
            return Err(StoreError::io(
                "replace destination",
                dest_path,
                io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "a directory occupies the destination path",
                ),
            ));
        }
    }

    let parent = dest_path.parent().unwrap_or(Path::new("."));
    let staging = temp_path(parent);

    symlink(link_target, &staging).at("create symlink", &staging)?;
    if let Err(e) = fs::rename(&staging, dest_path) {
        let _ = fs::remove_file(&staging);
        return Err(StoreError::io("replace destination", dest_path, e));
    }

    trace!(dest = %dest_path.display(), target = %link_target.display(), "linked");
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
