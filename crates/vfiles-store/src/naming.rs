//! Versioned file names inside the data directory.
//!
//! A stored file is named `<base>.<prefix><N><ext>` where `N` is zero-padded
//! to the configured width, e.g. `hero.v0003.png`.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{Result, StoreError};

/// Marks in-flight copies inside the data directory.
const TEMP_PREFIX: &str = ".vfiles-tmp.";

/// Upper bound for the padding width; `u64::MAX` has 20 digits.
const MAX_DIGITS: usize = 20;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Version suffix formatting: prefix string plus zero-padding width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionFormat {
    prefix: String,
    digits: usize,
}

impl Default for VersionFormat {
    fn default() -> Self {
        Self {
            prefix: "v".to_string(),
            digits: 4,
        }
    }
}

impl VersionFormat {
    pub fn new(prefix: impl Into<String>, digits: usize) -> Result<Self> {
        let prefix = prefix.into();
        if prefix.contains(|c: char| matches!(c, '/' | '\\' | '\0')) {
            return Err(StoreError::InvalidFormat(format!(
                "version prefix {:?} may not contain path separators",
                prefix
            )));
        }
        if digits == 0 || digits > MAX_DIGITS {
            return Err(StoreError::InvalidFormat(format!(
                "digit count {} must be between 1 and {}",
                digits, MAX_DIGITS
            )));
        }
        Ok(Self { prefix, digits })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn digits(&self) -> usize {
        self.digits
    }

    /// `.v0007` for version 7 with the default format.
    pub fn suffix(&self, version: u64) -> String {
        format!(".{}{:0width$}", self.prefix, version, width = self.digits)
    }

    /// Full file name for `base` + `ext` at `version`.
    pub fn file_name(&self, base: &OsStr, ext: &OsStr, version: u64) -> OsString {
        let mut name = base.to_os_string();
        name.push(self.suffix(version));
        name.push(ext);
        name
    }
}

/// Split a file name into base and extension (extension keeps its dot).
///
/// Leading dots belong to the base: `.bashrc` has no extension, and only
/// the last extension is split off `archive.tar.gz`.
pub fn split_name(name: &OsStr) -> (OsString, OsString) {
    let path = Path::new(name);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => {
            let mut dotted = OsString::from(".");
            dotted.push(ext);
            (stem.to_os_string(), dotted)
        }
        _ => (name.to_os_string(), OsString::new()),
    }
}

/// First `base.<prefix>N.ext` in `dir` that does not exist, scanning from 1.
///
/// Gaps left by deleted versions are reused. The check is not atomic; see
/// `copy_and_version` for how the name is actually claimed.
pub fn next_versioned_path(
    dir: &Path,
    base: &OsStr,
    ext: &OsStr,
    format: &VersionFormat,
) -> PathBuf {
    next_versioned_path_from(dir, base, ext, format, 1).1
}

/// Like [`next_versioned_path`] but starts scanning at `start`.
pub(crate) fn next_versioned_path_from(
    dir: &Path,
    base: &OsStr,
    ext: &OsStr,
    format: &VersionFormat,
    start: u64,
) -> (u64, PathBuf) {
    let mut version = start.max(1);
    loop {
        let candidate = dir.join(format.file_name(base, ext, version));
        // symlink_metadata so that dangling entries still count as taken
        if fs::symlink_metadata(&candidate).is_err() {
            return (version, candidate);
        }
        version += 1;
    }
}

/// Unique temporary path in `dir` for an in-flight copy or link.
///
/// The name is bounded in length and independent of the final name, so any
/// name that fits on disk can also be staged.
pub(crate) fn temp_path(dir: &Path) -> PathBuf {
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    dir.join(format!("{}{}.{}.tmp", TEMP_PREFIX, std::process::id(), seq))
}

pub(crate) fn is_temp_name(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with(TEMP_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_name() {
        let cases = [
            ("hero.png", "hero", ".png"),
            ("archive.tar.gz", "archive.tar", ".gz"),
            (".bashrc", ".bashrc", ""),
            ("Makefile", "Makefile", ""),
        ];
        for (name, base, ext) in cases {
            let (b, e) = split_name(OsStr::new(name));
            assert_eq!(b, OsString::from(base), "base of {}", name);
            assert_eq!(e, OsString::from(ext), "ext of {}", name);
        }
    }

    #[test]
    fn test_suffix_padding() {
        let fmt = VersionFormat::default();
        assert_eq!(fmt.suffix(1), ".v0001");
        assert_eq!(fmt.suffix(12345), ".v12345");

        let fmt = VersionFormat::new("ver", 2).unwrap();
        assert_eq!(fmt.suffix(3), ".ver03");
        assert_eq!(
            fmt.file_name(OsStr::new("a"), OsStr::new(".txt"), 3),
            OsString::from("a.ver03.txt")
        );
    }

    #[test]
    fn test_invalid_format() {
        assert!(VersionFormat::new("v/", 4).is_err());
        assert!(VersionFormat::new("v", 64).is_err());
        assert!(matches!(
            VersionFormat::new("v", 0),
            Err(StoreError::InvalidFormat(_))
        ));
        assert!(VersionFormat::new("", 1).is_ok());
        assert!(VersionFormat::new("v", MAX_DIGITS).is_ok());
    }

    #[test]
    fn test_next_versioned_path_fills_lowest_gap() {
        let temp = TempDir::new().unwrap();
        let fmt = VersionFormat::default();
        let base = OsStr::new("a");
        let ext = OsStr::new(".txt");

        assert_eq!(
            next_versioned_path(temp.path(), base, ext, &fmt),
            temp.path().join("a.v0001.txt")
        );

        fs::write(temp.path().join("a.v0001.txt"), b"1").unwrap();
        fs::write(temp.path().join("a.v0003.txt"), b"3").unwrap();
        assert_eq!(
            next_versioned_path(temp.path(), base, ext, &fmt),
            temp.path().join("a.v0002.txt")
        );

        fs::write(temp.path().join("a.v0002.txt"), b"2").unwrap();
        assert_eq!(
            next_versioned_path(temp.path(), base, ext, &fmt),
            temp.path().join("a.v0004.txt")
        );
    }

    #[test]
    fn test_temp_names_are_unique_and_recognized() {
        let dir = Path::new("/data");
        let a = temp_path(dir);
        let b = temp_path(dir);
        assert_ne!(a, b);
        assert!(a.file_name().unwrap().len() < 64);
        assert!(is_temp_name(a.file_name().unwrap()));
        assert!(!is_temp_name(OsStr::new("a.v0001.txt")));
    }
}
