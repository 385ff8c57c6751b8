//! Copy requests and helpers that build them.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{Result, StoreError};

/// One file to make appear inside a destination tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyDescriptor {
    source: PathBuf,
    dest_relative: PathBuf,
    link_in_place: bool,
}

impl CopyDescriptor {
    /// Build a request; `source` must be an existing regular file.
    ///
    /// `dest_relative` is where the file should appear, relative to the
    /// destination root (directories plus final name). With
    /// `link_in_place` the destination links straight at `source` and the
    /// file is never stored.
    pub fn new(
        source: impl Into<PathBuf>,
        dest_relative: impl Into<PathBuf>,
        link_in_place: bool,
    ) -> Result<Self> {
        let source = source.into();
        validate_source(&source)?;
        Ok(Self {
            source,
            dest_relative: dest_relative.into(),
            link_in_place,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn dest_relative(&self) -> &Path {
        &self.dest_relative
    }

    pub fn link_in_place(&self) -> bool {
        self.link_in_place
    }
}

/// Fails unless `path` exists and is a regular file (symlinks are followed).
pub(crate) fn validate_source(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(StoreError::SourceNotAFile {
            path: path.to_path_buf(),
        }),
        Err(_) => Err(StoreError::SourceMissing {
            path: path.to_path_buf(),
        }),
    }
}

/// One request placing `file` at `relative_dir/dest_name`.
pub fn single_file_descriptors(
    file: impl Into<PathBuf>,
    relative_dir: impl AsRef<Path>,
    dest_name: impl AsRef<Path>,
    link_in_place: bool,
) -> Result<Vec<CopyDescriptor>> {
    let dest_relative = relative_dir.as_ref().join(dest_name);
    Ok(vec![CopyDescriptor::new(file, dest_relative, link_in_place)?])
}

/// One request per item, each at `relative_dir/<item file name>`.
///
/// `None` (or an empty path) places the files at the destination root.
pub fn file_list_descriptors<I, P>(
    items: I,
    relative_dir: Option<&Path>,
    link_in_place: bool,
) -> Result<Vec<CopyDescriptor>>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let relative_dir = relative_dir.unwrap_or(Path::new(""));
    items
        .into_iter()
        .map(|item| {
            let item = item.into();
            let name = item.file_name().ok_or_else(|| StoreError::SourceNotAFile {
                path: item.clone(),
            })?;
            let dest_relative = relative_dir.join(name);
            CopyDescriptor::new(item, dest_relative, link_in_place)
        })
        .collect()
}

/// One request per file below `dir`, mirroring its layout.
///
/// Entries are visited in file-name order; directories themselves produce
/// no request.
pub fn directory_descriptors(dir: &Path, link_in_place: bool) -> Result<Vec<CopyDescriptor>> {
    let mut descriptors = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            StoreError::io("walk source directory", path, e.into())
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        let dest_relative = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or(entry.path())
            .to_path_buf();
        descriptors.push(CopyDescriptor::new(
            entry.path(),
            dest_relative,
            link_in_place,
        )?);
    }
    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_validates_source() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.txt");
        fs::write(&file, b"a").unwrap();

        let d = CopyDescriptor::new(&file, "sub/a.txt", false).unwrap();
        assert_eq!(d.source(), file);
        assert_eq!(d.dest_relative(), Path::new("sub/a.txt"));
        assert!(!d.link_in_place());

        let missing = CopyDescriptor::new(temp.path().join("nope"), "x", false);
        assert!(matches!(missing, Err(StoreError::SourceMissing { .. })));

        let dir = CopyDescriptor::new(temp.path(), "x", false);
        assert!(matches!(dir, Err(StoreError::SourceNotAFile { .. })));
    }

    #[test]
    fn test_single_file_descriptors() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.txt");
        fs::write(&file, b"a").unwrap();

        let ds = single_file_descriptors(&file, "assets/textures", "renamed.txt", true).unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(
            ds[0].dest_relative(),
            Path::new("assets/textures/renamed.txt")
        );
        assert!(ds[0].link_in_place());
    }

    #[test]
    fn test_file_list_descriptors() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.txt");
        let b = temp.path().join("nested/b.bin");
        fs::create_dir_all(b.parent().unwrap()).unwrap();
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();

        let ds = file_list_descriptors([&a, &b], Some(Path::new("lib")), false).unwrap();
        let rel: Vec<_> = ds.iter().map(|d| d.dest_relative().to_path_buf()).collect();
        assert_eq!(rel, vec![PathBuf::from("lib/a.txt"), PathBuf::from("lib/b.bin")]);

        let root_level = file_list_descriptors([&a], None, false).unwrap();
        assert_eq!(root_level[0].dest_relative(), Path::new("a.txt"));
    }

    #[test]
    fn test_directory_descriptors_mirror_layout() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("tree");
        fs::create_dir_all(root.join("b/c")).unwrap();
        fs::write(root.join("z.txt"), b"z").unwrap();
        fs::write(root.join("b/one.txt"), b"1").unwrap();
        fs::write(root.join("b/c/two.txt"), b"2").unwrap();

        let ds = directory_descriptors(&root, false).unwrap();
        let rel: Vec<_> = ds.iter().map(|d| d.dest_relative().to_path_buf()).collect();
        assert_eq!(
            rel,
            vec![
                PathBuf::from("b/c/two.txt"),
                PathBuf::from("b/one.txt"),
                PathBuf::from("z.txt"),
            ]
        );
        assert_eq!(ds[2].source(), root.join("z.txt"));
    }
}
