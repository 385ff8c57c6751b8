//! Path helpers for user-supplied locations.
//!
//! Paths from config files, environment variables and the command line go
//! through these before they reach the store.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Expand a leading `~` to the home directory.
///
/// Only `~` and `~/...` are expanded; `~user` forms and paths without a
/// home directory available are returned unchanged.
pub fn expand_tilde(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) if rest.as_os_str().is_empty() => home,
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Make a path absolute against the current directory without touching the
/// filesystem beyond reading the cwd. `~` is expanded first.
///
/// # Example
/// ```ignore
/// let dest = absolute_path("project/assets")?;
/// assert!(dest.is_absolute());
/// ```
pub fn absolute_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let expanded = expand_tilde(path);
    std::path::absolute(&expanded)
        .with_context(|| format!("Failed to resolve path: {}", expanded.display()))
}

/// Normalize path, falling back to the original if canonicalization fails.
///
/// This is useful when the path might not exist and that's acceptable.
pub fn normalize_or_original(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Project-local config file below `root`.
pub fn project_config_path(root: impl AsRef<Path>) -> PathBuf {
    root.as_ref().join(crate::PROJECT_CONFIG_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_expand_tilde_plain_path_unchanged() {
        assert_eq!(expand_tilde("/srv/data"), PathBuf::from("/srv/data"));
        assert_eq!(expand_tilde("data/~x"), PathBuf::from("data/~x"));
    }

    #[test]
    fn test_expand_tilde_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~"), home);
            assert_eq!(expand_tilde("~/.vfiles/data"), home.join(".vfiles/data"));
        }
    }

    #[test]
    fn test_expand_tilde_other_user_unchanged() {
        assert_eq!(expand_tilde("~bob/data"), PathBuf::from("~bob/data"));
    }

    #[test]
    fn test_absolute_path() {
        let abs = absolute_path("some/relative/dir").unwrap();
        assert!(abs.is_absolute());
        assert!(abs.ends_with("some/relative/dir"));
    }

    #[test]
    fn test_normalize_existing_path() {
        let temp = tempdir().unwrap();
        let file_path = temp.path().join("test.txt");
        fs::write(&file_path, "test").unwrap();

        let normalized = normalize_or_original(&file_path);
        assert!(normalized.is_absolute());
        assert!(normalized.exists());
    }

    #[test]
    fn test_normalize_or_original_returns_original_on_failure() {
        let fake_path = Path::new("/nonexistent/path/file.txt");
        let result = normalize_or_original(fake_path);
        assert_eq!(result, fake_path);
    }

    #[test]
    fn test_project_config_path() {
        assert_eq!(
            project_config_path("/work"),
            PathBuf::from("/work/.vfiles/config.toml")
        );
    }
}
