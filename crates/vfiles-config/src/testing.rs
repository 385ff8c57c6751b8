//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` with its own data directory, source tree and
//! destination root, all under one temporary directory.
//!
//! # Usage
//!
//! ```ignore
//! use vfiles_config::testing::TestEnvironment;
//!
//! let env = TestEnvironment::new()?;
//! let src = env.create_file("img/hero.png", b"...")?;
//! // spawn the CLI with env.vfiles_env() so it never sees ~/.vfiles
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Isolated data directory (not created until a store needs it)
    pub data_dir: PathBuf,
    /// Where source files are created
    pub source_dir: PathBuf,
    /// Destination root for symlinks
    pub dest_root: PathBuf,
    /// Working directory for spawned processes
    pub work_dir: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let source_dir = root.join("src");
        let dest_root = root.join("dest");
        let work_dir = root.join("work");
        std::fs::create_dir_all(&source_dir)?;
        std::fs::create_dir_all(&work_dir)?;

        Ok(Self {
            data_dir: root.join(format!("data-{}", test_id)),
            _temp_dir: temp_dir,
            source_dir,
            dest_root,
            work_dir,
            test_id,
        })
    }

    /// Create a source file with content
    pub fn create_file(&self, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.source_dir.join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Write a project config into the work directory.
    pub fn write_project_config(&self, contents: &str) -> anyhow::Result<PathBuf> {
        let path = crate::path::project_config_path(&self.work_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Environment for spawning the CLI against this environment.
    ///
    /// Points `HOME` into the sandbox so no real global config is read.
    pub fn vfiles_env(&self) -> Vec<(String, String)> {
        vec![
            (
                "HOME".to_string(),
                self._temp_dir.path().display().to_string(),
            ),
            (
                "VFILES_DATA_DIR".to_string(),
                self.data_dir.display().to_string(),
            ),
        ]
    }
}
