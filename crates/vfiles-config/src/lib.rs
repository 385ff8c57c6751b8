//! # vfiles-config
//!
//! Configuration management for vfiles.
//!
//! Loads configuration from:
//! 1. `~/.vfiles/config.toml` (global)
//! 2. `.vfiles/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)

pub mod logging;
pub mod path;
pub mod testing;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard};
use tracing::debug;

/// Default data directory when nothing is configured
pub const DEFAULT_DATA_DIR: &str = "~/.vfiles/data";

/// Project-local config location, relative to the working directory
pub const PROJECT_CONFIG_PATH: &str = ".vfiles/config.toml";

/// Global config instance
static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::load().unwrap_or_default()));

/// Get global config (read-only)
pub fn config() -> RwLockReadGuard<'static, Config> {
    // A poisoned lock still holds a fully written Config
    CONFIG.read().unwrap_or_else(|e| e.into_inner())
}

/// Reload config from disk
pub fn reload() -> Result<(), ConfigError> {
    let new_config = Config::load()?;
    *CONFIG.write().unwrap_or_else(|e| e.into_inner()) = new_config;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub batch: BatchConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let global = Self::global_config_path();
        let mut config = Self::load_from(global.as_deref(), Path::new(PROJECT_CONFIG_PATH))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load global then project config from explicit paths; missing files
    /// are skipped. Environment overrides are not applied.
    pub fn load_from(global: Option<&Path>, project: &Path) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = global {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                let contents = std::fs::read_to_string(global_path)?;
                config = toml::from_str(&contents)?;
            }
        }

        if project.exists() {
            debug!("Loading project config from {:?}", project);
            let contents = std::fs::read_to_string(project)?;
            let project_config: Config = toml::from_str(&contents)?;
            config.merge(project_config);
        }

        Ok(config)
    }

    /// Global config path: ~/.vfiles/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".vfiles/config.toml"))
    }

    /// Merge another config: fields the project sets away from their
    /// defaults win.
    fn merge(&mut self, other: Config) {
        let defaults = Config::default();
        if other.store.data_dir != defaults.store.data_dir {
            self.store.data_dir = other.store.data_dir;
        }
        if other.store.ver_prefix != defaults.store.ver_prefix {
            self.store.ver_prefix = other.store.ver_prefix;
        }
        if other.store.num_digits != defaults.store.num_digits {
            self.store.num_digits = other.store.num_digits;
        }
        if other.store.verify != defaults.store.verify {
            self.store.verify = other.store.verify;
        }
        if other.batch.parallel != defaults.batch.parallel {
            self.batch.parallel = other.batch.parallel;
        }
        if other.batch.threads.is_some() {
            self.batch.threads = other.batch.threads;
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a `VFILES_*` variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("VFILES_DATA_DIR") {
            self.store.data_dir = PathBuf::from(path);
        }
        if let Some(threads) = lookup("VFILES_THREADS") {
            if let Ok(n) = threads.parse() {
                self.batch.threads = Some(n);
            }
        }
        if let Some(verify) = lookup("VFILES_VERIFY") {
            match verify.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.store.verify = true,
                "0" | "false" | "no" | "off" => self.store.verify = false,
                _ => {}
            }
        }
    }

    /// Data directory with `~` expanded
    pub fn data_dir(&self) -> PathBuf {
        path::expand_tilde(&self.store.data_dir)
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        Config::default().to_toml()
    }

    pub fn to_toml(&self) -> String {
        // Plain structs of strings, numbers and bools always serialize
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Data directory holding the stored files
    pub data_dir: PathBuf,
    /// Version prefix, e.g. "v" for `name.v0001.ext`
    pub ver_prefix: String,
    /// Zero-padding width of the version number
    pub num_digits: usize,
    /// Verify every new copy by checksum
    pub verify: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            ver_prefix: "v".to_string(),
            num_digits: 4,
            verify: false,
        }
    }
}

/// Batch execution configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Resolve content on a thread pool
    pub parallel: bool,
    /// Number of parallel threads (None = auto)
    pub threads: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.ver_prefix, "v");
        assert_eq!(config.store.num_digits, 4);
        assert!(!config.store.verify);
        assert!(!config.batch.parallel);
        assert_eq!(config.batch.threads, None);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[store]"));
        assert!(toml_str.contains("[batch]"));
        assert!(toml_str.contains("ver_prefix"));
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = Config::default();
        config.batch.threads = Some(3);
        let parsed: Config = toml::from_str(&config.to_toml()).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("VFILES_DATA_DIR", "/srv/data"),
            ("VFILES_THREADS", "8"),
            ("VFILES_VERIFY", "yes"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.store.data_dir, PathBuf::from("/srv/data"));
        assert_eq!(config.batch.threads, Some(8));
        assert!(config.store.verify);
    }

    #[test]
    fn test_global_config_accessor() {
        let before = config().clone();
        if reload().is_ok() {
            assert_eq!(*config(), before);
        }
    }

    #[test]
    fn test_bad_override_values_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|k| match k {
            "VFILES_THREADS" => Some("many".to_string()),
            "VFILES_VERIFY" => Some("maybe".to_string()),
            _ => None,
        });
        assert_eq!(config, Config::default());
    }
}
