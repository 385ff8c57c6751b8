//! Structured logging utilities for vfiles components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use vfiles_config::{log_cli_info, log_store_debug};
//!
//! log_cli_info!("Batch finished", stored = 12);
//! log_store_debug!("Scanning data dir", files = 40);
//! ```

use tracing_subscriber::EnvFilter;

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const STORE: &'static str = "STORE";
    pub const CLI: &'static str = "CLI";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Map a `-v` count to a level: 0 = warn, 1 = info, 2 = debug, 3+ = trace.
    pub fn from_verbosity(count: u8) -> Self {
        match count {
            0 => LogLevel::Warn,
            1 => LogLevel::Info,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

// === STORE logging macros ===

#[macro_export]
macro_rules! log_store_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "STORE", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_store_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "STORE", $($key = $value,)* $msg)
    };
}

// === CLI logging macros ===

#[macro_export]
macro_rules! log_cli_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "CLI", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_cli_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "CLI", $($key = $value,)* $msg)
    };
}

/// Build the filter: `VFILES_LOG`, then `RUST_LOG`, then `level`.
pub fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_env("VFILES_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()))
}

/// Initialize logging with the given level filter.
/// Call this once at application startup; later calls are ignored.
pub fn init_logging(level: LogLevel) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_constants() {
        assert_eq!(Component::STORE, "STORE");
        assert_eq!(Component::CLI, "CLI");
    }

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(LogLevel::from_verbosity(0), LogLevel::Warn);
        assert_eq!(LogLevel::from_verbosity(1), LogLevel::Info);
        assert_eq!(LogLevel::from_verbosity(2), LogLevel::Debug);
        assert_eq!(LogLevel::from_verbosity(9), LogLevel::Trace);
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging(LogLevel::Warn);
        init_logging(LogLevel::Debug);
        log_store_debug!("after init", files = 1);
    }
}
