//! # vfiles CLI
//!
//! Command-line interface for the vfiles deduplicating file store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use vfiles_config::logging::{init_logging, LogLevel};
use vfiles_config::{log_cli_debug, log_store_info, Config};
use vfiles_store::{DataStore, DedupOptions, VersionFormat};

mod store;

/// vfiles - store files once, link them everywhere
#[derive(Parser)]
#[command(name = "vfiles")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory holding the stored files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verify every new copy by checksum
    #[arg(long, global = true)]
    verify: bool,

    /// Resolve content on a thread pool
    #[arg(long, global = true)]
    parallel: bool,

    /// Threads for --parallel (default: half the cores, at most 4)
    #[arg(short = 'j', long, global = true)]
    threads: Option<usize>,

    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store files and link them into a destination tree
    Store(store::StoreArgs),

    /// Mirror a directory into a destination tree
    StoreDir(store::StoreDirArgs),

    /// Display data directory statistics
    Status,

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file locations
    Path,
}

/// Effective settings: config files and environment, then flags.
pub struct Settings {
    pub data_dir: PathBuf,
    pub options: DedupOptions,
    pub parallel: bool,
}

impl Settings {
    fn resolve(cli: &Cli, config: &Config) -> Result<Self> {
        let data_dir = match &cli.data_dir {
            Some(dir) => dir.clone(),
            None => config.data_dir(),
        };
        let data_dir = vfiles_config::path::absolute_path(data_dir)?;
        let format = VersionFormat::new(config.store.ver_prefix.clone(), config.store.num_digits)
            .context("Invalid [store] version format")?;

        Ok(Self {
            data_dir,
            options: DedupOptions {
                format,
                verify: cli.verify || config.store.verify,
                threads: cli.threads.or(config.batch.threads),
            },
            parallel: cli.parallel || config.batch.parallel,
        })
    }

    pub fn open_store(&self) -> Result<DataStore> {
        Ok(DataStore::new(&self.data_dir)
            .with_context(|| format!("Failed to open data dir {}", self.data_dir.display()))?
            .with_options(self.options.clone()))
    }
}

fn main() -> Result<()> {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    let cli = Cli::parse();
    init_logging(LogLevel::from_verbosity(cli.verbose));

    let config = Config::load().context("Failed to load configuration")?;

    match &cli.command {
        Commands::Config { command } => cmd_config(command, &config),
        Commands::Status => {
            let settings = Settings::resolve(&cli, &config)?;
            cmd_status(&settings)
        }
        Commands::Store(args) => {
            let settings = Settings::resolve(&cli, &config)?;
            store::run_store(args, &settings)
        }
        Commands::StoreDir(args) => {
            let settings = Settings::resolve(&cli, &config)?;
            store::run_store_dir(args, &settings)
        }
    }
}

fn cmd_status(settings: &Settings) -> Result<()> {
    let store = settings.open_store()?;
    log_cli_debug!("Reading data dir statistics");
    let stats = store.stats()?;
    log_store_info!(
        "Data dir scanned",
        files = stats.file_count,
        bytes = stats.total_bytes
    );
    println!("Data dir: {}", store.data_dir().display());
    println!("Stored files: {}", stats.file_count);
    println!("Total bytes: {}", stats.total_bytes);
    println!("Average size: {}", stats.avg_file_size());
    Ok(())
}

fn cmd_config(command: &ConfigCommands, config: &Config) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            print!("{}", config.to_toml());
        }
        ConfigCommands::Path => {
            let global = Config::global_config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(no home directory)".to_string());
            let cwd = std::env::current_dir().context("Failed to get current directory")?;
            println!("Global: {}", global);
            println!(
                "Project: {}",
                vfiles_config::path::project_config_path(cwd).display()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "vfiles",
            "--data-dir",
            "/tmp/vfiles-data",
            "--verify",
            "-j",
            "3",
            "status",
        ]);
        let settings = Settings::resolve(&cli, &Config::default()).unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/vfiles-data"));
        assert!(settings.options.verify);
        assert_eq!(settings.options.threads, Some(3));
        assert!(!settings.parallel);
    }

    #[test]
    fn test_config_supplies_defaults() {
        let cli = Cli::parse_from(["vfiles", "--data-dir", "/d", "status"]);
        let mut config = Config::default();
        config.store.ver_prefix = "ver".to_string();
        config.store.num_digits = 2;
        config.batch.parallel = true;

        let settings = Settings::resolve(&cli, &config).unwrap();
        assert_eq!(settings.options.format.prefix(), "ver");
        assert_eq!(settings.options.format.digits(), 2);
        assert!(settings.parallel);
    }

    #[test]
    fn test_bad_format_in_config_is_rejected() {
        let cli = Cli::parse_from(["vfiles", "--data-dir", "/d", "status"]);
        let mut config = Config::default();
        config.store.ver_prefix = "a/b".to_string();
        assert!(Settings::resolve(&cli, &config).is_err());
    }
}
