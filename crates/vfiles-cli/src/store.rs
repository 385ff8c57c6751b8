//! `vfiles store` and `vfiles store-dir`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use vfiles_config::{log_cli_debug, log_cli_info};
use vfiles_store::{directory_descriptors, file_list_descriptors, CopyDescriptor, StoredPaths};

use crate::Settings;

#[derive(Args, Debug)]
pub struct StoreArgs {
    /// Files to store
    #[arg(value_name = "FILES", required = true)]
    pub files: Vec<PathBuf>,

    /// Destination root for the links
    #[arg(short, long, value_name = "DIR")]
    pub dest: PathBuf,

    /// Directory below --dest to place the links in
    #[arg(short, long, value_name = "REL")]
    pub relative_dir: Option<PathBuf>,

    /// Link straight to the sources instead of storing them
    #[arg(long)]
    pub link_in_place: bool,
}

#[derive(Args, Debug)]
pub struct StoreDirArgs {
    /// Directory whose files are stored
    #[arg(value_name = "DIR")]
    pub directory: PathBuf,

    /// Destination root for the links
    #[arg(short, long, value_name = "DIR")]
    pub dest: PathBuf,

    /// Link straight to the sources instead of storing them
    #[arg(long)]
    pub link_in_place: bool,
}

pub fn run_store(args: &StoreArgs, settings: &Settings) -> Result<()> {
    let files = args
        .files
        .iter()
        .map(|f| vfiles_config::path::absolute_path(f))
        .collect::<Result<Vec<_>>>()?;
    let requests = file_list_descriptors(files, args.relative_dir.as_deref(), args.link_in_place)?;
    execute(&requests, &args.dest, settings)
}

pub fn run_store_dir(args: &StoreDirArgs, settings: &Settings) -> Result<()> {
    let directory = vfiles_config::path::absolute_path(&args.directory)?;
    if !directory.is_dir() {
        anyhow::bail!("Not a directory: {}", directory.display());
    }
    let requests = directory_descriptors(&directory, args.link_in_place)?;
    execute(&requests, &args.dest, settings)
}

fn execute(requests: &[CopyDescriptor], dest: &Path, settings: &Settings) -> Result<()> {
    let dest = vfiles_config::path::absolute_path(dest)?;
    let store = settings.open_store()?;
    log_cli_debug!(
        "Starting batch",
        requests = requests.len(),
        parallel = settings.parallel
    );

    let stored = if settings.parallel {
        store.copy_deduplicated_parallel(requests, &dest)
    } else {
        store.copy_deduplicated(requests, &dest)
    }
    .with_context(|| format!("Failed to store into {}", dest.display()))?;

    report(requests, &stored);
    log_cli_info!(
        "Batch finished",
        requests = requests.len(),
        stored = stored.len()
    );
    Ok(())
}

/// One line per request, in input order.
fn report(requests: &[CopyDescriptor], stored: &StoredPaths) {
    for request in requests {
        let source = request.source();
        match stored.get(source) {
            Some(path) => println!("{} -> {}", source.display(), path.display()),
            None => println!("{} -> (linked in place)", source.display()),
        }
    }
}
