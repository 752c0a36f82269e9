//! CMK MINTD
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use anyhow::Result;
use clap::Parser;
use cmk_mintd::cli::CLIArgs;
use cmk_mintd::{get_work_directory, load_settings, run_mintd, setup_tracing};
use tokio::runtime::Runtime;

fn main() -> Result<()> {
    let args = CLIArgs::parse();
    let work_dir = get_work_directory(&args)?;

    let _log_guard = match args.enable_logging {
        true => Some(setup_tracing(&work_dir)?),
        false => None,
    };

    let settings = load_settings(&work_dir, args.config)?;

    tracing::debug!("{:?}", settings);

    let rt = Runtime::new()?;

    rt.block_on(run_mintd(&work_dir, &settings))
}
