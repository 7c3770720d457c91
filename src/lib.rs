pub mod cli;
pub mod dashboard;
pub mod db;
pub mod dwell;
pub mod metrics;
pub mod settings;
pub mod utils;
pub mod vision;
pub mod zones;

use anyhow::{Context, Result};
use clap::Parser;

pub use cli::Cli;

pub fn run() -> Result<()> {
    utils::logging::init();

    let cli = Cli::parse();
    log::info!("zonewatch starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(cli::dispatch(cli))
}
