//! Library entrypoint for switchyard-server so embedders and tests can reuse
//! the router and actor wiring without going through the binary.

pub mod buffer;
pub mod cli;
pub mod config;
pub mod delivery;
pub mod server;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::config::RelayConfig;

fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Run the relay daemon using CLI args (parsed by the caller).
pub async fn run_with_cli(cli: cli::Cli) -> Result<()> {
    init_tracing(cli.verbose)?;

    let cfg = RelayConfig::from_cli(&cli)?;
    server::serve(cfg).await
}
