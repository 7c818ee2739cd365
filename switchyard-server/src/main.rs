//! switchyard: pub/sub document relay daemon.
//!
//! Accepts document batches on `POST /{schemaType}`, relays them to the
//! webhooks subscribed to that type and takes `subscribe` commands on
//! `POST /command`.

use anyhow::Result;
use clap::Parser;
use switchyard_server::{cli::Cli, run_with_cli};

#[tokio::main]
async fn main() -> Result<()> {
    run_with_cli(Cli::parse()).await
}
