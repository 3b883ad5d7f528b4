//! Shim binary that calls into the `hfscan_scanner` library's `inner_main`.
use clap::Parser as _;
use eyre::Result;

use hfscan_scanner::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Delegate to library entrypoint
    hfscan_scanner::inner_main(Cli::parse()).await
}
