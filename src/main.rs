mod artifacts;
mod cli;
mod engine;
mod locate;
mod model;
mod orchestrator;
mod text_report;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    cli::run(args).await
}
