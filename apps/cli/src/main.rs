//! buildwatch CLI — CI build-failure notifier.
//!
//! Polls the CI-build service for the latest build of a project and, when it
//! failed, emails a trimmed window of its execution log to an operator.

mod commands;

use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
