//! Binary crate for the `citysky` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Interactive configuration
//! - Rendering pipeline status and results

use std::process::ExitCode;

use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // A missing .env is fine; the environment and config file still apply.
    let _ = dotenvy::dotenv();

    let cmd = cli::Cli::parse();
    cmd.init_logging();
    cmd.run().await
}
