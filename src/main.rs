//! riskmeter binary entry point.

mod cli;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    // Best-effort: a missing .env file is not an error.
    let _ = dotenvy::dotenv();
    cli::run(cli::Cli::parse()).await
}
