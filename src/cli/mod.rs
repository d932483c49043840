//! Command-line interface.

mod rate;
mod serve;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use riskmeter::config::Config;

/// Cached LLM risk meter for news headlines.
#[derive(Debug, Parser)]
#[command(name = "riskmeter", version, about)]
pub(crate) struct Cli {
    /// JSON config file (defaults to $RISKMETER_CONFIG, then built-in defaults).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Run the HTTP server (default).
    Serve {
        /// Override the bind address.
        #[arg(long)]
        bind: Option<String>,
        /// Override the listen port.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Rate a JSON array of items once and print the verdict.
    Rate {
        /// Input file, or `-` for stdin.
        input: PathBuf,
    },
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let path = self.config.clone().or_else(Config::path_from_env);
        Config::load(path.as_deref()).with_context(|| match &path {
            Some(p) => format!("Failed to load configuration from {}", p.display()),
            None => "Failed to load configuration".to_string(),
        })
    }
}

pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = cli.load_config()?;
    riskmeter::logging::init(&config.logging);

    match cli.command {
        Some(Command::Rate { input }) => rate::cmd_rate(config, input).await,
        Some(Command::Serve { bind, port }) => serve::cmd_serve(config, bind, port).await,
        None => serve::cmd_serve(config, None, None).await,
    }
}
