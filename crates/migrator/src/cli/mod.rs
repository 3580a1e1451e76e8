mod migrate;

pub use migrate::{load_config, ConnectionArgs};

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Apply versioned SQL migration scripts to PostgreSQL or SQL Server.
#[derive(Parser)]
#[command(name = "migrator")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// CLI commands.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Apply all pending scripts (default).
    Up,

    /// Show applied and pending scripts.
    Status,
}

impl Cli {
    /// Execute the CLI command, returning the process exit code.
    pub async fn execute(self) -> Result<i32> {
        let log_level = if self.verbose { "debug" } else { "info" };
        tracing_subscriber::fmt()
            .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string()))
            .with_writer(std::io::stderr)
            .init();

        let config = load_config(&self.connection)?;

        match self.command.unwrap_or(Commands::Up) {
            Commands::Up => migrate::up(config).await,
            Commands::Status => migrate::status(config).await,
        }
    }
}
