use anyhow::Result;
use clap::{Parser, Subcommand};

mod cli;

/// newsletter - engagement tracking for newsletters
#[derive(Parser)]
#[command(name = "newsletter")]
#[command(about = "Signed tracking links, engagement events and daily snapshots", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Server host address (overrides config file)
        #[arg(long)]
        host: Option<String>,

        /// Server port (overrides config file)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run database migrations
    Migrate,
    /// Drop database if exists and recreate with migrations
    Reset,
    /// Issue, inspect and revoke tracking tokens
    Token {
        #[command(subcommand)]
        command: cli::token::TokenCommand,
    },
    /// Manage tracked links
    Link {
        #[command(subcommand)]
        command: cli::link::LinkCommand,
    },
    /// Delete revocation rows of expired tokens
    Prune,
    /// Regenerate analytics snapshots for a date range
    Snapshot(cli::maintenance::SnapshotArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = newsletter::Config::load(cli.config)?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    newsletter::observability::init_observability(
        "newsletter",
        env!("CARGO_PKG_VERSION"),
        &config.observability.log_level,
    )?;

    match cli.command {
        Commands::Serve { host, port } => cli::server::serve(config, host, port).await,
        Commands::Migrate => newsletter::migrate::migrate(&config).await,
        Commands::Reset => newsletter::migrate::reset(&config).await,
        Commands::Token { command } => cli::token::run(config, command).await,
        Commands::Link { command } => cli::link::run(config, command).await,
        Commands::Prune => cli::maintenance::prune(config).await,
        Commands::Snapshot(args) => cli::maintenance::snapshot(config, args).await,
    }
}
