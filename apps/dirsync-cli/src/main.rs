//! dirsync CLI - Command-line interface for directory account sync
//!
//! This CLI enables operators to:
//! - List the configured directory servers
//! - Test the bind credentials of a server
//! - Import a server's accounts into the local store

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod context;

/// dirsync CLI - LDAP account synchronization
#[derive(Parser)]
#[command(name = "dirsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, global = true, env = "DIRSYNC_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured directory servers
    Servers(commands::servers::ServersArgs),

    /// Open, bind and close a connection to a server
    TestConnection(commands::test_connection::TestConnectionArgs),

    /// Pull every account of a server into the local store
    Import(commands::import::ImportArgs),
}

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,dirsync=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = context::Context::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Servers(args) => commands::servers::execute(&ctx, args).await,
        Commands::TestConnection(args) => commands::test_connection::execute(&ctx, args).await,
        Commands::Import(args) => commands::import::execute(&ctx, args).await,
    }
}
