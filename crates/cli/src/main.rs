//! Harbor CLI — the main entry point.
//!
//! Commands:
//! - `serve`  — Start the HTTP gateway
//! - `ask`    — Answer a single question in the terminal
//! - `init`   — Write a default config file
//! - `doctor` — Diagnose configuration, model and store

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "harbor",
    about = "Harbor — port regulations assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $HARBOR_CONFIG or ~/.harbor/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask a single question
    Ask {
        /// The question
        #[arg(short, long)]
        message: String,

        /// Print the assembled answer as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Diagnose system health
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Ask { message, json } => commands::ask::run(config_path, &message, json).await?,
        Commands::Init { force } => commands::init::run(config_path, force)?,
        Commands::Doctor => commands::doctor::run(config_path).await?,
    }

    Ok(())
}
