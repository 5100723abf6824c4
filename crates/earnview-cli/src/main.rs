//! Earnview CLI - Playback-reward controller harness
//!
//! Features:
//! - Scripted simulation on a virtual clock
//! - Queue and balance inspection against a live backend
//! - Controller config validation

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;
mod script;

use output::OutputFormat;

/// Earnview CLI - watch-to-earn controller toolkit
#[derive(Parser)]
#[command(name = "earnview")]
#[command(author = "Earnview Developers")]
#[command(version)]
#[command(about = "Simulate and inspect the playback-reward controller", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation script
    Simulate {
        /// Path to the script JSON
        script: PathBuf,

        /// Use the wall clock instead of virtual time
        #[arg(long)]
        realtime: bool,
    },

    /// Show the video queue for a user
    Queue {
        /// User id
        #[arg(short, long)]
        user: String,

        /// Controller config used for eligibility checks
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        rpc: commands::RpcArgs,
    },

    /// Show the coin balance for a user
    Balance {
        /// User id
        #[arg(short, long)]
        user: String,

        #[command(flatten)]
        rpc: commands::RpcArgs,
    },

    /// Validate and print controller configuration
    Config {
        /// Config file (defaults when omitted)
        file: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    earnview_core::init();

    let format = OutputFormat::from(cli.format.as_str());
    match cli.command {
        Commands::Simulate { script, realtime } => {
            commands::simulate(&script, realtime, format).await?;
        }
        Commands::Queue { user, config, rpc } => {
            commands::queue(&user, rpc, config, format).await?;
        }
        Commands::Balance { user, rpc } => {
            commands::balance(&user, rpc, format).await?;
        }
        Commands::Config { file } => {
            commands::config(file.as_deref(), format)?;
        }
    }

    Ok(())
}
