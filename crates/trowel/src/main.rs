//! Trowel CLI - static site build pipeline with live reload.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "trowel")]
#[command(about = "Static site build pipeline with live reload")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to trowel.toml config file
    #[arg(short, long, default_value = "trowel.toml", global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the site once (the default)
    Build {
        /// Output directory (defaults to config or "dist")
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build, then rebuild whenever sources change
    Watch,

    /// Build, watch, and serve the output with live reload
    Start {
        /// Port to listen on (defaults to config or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },

    /// Scaffold a starter project in the current directory
    Init {
        /// Overwrite existing files
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    // Execute command
    match cli.command.unwrap_or(Commands::Build { output: None }) {
        Commands::Build { output } => {
            commands::build::run(&cli.config, output).await?;
        }
        Commands::Watch => {
            commands::watch::run(&cli.config).await?;
        }
        Commands::Start {
            port,
            host,
            no_open,
        } => {
            commands::start::run(&cli.config, port, host, !no_open).await?;
        }
        Commands::Init { yes } => {
            commands::init::run(&cli.config, yes).await?;
        }
    }

    Ok(())
}
