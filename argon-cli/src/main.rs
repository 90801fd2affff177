//! Argon CLI
//!
//! Screen sharing into a video session.
//!
//! # Usage
//!
//! ```bash
//! # List shareable displays and windows
//! argon list-sources
//!
//! # Share a display into a loopback session
//! argon share --kind display --preset 1080p30
//!
//! # Manage the config file
//! argon config init
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Argon - screen sharing into a video session
#[derive(Parser)]
#[command(name = "argon")]
#[command(version)]
#[command(about = "Screen sharing into a video session", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List shareable displays, windows and applications
    #[command(alias = "ls")]
    ListSources(commands::ListArgs),

    /// Share the screen into a loopback session until interrupted
    Share(commands::ShareArgs),

    /// Manage the configuration file
    Config(commands::ConfigArgs),

    /// Show platform capabilities
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("argon_core={}", level).parse()?)
                .add_directive(format!("argon={}", level).parse()?),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::ListSources(args) => commands::list_sources(args).await?,
        Commands::Share(args) => commands::share(args).await?,
        Commands::Config(args) => commands::config(args).await?,
        Commands::Info => commands::info().await?,
    }

    Ok(())
}
