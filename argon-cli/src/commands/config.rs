//! Config command - manage the configuration file

use anyhow::{Context, Result};
use argon_core::config::{sample_config, CaptureConfiguration, ConfigFile, ContentFilter};
use clap::{Args, Subcommand};

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the path to the config file
    Path,

    /// Show the effective configuration
    Show {
        /// Print as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },

    /// Write the sample config file
    Init {
        /// Force overwrite if file exists
        #[arg(short, long)]
        force: bool,
    },

    /// Check the config file for errors and warnings
    Check,

    /// Print a sample configuration to stdout
    Sample,
}

/// Run config subcommand
pub async fn config(args: ConfigArgs) -> Result<()> {
    let path = ConfigFile::default_path();

    match args.command {
        ConfigCommand::Path => {
            println!("{}", path.display());
            if !path.exists() {
                println!("(file does not exist)");
            }
        }
        ConfigCommand::Show { json } => {
            let file = ConfigFile::load_from(path.clone()).context("Failed to load config")?;
            if !path.exists() {
                println!("# No file at {}, showing defaults\n", path.display());
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&file)?);
            } else {
                print!("{}", file.to_toml()?);
            }
        }
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                println!("Configuration file already exists: {}", path.display());
                println!("Use --force to overwrite, or edit the existing file.");
                return Ok(());
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
            std::fs::write(&path, sample_config()).context("Failed to write config file")?;
            println!("Created configuration file: {}", path.display());
        }
        ConfigCommand::Check => {
            let file = ConfigFile::load_from(path.clone()).context("Failed to load config")?;
            let kind = file.capture.capture_kind()?;
            let config = file
                .capture
                .apply_to(CaptureConfiguration::new(ContentFilter::display(0)))?;

            if let Err(e) = config.validate_strict() {
                anyhow::bail!("Invalid capture settings: {}", e);
            }
            let warnings = config.validate();
            for warning in &warnings {
                println!("warning: {}", warning);
            }
            println!(
                "{}: OK ({} capture, {} fps, queue depth {}, {} warnings)",
                path.display(),
                kind,
                config.fps(),
                config.queue_depth,
                warnings.len()
            );
        }
        ConfigCommand::Sample => {
            print!("{}", sample_config());
        }
    }

    Ok(())
}
