//! CLI command definitions and dispatch.

mod cache;
mod compat;
mod parsers;
mod version;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ocifit_core::FitConfig;

/// ocifit: compatibility specifications for container images.
#[derive(Parser)]
#[command(name = "ocifit", version, about)]
pub struct Cli {
    /// Path to a YAML config file (default: ~/.ocifit/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Generate a compatibility spec from a Dockerfile or image reference
    Compat(compat::CompatArgs),
    /// Inspect or remove cached specs
    Cache(cache::CacheArgs),
    /// List available parsers
    Parsers(parsers::ParsersArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli, config: FitConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Compat(args) => compat::execute(args, &config).await,
        Command::Cache(args) => cache::execute(args, &config).await,
        Command::Parsers(args) => parsers::execute(args, &config).await,
        Command::Version(args) => version::execute(args).await,
    }
}
