// ABOUTME: CLI argument parsing and command routing for gitbar
//
// Provides command-line interface for:
// - Watching tracked repositories and printing changes (watch, default)
// - One-shot status of specific repositories (status)
// - Listing projects found by discovery (discover)
// - Checking the git tool and configuration (check)

pub mod check;
pub mod discover;
pub mod status;
pub mod util;
pub mod watch;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::EngineConfig;

/// Keep many local git repositories under continuous watch
#[derive(Parser)]
#[command(name = "gitbar")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Config file layered over the default locations
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Track repositories and print every status change (default if no command given)
    Watch(WatchArgs),

    /// Probe repositories once and print their status
    Status(StatusArgs),

    /// List projects found in editor and agent manifests
    Discover,

    /// Verify git is usable and show the effective configuration
    Check,
}

/// Arguments for the watch command
#[derive(clap::Args, Default)]
pub struct WatchArgs {
    /// Repository to track in addition to configured projects (repeatable)
    #[arg(long = "path")]
    pub paths: Vec<PathBuf>,

    /// Only track configured and --path projects
    #[arg(long)]
    pub no_discovery: bool,
}

/// Arguments for the status command
#[derive(clap::Args)]
pub struct StatusArgs {
    /// Repository paths
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

/// Load configuration for a command, honouring `--config`
pub fn load_config(explicit: Option<&PathBuf>) -> Result<EngineConfig> {
    EngineConfig::load_with(explicit.map(PathBuf::as_path)).context("Failed to load configuration")
}
