//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand};

/// Outpost - schema upgrades for the Outpost monitoring database
#[derive(Parser, Debug)]
#[command(name = "outpost")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (default: outpost.yml in the current directory)
    #[arg(short, long, global = true, env = "OUTPOST_CONFIG")]
    pub config: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending schema patches
    Migrate(MigrateArgs),

    /// Show schema versions and pending patches
    Status(StatusArgs),
}

/// Arguments for the migrate command
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Stop after this patch version (overrides upgrade.target_version)
    #[arg(short, long)]
    pub target: Option<i64>,
}

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
