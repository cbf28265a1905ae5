//! Shared helpers for commands

use anyhow::{Context, Result};
use op_core::Config;
use op_db::Database;
use std::path::Path;

use crate::cli::GlobalArgs;

/// Load the config named by `--config`, or `outpost.yml` from the current directory
pub(crate) fn load_config(global: &GlobalArgs) -> Result<Config> {
    match &global.config {
        Some(path) => Config::load(Path::new(path))
            .with_context(|| format!("Failed to load config from {path}")),
        None => Config::load_from_dir(Path::new(".")).context("Failed to load config"),
    }
}

/// Open the configured database
pub(crate) fn open_database(config: &Config) -> Result<Box<dyn Database>> {
    log::debug!(
        "Opening {} database at {}",
        config.database.db_type,
        config.database.path
    );
    op_db::connect(&config.database).with_context(|| {
        format!(
            "Failed to open {} database at {}",
            config.database.db_type, config.database.path
        )
    })
}
