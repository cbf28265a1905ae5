//! Configuration types and parsing for outpost.yml

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration from outpost.yml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Database connection configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Role this process plays in the deployment
    #[serde(default)]
    pub role: DeploymentRole,

    /// Schema upgrade behaviour
    #[serde(default)]
    pub upgrade: UpgradeConfig,
}

/// Database type selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    /// DuckDB (default)
    #[default]
    DuckDb,
    /// SQLite
    Sqlite,
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbType::DuckDb => write!(f, "duckdb"),
            DbType::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Whether the deployment's schema may be changed by the upgrade engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchemaMode {
    /// Schema is owned by Outpost and upgraded at startup (default)
    #[default]
    Managed,
    /// Schema is provisioned externally and must never be altered
    Fixed,
}

/// Deployment role of the running process.
///
/// Patch bodies consult this to skip changes that only apply to one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentRole {
    /// Full monitoring server (default)
    #[default]
    Server,
    /// Lightweight relay collecting data on behalf of a server
    Proxy,
}

impl DeploymentRole {
    /// Returns true for the full server role
    pub fn is_server(self) -> bool {
        self == DeploymentRole::Server
    }
}

impl std::fmt::Display for DeploymentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentRole::Server => write!(f, "server"),
            DeploymentRole::Proxy => write!(f, "proxy"),
        }
    }
}

/// What happens to an optional patch's lineage when the patch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OptionalFailurePolicy {
    /// Leave the watermark in place and stop that lineage for this run, so
    /// the failed patch is attempted again on the next run (default)
    #[default]
    Retry,
    /// Advance the watermark past the failed patch; it is never retried
    Advance,
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database type (duckdb or sqlite)
    #[serde(rename = "type", default)]
    pub db_type: DbType,

    /// Database file path, or `:memory:`
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Schema mode (managed or fixed)
    #[serde(default)]
    pub schema: SchemaMode,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: DbType::default(),
            path: default_db_path(),
            schema: SchemaMode::default(),
        }
    }
}

/// Upgrade engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpgradeConfig {
    /// Policy for failed optional patches
    #[serde(default)]
    pub optional_failures: OptionalFailurePolicy,

    /// Stop after this patch version instead of upgrading to the newest
    #[serde(default)]
    pub target_version: Option<i64>,
}

const DEFAULT_DB_PATH: &str = "outpost.duckdb";

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&content)
    }

    /// Load configuration from a directory
    /// Looks for outpost.yml or outpost.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("outpost.yml");
        let yaml_path = dir.join("outpost.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Parse and validate configuration from YAML text
    pub fn parse(content: &str) -> CoreResult<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> CoreResult<()> {
        if self.database.path.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "database.path cannot be empty".to_string(),
            });
        }

        if let Some(target) = self.upgrade.target_version {
            if target <= 0 {
                return Err(CoreError::ConfigInvalid {
                    message: format!("upgrade.target_version must be positive, got {target}"),
                });
            }
        }

        if self.database.schema == SchemaMode::Fixed && self.database.path == ":memory:" {
            log::warn!("A fixed schema on an in-memory database can never be upgraded");
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
