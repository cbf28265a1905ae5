//! op-core - Core library for Outpost
//!
//! This crate provides the configuration file format and the small shared
//! enums (database type, schema mode, deployment role, optional-failure
//! policy) used across the Outpost upgrade components.

pub mod config;
pub mod error;

pub use config::{
    Config, DatabaseConfig, DbType, DeploymentRole, OptionalFailurePolicy, SchemaMode,
    UpgradeConfig,
};
pub use error::{CoreError, CoreResult};
