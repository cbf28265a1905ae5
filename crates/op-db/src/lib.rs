//! op-db - Database abstraction layer for Outpost
//!
//! This crate provides the `Database` traits, DuckDB and SQLite backends,
//! per-backend SQL dialects and the portable DDL primitives that schema
//! patches are written against.

pub mod ddl;
pub mod dialect;
pub mod duckdb;
pub mod error;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use ddl::Ddl;
pub use dialect::{Dialect, DuckDbDialect, SqliteDialect};
pub use duckdb::DuckDbBackend;
pub use error::{DbError, DbResult};
pub use schema::{
    ColumnInfo, DefaultValue, FieldDef, FieldType, FkAction, ForeignKeyDef, ForeignKeyInfo,
    IndexDef, IndexInfo, TableChange, TableDef,
};
pub use sqlite::SqliteBackend;
pub use traits::{with_transaction, Database, DatabaseCatalog, DatabaseCore};

use op_core::{DatabaseConfig, DbType};

/// Open the backend described by `config`
pub fn connect(config: &DatabaseConfig) -> DbResult<Box<dyn Database>> {
    let db: Box<dyn Database> = match config.db_type {
        DbType::DuckDb => {
            Box::new(DuckDbBackend::new(&config.path)?.with_schema_mode(config.schema))
        }
        DbType::Sqlite => {
            Box::new(SqliteBackend::new(&config.path)?.with_schema_mode(config.schema))
        }
    };
    Ok(db)
}
