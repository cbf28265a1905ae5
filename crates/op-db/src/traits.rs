//! Database trait definitions

use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::schema::{ColumnInfo, ForeignKeyInfo, IndexInfo, TableChange};
use op_core::{DbType, SchemaMode};

/// Statement execution and transaction control.
///
/// Calls are synchronous; the upgrade engine runs single-threaded during
/// startup, so implementations hold one connection without locking.
pub trait DatabaseCore {
    /// Execute a single statement, returns affected rows
    fn execute(&self, sql: &str) -> DbResult<usize>;

    /// Execute multiple statements separated by `;`
    fn execute_batch(&self, sql: &str) -> DbResult<()>;

    /// First column of the first row as an integer; `None` for no row or NULL
    fn query_i64(&self, sql: &str) -> DbResult<Option<i64>>;

    /// All rows, every value rendered as text (`None` for NULL)
    fn query_rows(&self, sql: &str) -> DbResult<Vec<Vec<Option<String>>>>;

    fn begin(&self) -> DbResult<()> {
        self.execute_batch("BEGIN TRANSACTION")
            .map_err(|e| DbError::TransactionError(format!("BEGIN failed: {e}")))
    }

    fn commit(&self) -> DbResult<()> {
        self.execute_batch("COMMIT")
            .map_err(|e| DbError::TransactionError(format!("COMMIT failed: {e}")))
    }

    fn rollback(&self) -> DbResult<()> {
        self.execute_batch("ROLLBACK")
            .map_err(|e| DbError::TransactionError(format!("ROLLBACK failed: {e}")))
    }
}

/// Schema introspection
pub trait DatabaseCatalog {
    fn table_exists(&self, table: &str) -> DbResult<bool>;

    /// Columns in declaration order; empty if the table does not exist
    fn columns(&self, table: &str) -> DbResult<Vec<ColumnInfo>>;

    /// Primary key columns in key order
    fn primary_key(&self, table: &str) -> DbResult<Vec<String>>;

    fn index_exists(&self, table: &str, index: &str) -> DbResult<bool>;

    /// Explicit indexes of the table, without the primary key
    fn indexes(&self, table: &str) -> DbResult<Vec<IndexInfo>>;

    fn foreign_keys(&self, table: &str) -> DbResult<Vec<ForeignKeyInfo>>;

    /// Column lookup by case-insensitive name
    fn column(&self, table: &str, column: &str) -> DbResult<Option<ColumnInfo>> {
        Ok(self
            .columns(table)?
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(column)))
    }
}

/// A connected backend
pub trait Database: DatabaseCore + DatabaseCatalog {
    /// SQL dialect of this backend
    fn dialect(&self) -> &dyn Dialect;

    /// Whether this deployment's schema may be changed
    fn schema_mode(&self) -> SchemaMode;

    /// Backend type identifier for logging
    fn db_type(&self) -> DbType {
        self.dialect().db_type()
    }

    /// Apply `change` by recreating the table.
    ///
    /// Used for changes the dialect cannot express as a single statement.
    /// Backends without an emulation report [`DbError::Unsupported`].
    fn rebuild_table(&self, _table: &str, change: &TableChange) -> DbResult<()> {
        Err(DbError::Unsupported {
            backend: self.db_type().to_string(),
            operation: change.operation().to_string(),
        })
    }
}

/// Execute `body` within a `BEGIN` / `COMMIT` transaction, rolling back on
/// error.
///
/// A failed rollback is logged and the body's error is returned, since that
/// is the error the caller can act on.
pub fn with_transaction<T, E, F>(db: &dyn Database, body: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<DbError>,
{
    db.begin()?;

    let result = body();

    match &result {
        Ok(_) => {
            if let Err(commit_err) = db.commit() {
                if let Err(e) = db.rollback() {
                    log::warn!("Rollback after failed commit also failed: {e}");
                }
                return Err(commit_err.into());
            }
        }
        Err(_) => {
            if let Err(e) = db.rollback() {
                log::warn!("Rollback failed: {e}");
            }
        }
    }
    result
}
