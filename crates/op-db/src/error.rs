//! Error types for op-db

use thiserror::Error;

/// Database operation errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection error (D001)
    #[error("[D001] Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error (D002)
    #[error("[D002] SQL execution failed: {0}")]
    ExecutionError(String),

    /// Table not found (D003)
    #[error("[D003] Table not found: {0}")]
    TableNotFound(String),

    /// Column not found (D004)
    #[error("[D004] Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    /// Operation the backend cannot perform (D005)
    #[error("[D005] Operation not supported by {backend}: {operation}")]
    Unsupported { backend: String, operation: String },

    /// Invalid schema definition (D006)
    #[error("[D006] Invalid schema definition: {0}")]
    InvalidDefinition(String),

    /// Transaction management error (D007)
    #[error("[D007] Transaction failed: {0}")]
    TransactionError(String),
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        // duckdb::Error does not expose structured variants, so the message
        // is the only thing to classify on.
        let msg = err.to_string();
        if msg.contains("Table with name")
            || (msg.contains("Catalog Error") && msg.contains("Table") && msg.contains("not found"))
        {
            DbError::TableNotFound(msg)
        } else {
            DbError::ExecutionError(msg)
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        let msg = err.to_string();
        if msg.contains("no such table") {
            DbError::TableNotFound(msg)
        } else {
            DbError::ExecutionError(msg)
        }
    }
}
