//! DuckDB database backend implementation

use crate::dialect::{Dialect, DuckDbDialect};
use crate::error::{DbError, DbResult};
use crate::schema::{ColumnInfo, ForeignKeyInfo, IndexInfo};
use crate::traits::{Database, DatabaseCatalog, DatabaseCore};
use duckdb::Connection;
use op_core::SchemaMode;
use std::path::Path;

/// DuckDB database backend
///
/// Single-threaded, no `Mutex` needed because upgrades run sequentially.
pub struct DuckDbBackend {
    conn: Connection,
    schema_mode: SchemaMode,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn,
            schema_mode: SchemaMode::Managed,
        })
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| DbError::ConnectionError(format!("{e}: {}", path.display())))?;
        Ok(Self {
            conn,
            schema_mode: SchemaMode::Managed,
        })
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    /// Override the schema mode (defaults to managed)
    pub fn with_schema_mode(mut self, schema_mode: SchemaMode) -> Self {
        self.schema_mode = schema_mode;
        self
    }

    /// Borrow the underlying DuckDB connection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn literal(&self, value: &str) -> String {
        DuckDbDialect.quote_literal(value)
    }
}

/// Read a column value as a String, trying multiple DuckDB types.
///
/// DuckDB integer columns return `None` for `Option<String>`, so we try
/// String -> i64 -> f64 -> bool before giving up and reporting NULL.
fn get_column_as_string(row: &duckdb::Row<'_>, idx: usize) -> Option<String> {
    if let Ok(Some(s)) = row.get::<_, Option<String>>(idx) {
        return Some(s);
    }
    if let Ok(Some(n)) = row.get::<_, Option<i64>>(idx) {
        return Some(n.to_string());
    }
    if let Ok(Some(f)) = row.get::<_, Option<f64>>(idx) {
        return Some(f.to_string());
    }
    if let Ok(Some(b)) = row.get::<_, Option<bool>>(idx) {
        return Some(b.to_string());
    }
    None
}

/// Parse `constraint_text` of a DuckDB foreign key, e.g.
/// `FOREIGN KEY (hostid) REFERENCES hosts(hostid)`.
pub(crate) fn parse_foreign_key(text: &str) -> Option<ForeignKeyInfo> {
    let rest = text.trim().strip_prefix("FOREIGN KEY")?.trim_start();
    let (fields, rest) = split_paren_list(rest)?;
    let rest = rest.trim_start().strip_prefix("REFERENCES")?.trim_start();
    let open = rest.find('(')?;
    // The referenced table may be schema-qualified.
    let qualified = rest[..open].trim();
    let ref_table = unquote(qualified.rsplit('.').next().unwrap_or(qualified));
    let (ref_fields, _) = split_paren_list(&rest[open..])?;
    Some(ForeignKeyInfo {
        fields,
        ref_table,
        ref_fields,
        on_delete: None,
    })
}

fn split_paren_list(s: &str) -> Option<(Vec<String>, &str)> {
    let s = s.strip_prefix('(')?;
    let close = s.find(')')?;
    let items = s[..close].split(',').map(|i| unquote(i.trim())).collect();
    Some((items, &s[close + 1..]))
}

fn unquote(ident: &str) -> String {
    ident.trim_matches('"').replace("\"\"", "\"")
}

impl DatabaseCore for DuckDbBackend {
    fn execute(&self, sql: &str) -> DbResult<usize> {
        self.conn
            .execute(sql, [])
            .map_err(|e| DbError::ExecutionError(format!("{e}: {sql}")))
    }

    fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| DbError::ExecutionError(format!("{e}: {sql}")))
    }

    fn query_i64(&self, sql: &str) -> DbResult<Option<i64>> {
        match self
            .conn
            .query_row(sql, [], |row| row.get::<_, Option<i64>>(0))
        {
            Ok(value) => Ok(value),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn query_rows(&self, sql: &str) -> DbResult<Vec<Vec<Option<String>>>> {
        let mut stmt = self.conn.prepare(sql)?;
        // DuckDB panics on `stmt.column_count()` before execution, so the
        // column count is read from inside the row callback.
        let rows = stmt
            .query_map([], |row| {
                let col_count = row.as_ref().column_count();
                Ok((0..col_count)
                    .map(|i| get_column_as_string(row, i))
                    .collect())
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl DatabaseCatalog for DuckDbBackend {
    fn table_exists(&self, table: &str) -> DbResult<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = 'main' AND lower(table_name) = lower({})",
            self.literal(table)
        );
        Ok(self.query_i64(&sql)?.unwrap_or(0) > 0)
    }

    fn columns(&self, table: &str) -> DbResult<Vec<ColumnInfo>> {
        let sql = format!(
            "SELECT column_name, data_type, is_nullable, column_default \
             FROM information_schema.columns \
             WHERE table_schema = 'main' AND lower(table_name) = lower({}) \
             ORDER BY ordinal_position",
            self.literal(table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                    not_null: row.get::<_, String>(2)? == "NO",
                    default: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    fn primary_key(&self, table: &str) -> DbResult<Vec<String>> {
        let sql = format!(
            "SELECT unnest(constraint_column_names) FROM duckdb_constraints() \
             WHERE schema_name = 'main' AND lower(table_name) = lower({}) \
             AND constraint_type = 'PRIMARY KEY'",
            self.literal(table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn index_exists(&self, table: &str, index: &str) -> DbResult<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM duckdb_indexes() \
             WHERE schema_name = 'main' AND lower(table_name) = lower({}) \
             AND lower(index_name) = lower({})",
            self.literal(table),
            self.literal(index)
        );
        Ok(self.query_i64(&sql)?.unwrap_or(0) > 0)
    }

    fn indexes(&self, table: &str) -> DbResult<Vec<IndexInfo>> {
        let sql = format!(
            "SELECT index_name, sql FROM duckdb_indexes() \
             WHERE schema_name = 'main' AND lower(table_name) = lower({}) \
             AND sql IS NOT NULL ORDER BY index_name",
            self.literal(table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let indexes = stmt
            .query_map([], |row| {
                let sql: String = row.get(1)?;
                Ok(IndexInfo {
                    name: row.get(0)?,
                    sql: sql.trim().trim_end_matches(';').to_string(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(indexes)
    }

    fn foreign_keys(&self, table: &str) -> DbResult<Vec<ForeignKeyInfo>> {
        let sql = format!(
            "SELECT constraint_text FROM duckdb_constraints() \
             WHERE schema_name = 'main' AND lower(table_name) = lower({}) \
             AND constraint_type = 'FOREIGN KEY' ORDER BY constraint_index",
            self.literal(table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let texts = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(texts.iter().filter_map(|t| parse_foreign_key(t)).collect())
    }
}

impl Database for DuckDbBackend {
    fn dialect(&self) -> &dyn Dialect {
        &DuckDbDialect
    }

    fn schema_mode(&self) -> SchemaMode {
        self.schema_mode
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
