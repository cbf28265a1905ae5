//! SQLite database backend implementation
//!
//! SQLite's `ALTER TABLE` only renames tables and adds, renames or drops
//! columns. Everything else (column types, defaults, nullability, foreign
//! keys) is applied by [`SqliteBackend::rebuild_table`]: create a copy with
//! the new definition, copy the rows, drop the original, rename the copy and
//! recreate the original's indexes.

use crate::dialect::{Dialect, SqliteDialect};
use crate::error::{DbError, DbResult};
use crate::schema::{ColumnInfo, ForeignKeyInfo, IndexInfo, TableChange};
use crate::traits::{Database, DatabaseCatalog, DatabaseCore};
use op_core::SchemaMode;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::Path;

/// SQLite database backend
pub struct SqliteBackend {
    conn: Connection,
    schema_mode: SchemaMode,
}

impl SqliteBackend {
    /// Create a new in-memory SQLite connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn,
            schema_mode: SchemaMode::Managed,
        })
    }

    /// Create a new SQLite connection from a file path
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

    /// Borrow the underlying SQLite connection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn literal(&self, value: &str) -> String {
        SqliteDialect.quote_literal(value)
    }

    fn column_sql(&self, column: &ColumnInfo) -> String {
        let mut sql = SqliteDialect.quote_ident(&column.name);
        if !column.data_type.is_empty() {
            sql.push(' ');
            sql.push_str(&column.data_type);
        }
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        if column.not_null {
            sql.push_str(" NOT NULL");
        }
        sql
    }

    fn foreign_key_sql(&self, fk: &ForeignKeyInfo) -> String {
        let d = SqliteDialect;
        let mut sql = format!(
            "FOREIGN KEY ({}) REFERENCES {}",
            d.ident_list(&fk.fields),
            d.quote_ident(&fk.ref_table)
        );
        if !fk.ref_fields.is_empty() {
            sql.push_str(&format!(" ({})", d.ident_list(&fk.ref_fields)));
        }
        if let Some(action) = &fk.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action);
        }
        sql
    }
}

fn value_as_string(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(n) => Some(n.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(format!("<{} bytes>", b.len())),
    }
}

fn find_column<'a>(
    columns: &'a mut [ColumnInfo],
    table: &str,
    name: &str,
) -> DbResult<&'a mut ColumnInfo> {
    columns
        .iter_mut()
        .find(|c| c.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| DbError::ColumnNotFound {
            table: table.to_string(),
            column: name.to_string(),
        })
}

impl DatabaseCore for SqliteBackend {
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
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn query_rows(&self, sql: &str) -> DbResult<Vec<Vec<Option<String>>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let col_count = stmt.column_count();
        let rows = stmt
            .query_map([], |row| {
                (0..col_count)
                    .map(|i| row.get_ref(i).map(value_as_string))
                    .collect::<Result<Vec<_>, _>>()
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl DatabaseCatalog for SqliteBackend {
    fn table_exists(&self, table: &str) -> DbResult<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND lower(name) = lower({})",
            self.literal(table)
        );
        Ok(self.query_i64(&sql)?.unwrap_or(0) > 0)
    }

    fn columns(&self, table: &str) -> DbResult<Vec<ColumnInfo>> {
        let sql = format!(
            "SELECT name, type, \"notnull\", dflt_value FROM pragma_table_info({}) ORDER BY cid",
            self.literal(table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                    not_null: row.get::<_, i64>(2)? != 0,
                    default: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    fn primary_key(&self, table: &str) -> DbResult<Vec<String>> {
        let sql = format!(
            "SELECT name FROM pragma_table_info({}) WHERE pk > 0 ORDER BY pk",
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
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'index' AND lower(tbl_name) = lower({}) AND lower(name) = lower({})",
            self.literal(table),
            self.literal(index)
        );
        Ok(self.query_i64(&sql)?.unwrap_or(0) > 0)
    }

    // Indexes backing PRIMARY KEY and UNIQUE constraints have no SQL.
    fn indexes(&self, table: &str) -> DbResult<Vec<IndexInfo>> {
        let sql = format!(
            "SELECT name, sql FROM sqlite_master \
             WHERE type = 'index' AND lower(tbl_name) = lower({}) AND sql IS NOT NULL",
            self.literal(table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let indexes = stmt
            .query_map([], |row| {
                Ok(IndexInfo {
                    name: row.get(0)?,
                    sql: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(indexes)
    }

    fn foreign_keys(&self, table: &str) -> DbResult<Vec<ForeignKeyInfo>> {
        let sql = format!(
            "SELECT id, \"from\", \"to\", \"table\", on_delete \
             FROM pragma_foreign_key_list({}) ORDER BY id, seq",
            self.literal(table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut keys: Vec<(i64, ForeignKeyInfo)> = Vec::new();
        for (id, from, to, ref_table, on_delete) in rows {
            if keys.last().map(|(last, _)| *last) != Some(id) {
                keys.push((
                    id,
                    ForeignKeyInfo {
                        fields: Vec::new(),
                        ref_table,
                        ref_fields: Vec::new(),
                        on_delete: (on_delete != "NO ACTION").then_some(on_delete),
                    },
                ));
            }
            if let Some((_, key)) = keys.last_mut() {
                key.fields.push(from);
                key.ref_fields.extend(to);
            }
        }
        Ok(keys.into_iter().map(|(_, key)| key).collect())
    }
}

impl Database for SqliteBackend {
    fn dialect(&self) -> &dyn Dialect {
        &SqliteDialect
    }

    fn schema_mode(&self) -> SchemaMode {
        self.schema_mode
    }

    fn rebuild_table(&self, table: &str, change: &TableChange) -> DbResult<()> {
        let mut columns = self.columns(table)?;
        if columns.is_empty() {
            return Err(DbError::TableNotFound(table.to_string()));
        }
        let primary_key = self.primary_key(table)?;
        let mut foreign_keys = self.foreign_keys(table)?;
        let indexes = self.indexes(table)?;

        match change {
            TableChange::ModifyType(field) => {
                find_column(&mut columns, table, &field.name)?.data_type =
                    SqliteDialect.column_type(field.field_type);
            }
            TableChange::SetDefault(field) => {
                find_column(&mut columns, table, &field.name)?.default = field
                    .default
                    .as_ref()
                    .map(|d| SqliteDialect.default_literal(d));
            }
            TableChange::DropDefault(name) => {
                find_column(&mut columns, table, name)?.default = None;
            }
            TableChange::SetNotNull(name) => {
                find_column(&mut columns, table, name)?.not_null = true;
            }
            TableChange::DropNotNull(name) => {
                find_column(&mut columns, table, name)?.not_null = false;
            }
            TableChange::AddForeignKey(fk) => foreign_keys.push(ForeignKeyInfo::from(fk)),
            TableChange::DropForeignKey(fk) => foreign_keys.retain(|k| !k.matches(fk)),
        }

        let d = SqliteDialect;
        let scratch = format!("{table}__rebuild");
        let mut parts: Vec<String> = columns.iter().map(|c| self.column_sql(c)).collect();
        if !primary_key.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", d.ident_list(&primary_key)));
        }
        parts.extend(foreign_keys.iter().map(|fk| self.foreign_key_sql(fk)));

        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let column_list = d.ident_list(&names);

        log::debug!("Rebuilding SQLite table {table} for {}", change.operation());
        self.execute(&format!(
            "CREATE TABLE {} ({})",
            d.quote_ident(&scratch),
            parts.join(", ")
        ))?;
        self.execute(&format!(
            "INSERT INTO {} ({column_list}) SELECT {column_list} FROM {}",
            d.quote_ident(&scratch),
            d.quote_ident(table)
        ))?;
        self.execute(&d.drop_table_sql(table))?;
        self.execute(&d.rename_table_sql(&scratch, table))?;
        for index in &indexes {
            self.execute(&index.sql)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "sqlite_test.rs"]
mod tests;
