//! Portable schema-change primitives.
//!
//! Every primitive inspects the catalog before emitting SQL and skips work
//! that is already done, so a patch can be re-run after a partial earlier
//! attempt on backends without transactional DDL.

use crate::error::{DbError, DbResult};
use crate::schema::{FieldDef, ForeignKeyDef, IndexDef, TableChange, TableDef};
use crate::traits::Database;

/// DDL primitives bound to one connection
#[derive(Clone, Copy)]
pub struct Ddl<'a> {
    db: &'a dyn Database,
}

impl<'a> Ddl<'a> {
    pub fn new(db: &'a dyn Database) -> Self {
        Self { db }
    }

    fn require_table(&self, table: &str) -> DbResult<()> {
        if self.db.table_exists(table)? {
            Ok(())
        } else {
            Err(DbError::TableNotFound(table.to_string()))
        }
    }

    fn require_column(&self, table: &str, field: &str) -> DbResult<crate::ColumnInfo> {
        self.require_table(table)?;
        self.db
            .column(table, field)?
            .ok_or_else(|| DbError::ColumnNotFound {
                table: table.to_string(),
                column: field.to_string(),
            })
    }

    /// Apply `change` with the dialect's statement, or by rebuilding the table
    fn alter(&self, table: &str, change: TableChange) -> DbResult<()> {
        match self.db.dialect().alter_table_sql(table, &change) {
            Some(sql) => self.alter_statements(table, &[sql]),
            None => self.db.rebuild_table(table, &change),
        }
    }

    /// Execute `ALTER TABLE` statements, dropping the table's indexes first
    /// and recreating them afterwards on backends that require it
    fn alter_statements(&self, table: &str, statements: &[String]) -> DbResult<()> {
        let dialect = self.db.dialect();
        let indexes = if dialect.alter_blocked_by_indexes() {
            self.db.indexes(table)?
        } else {
            Vec::new()
        };
        for index in &indexes {
            log::debug!("Dropping index {} while altering {table}", index.name);
            self.db.execute(&dialect.drop_index_sql(table, &index.name))?;
        }
        for sql in statements {
            self.db.execute(sql)?;
        }
        for index in &indexes {
            self.db.execute(&index.sql)?;
        }
        Ok(())
    }

    pub fn create_table(&self, table: &TableDef) -> DbResult<()> {
        if table.fields.is_empty() {
            return Err(DbError::InvalidDefinition(format!(
                "table '{}' has no fields",
                table.name
            )));
        }
        if self.db.table_exists(&table.name)? {
            log::debug!("Table {} already exists, skipping create", table.name);
            return Ok(());
        }
        self.db
            .execute(&self.db.dialect().create_table_sql(table))
            .map(|_| ())
    }

    pub fn rename_table(&self, old: &str, new: &str) -> DbResult<()> {
        if !self.db.table_exists(old)? && self.db.table_exists(new)? {
            log::debug!("Table {old} already renamed to {new}, skipping");
            return Ok(());
        }
        self.db
            .execute(&self.db.dialect().rename_table_sql(old, new))
            .map(|_| ())
    }

    pub fn drop_table(&self, table: &str) -> DbResult<()> {
        if !self.db.table_exists(table)? {
            log::debug!("Table {table} does not exist, skipping drop");
            return Ok(());
        }
        self.db
            .execute(&self.db.dialect().drop_table_sql(table))
            .map(|_| ())
    }

    pub fn add_field(&self, table: &str, field: &FieldDef) -> DbResult<()> {
        self.require_table(table)?;
        if self.db.column(table, &field.name)?.is_some() {
            log::debug!("Column {table}.{} already exists, skipping add", field.name);
            return Ok(());
        }
        self.alter_statements(table, &self.db.dialect().add_field_sql(table, field))
    }

    pub fn rename_field(&self, table: &str, old: &str, new: &str) -> DbResult<()> {
        self.require_table(table)?;
        if self.db.column(table, old)?.is_none() && self.db.column(table, new)?.is_some() {
            log::debug!("Column {table}.{old} already renamed to {new}, skipping");
            return Ok(());
        }
        self.db
            .execute(&self.db.dialect().rename_field_sql(table, old, new))
            .map(|_| ())
    }

    pub fn modify_field_type(&self, table: &str, field: &FieldDef) -> DbResult<()> {
        let current = self.require_column(table, &field.name)?;
        let wanted = self.db.dialect().column_type(field.field_type);
        if current.data_type.eq_ignore_ascii_case(&wanted) {
            log::debug!("Column {table}.{} already has type {wanted}", field.name);
            return Ok(());
        }
        self.alter(table, TableChange::ModifyType(field.clone()))
    }

    /// Set the column default to `field.default`
    pub fn set_default(&self, table: &str, field: &FieldDef) -> DbResult<()> {
        self.require_column(table, &field.name)?;
        self.alter(table, TableChange::SetDefault(field.clone()))
    }

    pub fn drop_default(&self, table: &str, field: &str) -> DbResult<()> {
        if self.require_column(table, field)?.default.is_none() {
            log::debug!("Column {table}.{field} has no default, skipping");
            return Ok(());
        }
        self.alter(table, TableChange::DropDefault(field.to_string()))
    }

    pub fn set_not_null(&self, table: &str, field: &str) -> DbResult<()> {
        if self.require_column(table, field)?.not_null {
            log::debug!("Column {table}.{field} is already NOT NULL");
            return Ok(());
        }
        self.alter(table, TableChange::SetNotNull(field.to_string()))
    }

    pub fn drop_not_null(&self, table: &str, field: &str) -> DbResult<()> {
        if !self.require_column(table, field)?.not_null {
            log::debug!("Column {table}.{field} is already nullable");
            return Ok(());
        }
        self.alter(table, TableChange::DropNotNull(field.to_string()))
    }

    pub fn drop_field(&self, table: &str, field: &str) -> DbResult<()> {
        self.require_table(table)?;
        if self.db.column(table, field)?.is_none() {
            log::debug!("Column {table}.{field} does not exist, skipping drop");
            return Ok(());
        }
        self.db
            .execute(&self.db.dialect().drop_field_sql(table, field))
            .map(|_| ())
    }

    pub fn create_index(&self, table: &str, index: &IndexDef) -> DbResult<()> {
        if index.fields.is_empty() {
            return Err(DbError::InvalidDefinition(format!(
                "index '{}' has no fields",
                index.name
            )));
        }
        self.require_table(table)?;
        if self.db.index_exists(table, &index.name)? {
            log::debug!("Index {} already exists, skipping create", index.name);
            return Ok(());
        }
        self.db
            .execute(&self.db.dialect().create_index_sql(table, index))
            .map(|_| ())
    }

    pub fn drop_index(&self, table: &str, name: &str) -> DbResult<()> {
        if !self.db.index_exists(table, name)? {
            log::debug!("Index {name} does not exist, skipping drop");
            return Ok(());
        }
        self.db
            .execute(&self.db.dialect().drop_index_sql(table, name))
            .map(|_| ())
    }

    /// Rename index `old` to `index.name`; the full definition is needed by
    /// backends that recreate the index instead of renaming it.
    pub fn rename_index(&self, table: &str, old: &str, index: &IndexDef) -> DbResult<()> {
        let old_exists = self.db.index_exists(table, old)?;
        if !old_exists && self.db.index_exists(table, &index.name)? {
            log::debug!("Index {old} already renamed to {}, skipping", index.name);
            return Ok(());
        }
        match self.db.dialect().rename_index_sql(table, old, index) {
            Some(sql) => self.db.execute(&sql).map(|_| ()),
            None => {
                if old_exists {
                    self.db
                        .execute(&self.db.dialect().drop_index_sql(table, old))?;
                }
                self.create_index(table, index)
            }
        }
    }

    pub fn add_foreign_key(&self, table: &str, fk: &ForeignKeyDef) -> DbResult<()> {
        self.require_table(table)?;
        if self.db.foreign_keys(table)?.iter().any(|k| k.matches(fk)) {
            log::debug!("Foreign key {} already exists, skipping add", fk.name);
            return Ok(());
        }
        self.alter(table, TableChange::AddForeignKey(fk.clone()))
    }

    pub fn drop_foreign_key(&self, table: &str, fk: &ForeignKeyDef) -> DbResult<()> {
        self.require_table(table)?;
        if !self.db.foreign_keys(table)?.iter().any(|k| k.matches(fk)) {
            log::debug!("Foreign key {} does not exist, skipping drop", fk.name);
            return Ok(());
        }
        self.alter(table, TableChange::DropForeignKey(fk.clone()))
    }
}
