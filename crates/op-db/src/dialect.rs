//! SQL dialects.
//!
//! A [`Dialect`] turns schema definitions into SQL text for one backend. The
//! shared ANSI-ish rendering lives in the trait's default methods; each
//! backend overrides only where its syntax or capabilities differ. A method
//! returning `None` means the dialect has no single statement for the
//! change, and the DDL layer falls back to an emulation (drop + create for
//! indexes, [`crate::Database::rebuild_table`] for table changes).

use crate::schema::{
    DefaultValue, FieldDef, FieldType, ForeignKeyDef, IndexDef, TableChange, TableDef,
};
use op_core::DbType;

/// SQL generation for one backend
pub trait Dialect {
    /// Backend this dialect renders for
    fn db_type(&self) -> DbType;

    /// Concrete SQL type for a logical field type
    fn column_type(&self, field_type: FieldType) -> String;

    /// Quote an identifier
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Quote a string literal
    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Whether DDL statements take part in transactions
    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    /// Whether `ALTER TABLE` is refused while the table has explicit indexes
    fn alter_blocked_by_indexes(&self) -> bool {
        false
    }

    fn default_literal(&self, value: &DefaultValue) -> String {
        match value {
            DefaultValue::Int(n) => n.to_string(),
            DefaultValue::Float(f) => format!("{f:?}"),
            DefaultValue::Str(s) => self.quote_literal(s),
        }
    }

    /// Quoted, comma-separated identifier list
    fn ident_list(&self, idents: &[String]) -> String {
        idents
            .iter()
            .map(|i| self.quote_ident(i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Column definition as used inside `CREATE TABLE`
    fn field_sql(&self, field: &FieldDef) -> String {
        let mut sql = format!(
            "{} {}",
            self.quote_ident(&field.name),
            self.column_type(field.field_type)
        );
        if let Some(default) = &field.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.default_literal(default));
        }
        if field.not_null {
            sql.push_str(" NOT NULL");
        }
        sql
    }

    /// Foreign key clause as used inside `CREATE TABLE`
    fn foreign_key_clause(&self, fk: &ForeignKeyDef) -> String {
        let mut sql = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.quote_ident(&fk.name),
            self.ident_list(&fk.fields),
            self.quote_ident(&fk.ref_table),
            self.ident_list(&fk.ref_fields)
        );
        if let Some(action) = fk.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action.as_sql());
        }
        sql
    }

    fn create_table_sql(&self, table: &TableDef) -> String {
        let mut parts: Vec<String> = table.fields.iter().map(|f| self.field_sql(f)).collect();
        if !table.primary_key.is_empty() {
            parts.push(format!(
                "PRIMARY KEY ({})",
                self.ident_list(&table.primary_key)
            ));
        }
        parts.extend(table.foreign_keys.iter().map(|fk| self.foreign_key_clause(fk)));
        format!(
            "CREATE TABLE {} ({})",
            self.quote_ident(&table.name),
            parts.join(", ")
        )
    }

    fn rename_table_sql(&self, old: &str, new: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_ident(old),
            self.quote_ident(new)
        )
    }

    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.quote_ident(table))
    }

    /// Statements adding a column to an existing table
    fn add_field_sql(&self, table: &str, field: &FieldDef) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_ident(table),
            self.field_sql(field)
        )]
    }

    fn rename_field_sql(&self, table: &str, old: &str, new: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote_ident(table),
            self.quote_ident(old),
            self.quote_ident(new)
        )
    }

    fn drop_field_sql(&self, table: &str, field: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_ident(table),
            self.quote_ident(field)
        )
    }

    /// Single statement applying `change`, if the dialect has one
    fn alter_table_sql(&self, table: &str, change: &TableChange) -> Option<String>;

    fn create_index_sql(&self, table: &str, index: &IndexDef) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote_ident(&index.name),
            self.quote_ident(table),
            self.ident_list(&index.fields)
        )
    }

    fn drop_index_sql(&self, _table: &str, name: &str) -> String {
        format!("DROP INDEX {}", self.quote_ident(name))
    }

    /// Single statement renaming an index, if the dialect has one
    fn rename_index_sql(&self, _table: &str, _old: &str, _index: &IndexDef) -> Option<String> {
        None
    }
}

/// DuckDB dialect
pub struct DuckDbDialect;

impl Dialect for DuckDbDialect {
    fn db_type(&self) -> DbType {
        DbType::DuckDb
    }

    // Indexes are catalog dependents of their table.
    fn alter_blocked_by_indexes(&self) -> bool {
        true
    }

    fn column_type(&self, field_type: FieldType) -> String {
        match field_type {
            FieldType::Id => "BIGINT".to_string(),
            FieldType::Int => "INTEGER".to_string(),
            FieldType::UInt => "UBIGINT".to_string(),
            FieldType::Float => "DOUBLE".to_string(),
            FieldType::Char(len) => format!("VARCHAR({len})"),
            FieldType::Text => "VARCHAR".to_string(),
            FieldType::Blob => "BLOB".to_string(),
        }
    }

    // DuckDB ignores constraint names and rejects referential actions.
    fn foreign_key_clause(&self, fk: &ForeignKeyDef) -> String {
        format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            self.ident_list(&fk.fields),
            self.quote_ident(&fk.ref_table),
            self.ident_list(&fk.ref_fields)
        )
    }

    // ADD COLUMN cannot carry constraints in DuckDB; NOT NULL is applied afterwards.
    fn add_field_sql(&self, table: &str, field: &FieldDef) -> Vec<String> {
        let plain = FieldDef {
            not_null: false,
            ..field.clone()
        };
        let mut stmts = vec![format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_ident(table),
            self.field_sql(&plain)
        )];
        if field.not_null {
            stmts.extend(self.alter_table_sql(table, &TableChange::SetNotNull(field.name.clone())));
        }
        stmts
    }

    fn alter_table_sql(&self, table: &str, change: &TableChange) -> Option<String> {
        let table = self.quote_ident(table);
        let sql = match change {
            TableChange::ModifyType(field) => format!(
                "ALTER TABLE {table} ALTER COLUMN {} SET DATA TYPE {}",
                self.quote_ident(&field.name),
                self.column_type(field.field_type)
            ),
            TableChange::SetDefault(field) => match &field.default {
                Some(default) => format!(
                    "ALTER TABLE {table} ALTER COLUMN {} SET DEFAULT {}",
                    self.quote_ident(&field.name),
                    self.default_literal(default)
                ),
                None => format!(
                    "ALTER TABLE {table} ALTER COLUMN {} DROP DEFAULT",
                    self.quote_ident(&field.name)
                ),
            },
            TableChange::DropDefault(field) => format!(
                "ALTER TABLE {table} ALTER COLUMN {} DROP DEFAULT",
                self.quote_ident(field)
            ),
            TableChange::SetNotNull(field) => format!(
                "ALTER TABLE {table} ALTER COLUMN {} SET NOT NULL",
                self.quote_ident(field)
            ),
            TableChange::DropNotNull(field) => format!(
                "ALTER TABLE {table} ALTER COLUMN {} DROP NOT NULL",
                self.quote_ident(field)
            ),
            TableChange::AddForeignKey(_) | TableChange::DropForeignKey(_) => return None,
        };
        Some(sql)
    }
}

/// SQLite dialect
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn db_type(&self) -> DbType {
        DbType::Sqlite
    }

    fn column_type(&self, field_type: FieldType) -> String {
        match field_type {
            FieldType::Id | FieldType::UInt => "BIGINT".to_string(),
            FieldType::Int => "INTEGER".to_string(),
            FieldType::Float => "DOUBLE PRECISION".to_string(),
            FieldType::Char(len) => format!("VARCHAR({len})"),
            FieldType::Text => "TEXT".to_string(),
            FieldType::Blob => "BLOB".to_string(),
        }
    }

    // SQLite's ALTER TABLE cannot change column definitions or constraints.
    fn alter_table_sql(&self, _table: &str, _change: &TableChange) -> Option<String> {
        None
    }
}

#[cfg(test)]
#[path = "dialect_test.rs"]
mod tests;
