//! Durable per-lineage progress.

use crate::lineage::{Lineage, Watermarks};
use chrono::{SecondsFormat, Utc};
use op_db::{Database, DbError, DbResult, DefaultValue, Ddl, FieldDef, FieldType, TableDef};
use serde::Serialize;
use std::cell::Cell;

/// Persisted watermark per lineage.
///
/// Watermarks only move forward: `record_applied` ignores a version that is
/// not above the current one.
pub trait VersionStore {
    /// Current watermark; 0 when nothing was ever recorded
    fn applied_version(&self, lineage: Lineage) -> DbResult<i64>;

    /// Advance `lineage` to `version`, returns whether it moved
    fn record_applied(&self, lineage: Lineage, version: i64) -> DbResult<bool>;

    fn watermarks(&self) -> DbResult<Watermarks> {
        let mut marks = Watermarks::default();
        for lineage in Lineage::ALL {
            marks.set(lineage, self.applied_version(lineage)?);
        }
        Ok(marks)
    }

    /// Create whatever storage the store needs before the first write
    fn prepare(&self) -> DbResult<()> {
        Ok(())
    }
}

/// Table holding the single watermark row
pub const VERSION_TABLE: &str = "dbversion";

/// Append-only log of applied patches
pub const HISTORY_TABLE: &str = "dbversion_history";

/// One applied patch from the history table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub lineage: Lineage,
    pub version: i64,
    pub sub_version: i64,
    pub applied_at: String,
}

/// Version store kept in the upgraded database itself, so a watermark
/// commits in the same transaction as the patch that advanced it.
pub struct SqlVersionStore<'a> {
    db: &'a dyn Database,
}

impl<'a> SqlVersionStore<'a> {
    pub fn new(db: &'a dyn Database) -> Self {
        Self { db }
    }

    /// Create the version and history tables and the watermark row
    pub fn ensure(&self) -> DbResult<()> {
        let ddl = Ddl::new(self.db);
        let mut versions = TableDef::new(VERSION_TABLE);
        for lineage in Lineage::ALL {
            versions = versions.field(
                FieldDef::new(lineage.column(), FieldType::Id)
                    .default(DefaultValue::Int(0))
                    .not_null(),
            );
        }
        ddl.create_table(&versions)?;
        ddl.create_table(
            &TableDef::new(HISTORY_TABLE)
                .field(FieldDef::new("lineage", FieldType::Char(32)).not_null())
                .field(FieldDef::new("version", FieldType::Id).not_null())
                .field(
                    FieldDef::new("sub_version", FieldType::Int)
                        .default(DefaultValue::Int(0))
                        .not_null(),
                )
                .field(FieldDef::new("applied_at", FieldType::Char(40)).not_null()),
        )?;

        let rows = self
            .db
            .query_i64(&format!("SELECT COUNT(*) FROM {}", self.ident(VERSION_TABLE)))?
            .unwrap_or(0);
        if rows == 0 {
            log::debug!("Initialising {VERSION_TABLE} row");
            let columns: Vec<String> = Lineage::ALL.iter().map(|l| l.column().to_string()).collect();
            self.db.execute(&format!(
                "INSERT INTO {} ({}) VALUES (0, 0, 0, 0)",
                self.ident(VERSION_TABLE),
                self.db.dialect().ident_list(&columns)
            ))?;
        }
        Ok(())
    }

    /// Applied patches, oldest first
    pub fn history(&self) -> DbResult<Vec<HistoryEntry>> {
        if !self.db.table_exists(HISTORY_TABLE)? {
            return Ok(Vec::new());
        }
        let rows = self.db.query_rows(&format!(
            "SELECT lineage, version, sub_version, applied_at FROM {} \
             ORDER BY applied_at, version, sub_version",
            self.ident(HISTORY_TABLE)
        ))?;
        rows.into_iter().map(parse_history_row).collect()
    }

    fn ident(&self, name: &str) -> String {
        self.db.dialect().quote_ident(name)
    }

    fn append_history(&self, lineage: Lineage, key: i64) -> DbResult<()> {
        if !self.db.table_exists(HISTORY_TABLE)? {
            return Ok(());
        }
        let (version, sub_version) = lineage.split_key(key);
        let applied_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let dialect = self.db.dialect();
        self.db.execute(&format!(
            "INSERT INTO {} (lineage, version, sub_version, applied_at) VALUES ({}, {version}, {sub_version}, {})",
            self.ident(HISTORY_TABLE),
            dialect.quote_literal(lineage.column()),
            dialect.quote_literal(&applied_at)
        ))?;
        Ok(())
    }
}

fn parse_history_row(row: Vec<Option<String>>) -> DbResult<HistoryEntry> {
    let text = |idx: usize| row.get(idx).cloned().flatten().unwrap_or_default();
    let number = |idx: usize| -> DbResult<i64> {
        text(idx).parse().map_err(|_| {
            DbError::ExecutionError(format!(
                "{HISTORY_TABLE} holds a non-numeric value '{}'",
                text(idx)
            ))
        })
    };
    let lineage_name = text(0);
    let lineage = Lineage::from_column(&lineage_name).ok_or_else(|| {
        DbError::ExecutionError(format!("{HISTORY_TABLE} holds unknown lineage '{lineage_name}'"))
    })?;
    Ok(HistoryEntry {
        lineage,
        version: number(1)?,
        sub_version: number(2)?,
        applied_at: text(3),
    })
}

impl VersionStore for SqlVersionStore<'_> {
    fn applied_version(&self, lineage: Lineage) -> DbResult<i64> {
        if !self.db.table_exists(VERSION_TABLE)? {
            return Ok(0);
        }
        let version = self.db.query_i64(&format!(
            "SELECT MAX({}) FROM {}",
            self.ident(lineage.column()),
            self.ident(VERSION_TABLE)
        ))?;
        Ok(version.unwrap_or(0))
    }

    fn record_applied(&self, lineage: Lineage, version: i64) -> DbResult<bool> {
        let column = self.ident(lineage.column());
        let updated = self.db.execute(&format!(
            "UPDATE {} SET {column} = {version} WHERE {column} < {version}",
            self.ident(VERSION_TABLE)
        ))?;
        if updated == 0 {
            return Ok(false);
        }
        self.append_history(lineage, version)?;
        Ok(true)
    }

    fn prepare(&self) -> DbResult<()> {
        self.ensure()
    }
}

/// Version store held in memory, for hosts that keep progress elsewhere
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    marks: Cell<Watermarks>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from previously saved watermarks
    pub fn with_watermarks(marks: Watermarks) -> Self {
        Self {
            marks: Cell::new(marks),
        }
    }
}

impl VersionStore for MemoryVersionStore {
    fn applied_version(&self, lineage: Lineage) -> DbResult<i64> {
        Ok(self.marks.get().get(lineage))
    }

    fn record_applied(&self, lineage: Lineage, version: i64) -> DbResult<bool> {
        let mut marks = self.marks.get();
        if version <= marks.get(lineage) {
            return Ok(false);
        }
        marks.set(lineage, version);
        self.marks.set(marks);
        Ok(true)
    }

    fn watermarks(&self) -> DbResult<Watermarks> {
        Ok(self.marks.get())
    }
}

#[cfg(test)]
#[path = "version_store_test.rs"]
mod tests;
