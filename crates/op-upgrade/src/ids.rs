//! Primary key allocation for rows inserted by patches.
//!
//! Counters live in the `ids` table as the next free id per
//! `(table_name, field_name)`. Every allocation also looks at the current
//! maximum id of the table, so rows inserted with literal ids can never be
//! handed out again.

use crate::error::SequenceError;
use op_db::{Database, DbError, DbResult, Ddl, FieldDef, FieldType, TableDef};

/// Counter table name
pub const IDS_TABLE: &str = "ids";

/// Hands out primary keys above every id already present
pub struct IdSequenceAllocator<'a> {
    db: &'a dyn Database,
}

impl<'a> IdSequenceAllocator<'a> {
    pub fn new(db: &'a dyn Database) -> Self {
        Self { db }
    }

    /// Create the counter table if missing
    pub fn ensure(&self) -> DbResult<()> {
        Ddl::new(self.db).create_table(
            &TableDef::new(IDS_TABLE)
                .field(FieldDef::new("table_name", FieldType::Char(64)).not_null())
                .field(FieldDef::new("field_name", FieldType::Char(64)).not_null())
                .field(FieldDef::new("nextid", FieldType::Id).not_null())
                .primary_key(&["table_name", "field_name"]),
        )
    }

    /// Next free id of `table`
    pub fn next_id(&self, table: &str) -> Result<i64, SequenceError> {
        self.reserve_range(table, 1)
    }

    /// Reserve `count` consecutive ids of `table`, returns the first
    pub fn reserve_range(&self, table: &str, count: i64) -> Result<i64, SequenceError> {
        if count <= 0 {
            return Err(SequenceError::InvalidCount(count));
        }
        let seq = self.sequence(table)?;
        let start = seq.floor()?;
        if start <= seq.max_id {
            return Err(seq.collision(format!(
                "start {start} is not above the current max id {}",
                seq.max_id
            )));
        }
        let next = start
            .checked_add(count)
            .ok_or_else(|| seq.collision(format!("reserving {count} ids from {start} overflows")))?;
        self.store(&seq, next)?;
        log::debug!("Reserved {count} id(s) of {table} starting at {start}");
        Ok(start)
    }

    /// Move the counter past ids inserted without the allocator.
    ///
    /// The counter never moves backwards.
    pub fn resync_after_manual_insert(&self, table: &str) -> Result<(), SequenceError> {
        let seq = self.sequence(table)?;
        let next = seq.floor()?;
        if seq.stored != Some(next) {
            self.store(&seq, next)?;
            log::debug!("Resynced {table} id counter to {next}");
        }
        Ok(())
    }

    /// Read the state of `table`'s sequence
    fn sequence(&self, table: &str) -> Result<Sequence, SequenceError> {
        if !self.db.table_exists(table)? {
            return Err(DbError::TableNotFound(table.to_string()).into());
        }
        let field = match self.db.primary_key(table)?.as_slice() {
            [field] => field.clone(),
            _ => return Err(SequenceError::NoKeyField(table.to_string())),
        };
        let dialect = self.db.dialect();
        let max_id = self
            .db
            .query_i64(&format!(
                "SELECT MAX({}) FROM {}",
                dialect.quote_ident(&field),
                dialect.quote_ident(table)
            ))?
            .unwrap_or(0);

        self.ensure()?;
        let stored = self.db.query_i64(&format!(
            "SELECT nextid FROM {} WHERE table_name = {} AND field_name = {}",
            dialect.quote_ident(IDS_TABLE),
            dialect.quote_literal(table),
            dialect.quote_literal(&field)
        ))?;

        Ok(Sequence {
            table: table.to_string(),
            field,
            max_id,
            stored,
        })
    }

    fn store(&self, seq: &Sequence, next: i64) -> Result<(), SequenceError> {
        let dialect = self.db.dialect();
        let ids = dialect.quote_ident(IDS_TABLE);
        let table = dialect.quote_literal(&seq.table);
        let field = dialect.quote_literal(&seq.field);
        let sql = if seq.stored.is_some() {
            format!(
                "UPDATE {ids} SET nextid = {next} WHERE table_name = {table} AND field_name = {field}"
            )
        } else {
            format!("INSERT INTO {ids} (table_name, field_name, nextid) VALUES ({table}, {field}, {next})")
        };
        self.db.execute(&sql)?;
        Ok(())
    }
}

struct Sequence {
    table: String,
    field: String,
    max_id: i64,
    stored: Option<i64>,
}

impl Sequence {
    /// Lowest id that is safe to hand out
    fn floor(&self) -> Result<i64, SequenceError> {
        if let Some(stored) = self.stored {
            if stored <= 0 {
                return Err(self.collision(format!("stored counter {stored} is not positive")));
            }
        }
        let above_max = self
            .max_id
            .checked_add(1)
            .ok_or_else(|| self.collision(format!("max id {} overflows", self.max_id)))?;
        Ok(self.stored.map_or(above_max, |stored| stored.max(above_max)))
    }

    fn collision(&self, reason: String) -> SequenceError {
        SequenceError::Collision {
            table: self.table.clone(),
            reason,
        }
    }
}

#[cfg(test)]
#[path = "ids_test.rs"]
mod tests;
