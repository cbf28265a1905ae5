//! Execution context handed to every patch action.

use crate::error::PatchResult;
use crate::ids::IdSequenceAllocator;
use op_core::{DbType, DeploymentRole};
use op_db::{Database, Ddl};

/// What a patch body may use: the connection, DDL primitives, the id
/// allocator and the deployment role.
pub struct PatchContext<'a> {
    db: &'a dyn Database,
    role: DeploymentRole,
    ids: IdSequenceAllocator<'a>,
}

impl<'a> PatchContext<'a> {
    pub fn new(db: &'a dyn Database, role: DeploymentRole) -> Self {
        Self {
            db,
            role,
            ids: IdSequenceAllocator::new(db),
        }
    }

    pub fn db(&self) -> &'a dyn Database {
        self.db
    }

    pub fn ddl(&self) -> Ddl<'a> {
        Ddl::new(self.db)
    }

    pub fn db_type(&self) -> DbType {
        self.db.db_type()
    }

    pub fn role(&self) -> DeploymentRole {
        self.role
    }

    pub fn ids(&self) -> &IdSequenceAllocator<'a> {
        &self.ids
    }

    /// Run one statement
    pub fn execute(&self, sql: &str) -> PatchResult<usize> {
        Ok(self.db.execute(sql)?)
    }

    pub fn next_id(&self, table: &str) -> PatchResult<i64> {
        Ok(self.ids.next_id(table)?)
    }

    pub fn reserve_range(&self, table: &str, count: i64) -> PatchResult<i64> {
        Ok(self.ids.reserve_range(table, count)?)
    }

    pub fn resync_after_manual_insert(&self, table: &str) -> PatchResult<()> {
        Ok(self.ids.resync_after_manual_insert(table)?)
    }
}
