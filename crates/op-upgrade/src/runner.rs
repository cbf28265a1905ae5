//! Migration runner: applies pending patches in global order.
//!
//! The runner snapshots the watermarks once, then walks the registry:
//!
//! ```text
//! Idle -> Selecting -> Executing -> Recording -> Selecting ... -> Idle
//!                          |
//!                          +-> Aborted (mandatory failure, id collision)
//! ```

use crate::context::PatchContext;
use crate::descriptor::PatchId;
use crate::error::{PatchError, SequenceError, UpgradeError, UpgradeResult};
use crate::ids::IdSequenceAllocator;
use crate::lineage::{Lineage, Watermarks};
use crate::registry::{PatchRegistry, PlannedPatch};
use crate::version_store::VersionStore;
use op_core::{DeploymentRole, OptionalFailurePolicy, SchemaMode, UpgradeConfig};
use op_db::{with_transaction, Database, DbError};
use serde::Serialize;
use std::cell::Cell;

/// Runner state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Selecting,
    Executing,
    Recording,
    Aborted,
}

/// Per-run upgrade settings
#[derive(Debug, Clone, Default)]
pub struct UpgradeOptions {
    pub optional_failures: OptionalFailurePolicy,
    /// Skip patches whose version is above this
    pub target_version: Option<i64>,
}

impl From<&UpgradeConfig> for UpgradeOptions {
    fn from(config: &UpgradeConfig) -> Self {
        Self {
            optional_failures: config.optional_failures,
            target_version: config.target_version,
        }
    }
}

/// Outcome of a run that did not abort
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpgradeReport {
    /// Patches whose action ran and succeeded
    pub applied: Vec<PatchId>,
    /// Patches recorded without running because they do not apply to the backend
    pub skipped_inapplicable: Vec<PatchId>,
    /// Optional patches that failed and were rolled back
    pub failed_optional: Vec<PatchId>,
    /// Lineages stopped for the rest of the run after an optional failure
    pub halted_lineages: Vec<Lineage>,
    /// Watermarks after the run
    pub watermarks: Watermarks,
}

impl UpgradeReport {
    /// True if the run found nothing to do
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
            && self.skipped_inapplicable.is_empty()
            && self.failed_optional.is_empty()
    }
}

enum StepFailure {
    Patch(PatchError),
    Store(DbError),
}

impl From<DbError> for StepFailure {
    fn from(err: DbError) -> Self {
        StepFailure::Patch(PatchError::Db(err))
    }
}

/// Applies a [`PatchRegistry`] to one database
pub struct MigrationRunner<'a> {
    db: &'a dyn Database,
    store: &'a dyn VersionStore,
    role: DeploymentRole,
    options: UpgradeOptions,
    state: Cell<RunnerState>,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(
        db: &'a dyn Database,
        store: &'a dyn VersionStore,
        role: DeploymentRole,
        options: UpgradeOptions,
    ) -> Self {
        Self {
            db,
            store,
            role,
            options,
            state: Cell::new(RunnerState::Idle),
        }
    }

    pub fn state(&self) -> RunnerState {
        self.state.get()
    }

    /// Patches the next run would consider, in execution order
    pub fn pending<'r>(&self, registry: &'r PatchRegistry) -> UpgradeResult<Vec<&'r PlannedPatch>> {
        let marks = self.store.watermarks()?;
        Ok(registry
            .entries()
            .iter()
            .filter(|e| self.in_scope(e, &marks))
            .collect())
    }

    /// Apply every pending patch of `registry`
    pub fn run(&self, registry: &PatchRegistry) -> UpgradeResult<UpgradeReport> {
        self.state.set(RunnerState::Idle);
        let snapshot = self.store.watermarks()?;
        check_not_newer(registry, &snapshot)?;

        let pending = registry
            .entries()
            .iter()
            .filter(|e| self.in_scope(e, &snapshot))
            .count();

        if self.db.schema_mode() == SchemaMode::Fixed {
            if pending > 0 {
                return Err(UpgradeError::BackendUnsupported {
                    backend: self.db.db_type().to_string(),
                    pending,
                });
            }
            log::info!("Fixed schema is up to date");
            return Ok(UpgradeReport {
                watermarks: snapshot,
                ..Default::default()
            });
        }

        self.store.prepare()?;
        IdSequenceAllocator::new(self.db).ensure()?;

        if pending == 0 {
            log::info!("Database schema is up to date");
        } else {
            log::info!(
                "Applying {pending} pending patch(es) on {}",
                self.db.db_type()
            );
        }

        let mut report = UpgradeReport::default();
        let mut halted: Vec<Lineage> = Vec::new();
        for entry in registry.entries() {
            self.state.set(RunnerState::Selecting);
            if !self.in_scope(entry, &snapshot) {
                continue;
            }
            let lineage = entry.lineage();
            if halted.contains(&lineage) {
                log::warn!(
                    "Skipping patch {}: {lineage} patches are halted for this run",
                    entry.id()
                );
                continue;
            }

            match self.apply(entry) {
                Ok(()) if entry.applicable => report.applied.push(entry.id()),
                Ok(()) => report.skipped_inapplicable.push(entry.id()),
                Err(failure) => self.handle_failure(entry, failure, &mut report, &mut halted)?,
            }
        }

        report.halted_lineages = halted;
        report.watermarks = self.store.watermarks()?;
        self.state.set(RunnerState::Idle);
        log::info!(
            "Upgrade finished: {} applied, {} not applicable, {} optional failed",
            report.applied.len(),
            report.skipped_inapplicable.len(),
            report.failed_optional.len()
        );
        Ok(report)
    }

    fn in_scope(&self, entry: &PlannedPatch, marks: &Watermarks) -> bool {
        entry.key() > marks.get(entry.lineage())
            && self
                .options
                .target_version
                .map_or(true, |target| entry.descriptor.version() <= target)
    }

    /// Run one patch and record it, atomically where the backend allows
    fn apply(&self, entry: &PlannedPatch) -> Result<(), StepFailure> {
        let id = entry.id();
        self.state.set(RunnerState::Executing);
        self.transactional(|| {
            if entry.applicable {
                log::info!("Applying patch {id}");
                let ctx = PatchContext::new(self.db, self.role);
                entry.descriptor.run(&ctx).map_err(StepFailure::Patch)?;
            } else {
                log::debug!(
                    "Patch {id} does not apply to {}, recording it as done",
                    self.db.db_type()
                );
            }
            // Members of a duplicates group are recorded together with the last one
            if entry.group_end {
                self.state.set(RunnerState::Recording);
                self.store
                    .record_applied(entry.lineage(), entry.key())
                    .map_err(StepFailure::Store)?;
            }
            Ok(())
        })
    }

    fn handle_failure(
        &self,
        entry: &PlannedPatch,
        failure: StepFailure,
        report: &mut UpgradeReport,
        halted: &mut Vec<Lineage>,
    ) -> UpgradeResult<()> {
        let id = entry.id();
        let err = match failure {
            StepFailure::Store(err) => {
                self.state.set(RunnerState::Aborted);
                return Err(UpgradeError::VersionStore(err));
            }
            StepFailure::Patch(err) => err,
        };

        match err {
            PatchError::Sequence(source @ SequenceError::Collision { .. }) => {
                self.state.set(RunnerState::Aborted);
                log::error!("Patch {id} failed: {source}");
                Err(UpgradeError::SequenceCollision {
                    patch: id.to_string(),
                    source,
                })
            }
            source if entry.descriptor.is_mandatory() => {
                self.state.set(RunnerState::Aborted);
                log::error!("Mandatory patch {id} failed: {source}");
                Err(UpgradeError::AbortedUpgrade {
                    patch: id.to_string(),
                    source,
                })
            }
            source => {
                log::error!("Optional patch {id} failed: {source}");
                report.failed_optional.push(id);
                let lineage = entry.lineage();
                match self.options.optional_failures {
                    OptionalFailurePolicy::Retry => {
                        log::warn!(
                            "Halting {lineage} patches for this run, {id} will be retried next time"
                        );
                        halted.push(lineage);
                    }
                    OptionalFailurePolicy::Advance => {
                        self.state.set(RunnerState::Recording);
                        self.transactional(|| self.store.record_applied(lineage, entry.key()))?;
                        log::warn!("Recorded failed optional patch {id} as done");
                    }
                }
                Ok(())
            }
        }
    }

    fn transactional<T, E, F>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<DbError>,
    {
        if self.db.dialect().supports_transactional_ddl() {
            with_transaction(self.db, body)
        } else {
            body()
        }
    }
}

/// Refuse a database whose mandatory progress is past every known patch
fn check_not_newer(registry: &PatchRegistry, marks: &Watermarks) -> UpgradeResult<()> {
    for lineage in [Lineage::MandatoryBase, Lineage::MandatoryVendor] {
        let found = marks.get(lineage);
        if let Some(known) = registry.newest_key(lineage) {
            if found > known {
                return Err(UpgradeError::DatabaseNewer {
                    lineage,
                    found,
                    known,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
