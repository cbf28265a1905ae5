//! op-upgrade - Schema upgrade engine for Outpost
//!
//! Patches are declared per release line, validated into one global order
//! by [`PatchRegistry`] and applied by [`MigrationRunner`]. Progress is kept
//! as four independent watermarks (mandatory/optional x base/vendor) in a
//! [`VersionStore`]; patch bodies allocate primary keys through
//! [`IdSequenceAllocator`].

pub mod context;
pub mod descriptor;
pub mod error;
pub mod ids;
pub mod lineage;
pub mod registry;
pub mod runner;
pub mod version_store;

pub use context::PatchContext;
pub use descriptor::{PatchAction, PatchDescriptor, PatchId};
pub use error::{PatchError, PatchResult, SequenceError, UpgradeError, UpgradeResult};
pub use ids::IdSequenceAllocator;
pub use lineage::{Lineage, Watermarks};
pub use registry::{PatchRegistry, PlannedPatch, ReleaseLine};
pub use runner::{MigrationRunner, RunnerState, UpgradeOptions, UpgradeReport};
pub use version_store::{HistoryEntry, MemoryVersionStore, SqlVersionStore, VersionStore};

use op_core::DeploymentRole;
use op_db::Database;

/// Bring `db` up to date with `lines`.
///
/// Progress is stored in the `dbversion` table of `db` itself. Fails before
/// running anything if the lines are inconsistent, the database is newer
/// than the lines, or the schema is fixed while patches are pending.
pub fn run_migrations(
    db: &dyn Database,
    role: DeploymentRole,
    options: &UpgradeOptions,
    lines: Vec<ReleaseLine>,
) -> UpgradeResult<UpgradeReport> {
    let registry = PatchRegistry::build(lines, db.db_type())?;
    let store = SqlVersionStore::new(db);
    MigrationRunner::new(db, &store, role, options.clone()).run(&registry)
}

/// Patches `run_migrations` would apply to `db`, in execution order
pub fn pending_patches(
    db: &dyn Database,
    options: &UpgradeOptions,
    lines: Vec<ReleaseLine>,
) -> UpgradeResult<Vec<PatchId>> {
    let registry = PatchRegistry::build(lines, db.db_type())?;
    let store = SqlVersionStore::new(db);
    let runner = MigrationRunner::new(db, &store, DeploymentRole::default(), options.clone());
    Ok(runner.pending(&registry)?.iter().map(|p| p.id()).collect())
}
