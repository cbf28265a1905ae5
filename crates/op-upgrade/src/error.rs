//! Error types for the upgrade engine.

use crate::lineage::Lineage;
use op_db::DbError;
use thiserror::Error;

/// Errors raised by the id sequence allocator.
#[derive(Error, Debug)]
pub enum SequenceError {
    /// The allocator cannot guarantee an id above every existing one
    #[error("id sequence for '{table}' would collide: {reason}")]
    Collision { table: String, reason: String },

    /// A range of zero or negative size was requested
    #[error("invalid id range size {0}, must be positive")]
    InvalidCount(i64),

    /// Sequenced tables need a single-column primary key
    #[error("table '{0}' has no single-column primary key")]
    NoKeyField(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Failure reported by a patch action.
///
/// The first failing statement ends the patch; nothing after it runs.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    /// Patch-specific failure, e.g. unexpected data
    #[error("{0}")]
    Failed(String),
}

/// Upgrade engine errors.
#[derive(Error, Debug)]
pub enum UpgradeError {
    /// Release lines declare an ambiguous or invalid order (U001)
    #[error("[U001] Patch registry is inconsistent: {0}")]
    RegistryConsistency(String),

    /// Pending patches on a database whose schema may not be changed (U002)
    #[error("[U002] {backend} database has a fixed schema but {pending} patch(es) are pending")]
    BackendUnsupported { backend: String, pending: usize },

    /// A mandatory patch failed; its effects were rolled back (U003)
    #[error("[U003] Mandatory patch {patch} failed, upgrade aborted")]
    AbortedUpgrade {
        patch: String,
        #[source]
        source: PatchError,
    },

    /// A patch could not allocate safe ids (U004)
    #[error("[U004] Patch {patch} aborted on id sequence collision")]
    SequenceCollision {
        patch: String,
        #[source]
        source: SequenceError,
    },

    /// The database was upgraded by a newer release (U005)
    #[error("[U005] Database {lineage} version {found} is newer than the newest known patch {known}")]
    DatabaseNewer {
        lineage: Lineage,
        found: i64,
        known: i64,
    },

    /// Reading or writing the version watermarks failed (U006)
    #[error("[U006] Version store failed: {0}")]
    VersionStore(#[from] DbError),
}

/// Result type alias for [`UpgradeError`].
pub type UpgradeResult<T> = Result<T, UpgradeError>;

/// Result type alias for patch actions.
pub type PatchResult<T> = Result<T, PatchError>;
