//! Patch descriptors: one versioned schema change and its action.

use crate::context::PatchContext;
use crate::error::PatchResult;
use crate::lineage::{Lineage, VENDOR_SUBVERSION_SPAN};
use op_core::DbType;
use serde::Serialize;
use std::fmt;

/// Body of a patch
pub type PatchAction = Box<dyn Fn(&PatchContext<'_>) -> PatchResult<()>>;

/// Backends a descriptor applies to
#[derive(Debug, Clone, PartialEq, Eq)]
enum Backends {
    All,
    Only(Vec<DbType>),
    Except(Vec<DbType>),
}

/// A versioned schema change.
///
/// ```ignore
/// PatchDescriptor::new(6000001, |ctx| {
///     ctx.ddl().add_field("hosts", &FieldDef::new("flags", FieldType::Int))?;
///     Ok(())
/// })
/// .mandatory()
/// ```
pub struct PatchDescriptor {
    version: i64,
    sub_version: Option<u32>,
    mandatory: bool,
    duplicates: bool,
    backends: Backends,
    action: PatchAction,
}

impl PatchDescriptor {
    /// Optional base patch running `action`
    pub fn new<F>(version: i64, action: F) -> Self
    where
        F: Fn(&PatchContext<'_>) -> PatchResult<()> + 'static,
    {
        Self {
            version,
            sub_version: None,
            mandatory: false,
            duplicates: false,
            backends: Backends::All,
            action: Box::new(action),
        }
    }

    /// Failure aborts the upgrade
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Place the patch on the vendor sub-chain at `sub_version` of `version`
    pub fn vendor(mut self, sub_version: u32) -> Self {
        self.sub_version = Some(sub_version);
        self
    }

    /// Allow this patch to share its version with the one before it
    pub fn duplicates(mut self) -> Self {
        self.duplicates = true;
        self
    }

    /// Apply only on the given backends; elsewhere the patch is a recorded no-op
    pub fn only_on(mut self, backends: &[DbType]) -> Self {
        self.backends = Backends::Only(backends.to_vec());
        self
    }

    /// Apply everywhere except the given backends
    pub fn except_on(mut self, backends: &[DbType]) -> Self {
        self.backends = Backends::Except(backends.to_vec());
        self
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn sub_version(&self) -> Option<u32> {
        self.sub_version
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn is_duplicate(&self) -> bool {
        self.duplicates
    }

    pub fn is_vendor(&self) -> bool {
        self.sub_version.is_some()
    }

    pub fn lineage(&self) -> Lineage {
        Lineage::of(self.mandatory, self.is_vendor())
    }

    /// Position in the global order; base entries sort before vendor
    /// entries of the same version.
    pub fn order_key(&self) -> (i64, u32) {
        (self.version, self.sub_version.unwrap_or(0))
    }

    /// Value recorded in this patch's lineage once it is applied
    pub fn key(&self) -> i64 {
        match self.sub_version {
            Some(sub) => self
                .version
                .saturating_mul(VENDOR_SUBVERSION_SPAN)
                .saturating_add(i64::from(sub)),
            None => self.version,
        }
    }

    pub fn applies_to(&self, db_type: DbType) -> bool {
        match &self.backends {
            Backends::All => true,
            Backends::Only(list) => list.contains(&db_type),
            Backends::Except(list) => !list.contains(&db_type),
        }
    }

    pub(crate) fn run(&self, ctx: &PatchContext<'_>) -> PatchResult<()> {
        (self.action)(ctx)
    }
}

impl fmt::Debug for PatchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchDescriptor")
            .field("version", &self.version)
            .field("sub_version", &self.sub_version)
            .field("mandatory", &self.mandatory)
            .field("duplicates", &self.duplicates)
            .field("backends", &self.backends)
            .finish_non_exhaustive()
    }
}

/// Identity of a planned patch, used in logs and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PatchId {
    pub line: u32,
    pub version: i64,
    pub sub_version: Option<u32>,
    pub mandatory: bool,
}

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.version)?;
        if let Some(sub) = self.sub_version {
            write!(f, "-{sub}")?;
        }
        if self.mandatory {
            write!(f, " (mandatory)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "descriptor_test.rs"]
mod tests;
