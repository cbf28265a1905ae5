//! Release lines and the validated global patch order.

use crate::descriptor::{PatchDescriptor, PatchId};
use crate::error::{UpgradeError, UpgradeResult};
use crate::lineage::{Lineage, MAX_VENDOR_SUBVERSION, VENDOR_SUBVERSION_SPAN};
use op_core::DbType;

/// Patches of one release line, in declaration order
#[derive(Debug)]
pub struct ReleaseLine {
    line: u32,
    patches: Vec<PatchDescriptor>,
}

impl ReleaseLine {
    pub fn new(line: u32) -> Self {
        Self {
            line,
            patches: Vec::new(),
        }
    }

    pub fn patch(mut self, descriptor: PatchDescriptor) -> Self {
        self.patches.push(descriptor);
        self
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn patches(&self) -> &[PatchDescriptor] {
        &self.patches
    }
}

/// A descriptor placed in the global order
#[derive(Debug)]
pub struct PlannedPatch {
    pub line: u32,
    pub descriptor: PatchDescriptor,
    /// Whether the action runs on this registry's backend
    pub applicable: bool,
    /// Last member of its lineage within a duplicates group
    pub(crate) group_end: bool,
}

impl PlannedPatch {
    pub fn id(&self) -> PatchId {
        PatchId {
            line: self.line,
            version: self.descriptor.version(),
            sub_version: self.descriptor.sub_version(),
            mandatory: self.descriptor.is_mandatory(),
        }
    }

    pub fn lineage(&self) -> Lineage {
        self.descriptor.lineage()
    }

    pub fn key(&self) -> i64 {
        self.descriptor.key()
    }
}

/// All release lines flattened into one validated execution order
#[derive(Debug)]
pub struct PatchRegistry {
    db_type: DbType,
    entries: Vec<PlannedPatch>,
}

impl PatchRegistry {
    /// Order and validate `lines` for a `db_type` backend.
    ///
    /// Lines run in ascending line number, each sorted by
    /// `(version, sub_version)`. Nothing is executed here, so an
    /// inconsistent registry fails before any patch runs.
    pub fn build(mut lines: Vec<ReleaseLine>, db_type: DbType) -> UpgradeResult<Self> {
        lines.sort_by_key(|l| l.line);
        for pair in lines.windows(2) {
            if pair[0].line == pair[1].line {
                return Err(inconsistent(format!(
                    "release line {} is declared twice",
                    pair[0].line
                )));
            }
        }

        let mut entries: Vec<PlannedPatch> = Vec::new();
        for mut line in lines {
            for d in &line.patches {
                validate_descriptor(line.line, d)?;
            }
            line.patches.sort_by_key(PatchDescriptor::order_key);
            for descriptor in line.patches {
                if let Some(prev) = entries.last() {
                    check_follows(prev, line.line, &descriptor)?;
                }
                let applicable = descriptor.applies_to(db_type);
                entries.push(PlannedPatch {
                    line: line.line,
                    descriptor,
                    applicable,
                    group_end: true,
                });
            }
        }

        // A duplicates group may mix lineages; each lineage is recorded by
        // its last member in the group.
        let mut start = 0;
        while start < entries.len() {
            let order_key = entries[start].descriptor.order_key();
            let end = entries[start..]
                .iter()
                .position(|e| e.descriptor.order_key() != order_key)
                .map_or(entries.len(), |n| start + n);
            for i in start..end {
                let lineage = entries[i].lineage();
                let last = !entries[i + 1..end].iter().any(|e| e.lineage() == lineage);
                entries[i].group_end = last;
            }
            start = end;
        }

        log::debug!(
            "Built patch registry with {} entries for {db_type}",
            entries.len()
        );
        Ok(Self { db_type, entries })
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }

    /// Entries in global execution order
    pub fn entries(&self) -> &[PlannedPatch] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest key declared for `lineage`, or `None` if it has no patches
    pub fn newest_key(&self, lineage: Lineage) -> Option<i64> {
        self.entries
            .iter()
            .filter(|e| e.lineage() == lineage)
            .map(PlannedPatch::key)
            .max()
    }
}

fn inconsistent(message: String) -> UpgradeError {
    UpgradeError::RegistryConsistency(message)
}

fn validate_descriptor(line: u32, d: &PatchDescriptor) -> UpgradeResult<()> {
    if d.version() <= 0 {
        return Err(inconsistent(format!(
            "line {line}: patch version {} must be positive",
            d.version()
        )));
    }
    if let Some(sub) = d.sub_version() {
        if sub == 0 || sub > MAX_VENDOR_SUBVERSION {
            return Err(inconsistent(format!(
                "line {line}: vendor sub-version {sub} of patch {} is outside 1..={MAX_VENDOR_SUBVERSION}",
                d.version()
            )));
        }
        if d.version().checked_mul(VENDOR_SUBVERSION_SPAN).is_none() {
            return Err(inconsistent(format!(
                "line {line}: vendor patch version {} is too large",
                d.version()
            )));
        }
    }
    Ok(())
}

/// Check that `next` may follow `prev` in the global order
fn check_follows(prev: &PlannedPatch, line: u32, next: &PatchDescriptor) -> UpgradeResult<()> {
    let prev_key = prev.descriptor.order_key();
    let next_key = next.order_key();
    if next_key > prev_key || (next_key == prev_key && next.is_duplicate()) {
        return Ok(());
    }
    let next_name = match next.sub_version() {
        Some(sub) => format!("{}-{sub}", next.version()),
        None => next.version().to_string(),
    };
    if next_key == prev_key {
        Err(inconsistent(format!(
            "patch {next_name} (line {line}) repeats the version of patch {} (line {}) \
             without being marked as a duplicate",
            prev.id(),
            prev.line
        )))
    } else {
        Err(inconsistent(format!(
            "release line {line} starts at patch {next_name}, which is not after patch {} of line {}",
            prev.id(),
            prev.line
        )))
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
