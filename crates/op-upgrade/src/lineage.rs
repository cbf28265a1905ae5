//! The four independently tracked watermarks.

use serde::Serialize;
use std::fmt;

/// Vendor watermark keys are `version * VENDOR_SUBVERSION_SPAN + sub_version`.
pub const VENDOR_SUBVERSION_SPAN: i64 = 1000;

/// Highest vendor sub-version that fits in a watermark key.
pub const MAX_VENDOR_SUBVERSION: u32 = 999;

/// Progress lineage of a patch: mandatory or optional, base or vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lineage {
    MandatoryBase,
    OptionalBase,
    MandatoryVendor,
    OptionalVendor,
}

impl Lineage {
    pub const ALL: [Lineage; 4] = [
        Lineage::MandatoryBase,
        Lineage::OptionalBase,
        Lineage::MandatoryVendor,
        Lineage::OptionalVendor,
    ];

    pub fn of(mandatory: bool, vendor: bool) -> Self {
        match (mandatory, vendor) {
            (true, false) => Lineage::MandatoryBase,
            (false, false) => Lineage::OptionalBase,
            (true, true) => Lineage::MandatoryVendor,
            (false, true) => Lineage::OptionalVendor,
        }
    }

    pub fn is_mandatory(self) -> bool {
        matches!(self, Lineage::MandatoryBase | Lineage::MandatoryVendor)
    }

    pub fn is_vendor(self) -> bool {
        matches!(self, Lineage::MandatoryVendor | Lineage::OptionalVendor)
    }

    /// Column of the `dbversion` table holding this watermark
    pub fn column(self) -> &'static str {
        match self {
            Lineage::MandatoryBase => "mandatory",
            Lineage::OptionalBase => "optional",
            Lineage::MandatoryVendor => "mandatory_vendor",
            Lineage::OptionalVendor => "optional_vendor",
        }
    }

    /// Inverse of [`Lineage::column`]
    pub fn from_column(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.column() == name)
    }

    /// Split a watermark key back into `(version, sub_version)`
    pub fn split_key(self, key: i64) -> (i64, i64) {
        if self.is_vendor() {
            (key / VENDOR_SUBVERSION_SPAN, key % VENDOR_SUBVERSION_SPAN)
        } else {
            (key, 0)
        }
    }
}

impl fmt::Display for Lineage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Current value of every lineage watermark
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Watermarks {
    pub mandatory: i64,
    pub optional: i64,
    pub mandatory_vendor: i64,
    pub optional_vendor: i64,
}

impl Watermarks {
    pub fn get(&self, lineage: Lineage) -> i64 {
        match lineage {
            Lineage::MandatoryBase => self.mandatory,
            Lineage::OptionalBase => self.optional,
            Lineage::MandatoryVendor => self.mandatory_vendor,
            Lineage::OptionalVendor => self.optional_vendor,
        }
    }

    pub fn set(&mut self, lineage: Lineage, version: i64) {
        let slot = match lineage {
            Lineage::MandatoryBase => &mut self.mandatory,
            Lineage::OptionalBase => &mut self.optional,
            Lineage::MandatoryVendor => &mut self.mandatory_vendor,
            Lineage::OptionalVendor => &mut self.optional_vendor,
        };
        *slot = version;
    }
}
