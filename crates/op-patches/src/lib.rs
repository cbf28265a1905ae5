//! op-patches - Schema patches bundled with Outpost
//!
//! Each module declares one release line. Versions are `line * 100000 + n`,
//! so every line starts after the previous one ends.

mod line60;
mod line70;

use op_upgrade::ReleaseLine;

/// Every bundled release line
pub fn release_lines() -> Vec<ReleaseLine> {
    vec![line60::release_line(), line70::release_line()]
}

/// Newest mandatory base version shipped with this build
pub fn newest_mandatory_version() -> i64 {
    release_lines()
        .iter()
        .flat_map(|line| line.patches())
        .filter(|p| p.is_mandatory() && !p.is_vendor())
        .map(|p| p.version())
        .max()
        .unwrap_or(0)
}
