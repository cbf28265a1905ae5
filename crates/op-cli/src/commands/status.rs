//! Status command implementation

use anyhow::{Context, Result};
use op_upgrade::{
    pending_patches, PatchId, SqlVersionStore, UpgradeOptions, VersionStore, Watermarks,
};
use serde::Serialize;

use crate::cli::{GlobalArgs, StatusArgs};
use crate::commands::common::{load_config, open_database};

#[derive(Serialize)]
struct StatusReport {
    backend: String,
    role: String,
    watermarks: Watermarks,
    newest_mandatory: i64,
    pending: Vec<PatchId>,
}

/// Execute the status command
pub(crate) fn execute(args: &StatusArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let db = open_database(&config)?;

    let watermarks = SqlVersionStore::new(db.as_ref())
        .watermarks()
        .context("Failed to read schema versions")?;
    let pending = pending_patches(
        db.as_ref(),
        &UpgradeOptions::from(&config.upgrade),
        op_patches::release_lines(),
    )
    .context("Failed to compute pending patches")?;

    let report = StatusReport {
        backend: config.database.db_type.to_string(),
        role: config.role.to_string(),
        watermarks,
        newest_mandatory: op_patches::newest_mandatory_version(),
        pending,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Backend: {} ({})", report.backend, report.role);
    println!(
        "Mandatory: {} of {}",
        report.watermarks.mandatory, report.newest_mandatory
    );
    println!("Optional: {}", report.watermarks.optional);
    println!(
        "Vendor: {} mandatory, {} optional",
        report.watermarks.mandatory_vendor, report.watermarks.optional_vendor
    );
    if report.pending.is_empty() {
        println!("No pending patches");
    } else {
        println!("Pending patches:");
        for id in &report.pending {
            println!("  {id}");
        }
    }
    Ok(())
}
