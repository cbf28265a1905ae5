//! Migrate command implementation

use anyhow::{Context, Result};
use op_upgrade::{run_migrations, UpgradeOptions};

use crate::cli::{GlobalArgs, MigrateArgs};
use crate::commands::common::{load_config, open_database};

/// Execute the migrate command
pub(crate) fn execute(args: &MigrateArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let db = open_database(&config)?;

    let mut options = UpgradeOptions::from(&config.upgrade);
    if args.target.is_some() {
        options.target_version = args.target;
    }

    let report = run_migrations(
        db.as_ref(),
        config.role,
        &options,
        op_patches::release_lines(),
    )
    .context("Schema upgrade failed")?;

    if report.is_noop() {
        println!("Database schema is up to date");
    } else {
        println!(
            "Applied {} patch(es), {} not applicable to {}",
            report.applied.len(),
            report.skipped_inapplicable.len(),
            config.database.db_type
        );
    }
    for id in &report.failed_optional {
        println!("  Optional patch {id} failed");
    }
    for lineage in &report.halted_lineages {
        println!("  {lineage} patches halted, will retry on the next run");
    }
    println!(
        "Mandatory version: {}, optional version: {}",
        report.watermarks.mandatory, report.watermarks.optional
    );
    println!(
        "Vendor versions: {} mandatory, {} optional",
        report.watermarks.mandatory_vendor, report.watermarks.optional_vendor
    );
    Ok(())
}
