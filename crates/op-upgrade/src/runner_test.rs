use super::*;
use crate::descriptor::PatchDescriptor;
use crate::registry::ReleaseLine;
use crate::version_store::{MemoryVersionStore, SqlVersionStore};
use op_core::DbType;
use op_db::{DatabaseCatalog, DuckDbBackend, FieldDef, FieldType, SqliteBackend, TableDef};
use std::cell::RefCell;
use std::rc::Rc;

type Calls = Rc<RefCell<Vec<String>>>;

fn calls() -> Calls {
    Rc::new(RefCell::new(Vec::new()))
}

fn recorded(calls: &Calls) -> Vec<String> {
    calls.borrow().clone()
}

fn ok(calls: &Calls, label: &str, version: i64) -> PatchDescriptor {
    let (calls, label) = (Rc::clone(calls), label.to_string());
    PatchDescriptor::new(version, move |_| {
        calls.borrow_mut().push(label.clone());
        Ok(())
    })
}

fn failing(calls: &Calls, label: &str, version: i64) -> PatchDescriptor {
    let (calls, label) = (Rc::clone(calls), label.to_string());
    PatchDescriptor::new(version, move |_| {
        calls.borrow_mut().push(label.clone());
        Err(PatchError::Failed(format!("{label} failed")))
    })
}

fn registry(line: ReleaseLine) -> PatchRegistry {
    PatchRegistry::build(vec![line], DbType::DuckDb).unwrap()
}

fn run_with(
    db: &dyn Database,
    store: &dyn VersionStore,
    options: UpgradeOptions,
    registry: &PatchRegistry,
) -> UpgradeResult<UpgradeReport> {
    MigrationRunner::new(db, store, DeploymentRole::Server, options).run(registry)
}

// ── Ordering and skipping ──────────────────────────────────────────────

#[test]
fn test_optional_failure_does_not_abort() {
    let db = DuckDbBackend::in_memory().unwrap();
    let store = MemoryVersionStore::new();
    let calls = calls();
    let registry = registry(
        ReleaseLine::new(1)
            .patch(ok(&calls, "v1", 1).mandatory())
            .patch(failing(&calls, "v2", 2))
            .patch(ok(&calls, "v3", 3).mandatory()),
    );

    let report = run_with(&db, &store, UpgradeOptions::default(), &registry).unwrap();

    assert_eq!(recorded(&calls), vec!["v1", "v2", "v3"]);
    assert_eq!(report.applied.len(), 2);
    assert_eq!(report.failed_optional.len(), 1);
    assert_eq!(report.failed_optional[0].version, 2);
    assert_eq!(report.watermarks.mandatory, 3);
    assert_eq!(report.watermarks.optional, 0);
    assert_eq!(report.halted_lineages, vec![Lineage::OptionalBase]);
}

#[test]
fn test_covered_patches_never_run() {
    let db = DuckDbBackend::in_memory().unwrap();
    let store = MemoryVersionStore::with_watermarks(Watermarks {
        mandatory: 5,
        optional: 4,
        ..Default::default()
    });
    let calls = calls();
    let registry = registry(
        ReleaseLine::new(1)
            .patch(ok(&calls, "m3", 3).mandatory())
            .patch(ok(&calls, "o4", 4))
            .patch(ok(&calls, "m5", 5).mandatory())
            .patch(ok(&calls, "m6", 6).mandatory())
            .patch(ok(&calls, "o7", 7)),
    );

    run_with(&db, &store, UpgradeOptions::default(), &registry).unwrap();
    assert_eq!(recorded(&calls), vec!["m6", "o7"]);
}

#[test]
fn test_second_run_does_nothing() {
    let db = SqliteBackend::in_memory().unwrap();
    let store = SqlVersionStore::new(&db);
    let calls = calls();
    let registry = registry(
        ReleaseLine::new(1)
            .patch(ok(&calls, "m1", 1).mandatory())
            .patch(ok(&calls, "o2", 2))
            .patch(ok(&calls, "v2", 2).vendor(1)),
    );

    let first = run_with(&db, &store, UpgradeOptions::default(), &registry).unwrap();
    assert_eq!(first.applied.len(), 3);

    let second = run_with(&db, &store, UpgradeOptions::default(), &registry).unwrap();
    assert!(second.is_noop());
    assert_eq!(recorded(&calls).len(), 3);
    assert_eq!(second.watermarks, first.watermarks);
}

#[test]
fn test_target_version_stops_every_lineage() {
    let db = DuckDbBackend::in_memory().unwrap();
    let store = MemoryVersionStore::new();
    let calls = calls();
    let registry = registry(
        ReleaseLine::new(1)
            .patch(ok(&calls, "m1", 1).mandatory())
            .patch(ok(&calls, "o2", 2))
            .patch(ok(&calls, "v2", 2).vendor(3))
            .patch(ok(&calls, "m3", 3).mandatory())
            .patch(ok(&calls, "o4", 4)),
    );
    let options = UpgradeOptions {
        target_version: Some(2),
        ..Default::default()
    };

    let report = run_with(&db, &store, options, &registry).unwrap();
    assert_eq!(recorded(&calls), vec!["m1", "o2", "v2"]);
    assert_eq!(
        report.watermarks,
        Watermarks {
            mandatory: 1,
            optional: 2,
            mandatory_vendor: 0,
            optional_vendor: 2003,
        }
    );

    let report = run_with(&db, &store, UpgradeOptions::default(), &registry).unwrap();
    assert_eq!(report.applied.len(), 2);
    assert_eq!(report.watermarks.mandatory, 3);
    assert_eq!(report.watermarks.optional, 4);
}

#[test]
fn test_vendor_chain_runs_after_base_of_same_version() {
    let db = DuckDbBackend::in_memory().unwrap();
    let store = MemoryVersionStore::new();
    let calls = calls();
    let registry = registry(
        ReleaseLine::new(1)
            .patch(ok(&calls, "5-2", 5).vendor(2).mandatory())
            .patch(ok(&calls, "6", 6).mandatory())
            .patch(ok(&calls, "5-1", 5).vendor(1))
            .patch(ok(&calls, "5", 5).mandatory()),
    );

    let report = run_with(&db, &store, UpgradeOptions::default(), &registry).unwrap();
    assert_eq!(recorded(&calls), vec!["5", "5-1", "5-2", "6"]);
    assert_eq!(report.watermarks.mandatory, 6);
    assert_eq!(report.watermarks.optional_vendor, 5001);
    assert_eq!(report.watermarks.mandatory_vendor, 5002);
}

#[test]
fn test_pending_lists_outstanding_patches() {
    let db = DuckDbBackend::in_memory().unwrap();
    let store = MemoryVersionStore::with_watermarks(Watermarks {
        mandatory: 1,
        ..Default::default()
    });
    let calls = calls();
    let registry = registry(
        ReleaseLine::new(1)
            .patch(ok(&calls, "m1", 1).mandatory())
            .patch(ok(&calls, "m2", 2).mandatory())
            .patch(ok(&calls, "o3", 3)),
    );
    let runner = MigrationRunner::new(&db, &store, DeploymentRole::Server, Default::default());

    let pending: Vec<i64> = runner
        .pending(&registry)
        .unwrap()
        .iter()
        .map(|p| p.descriptor.version())
        .collect();
    assert_eq!(pending, vec![2, 3]);
    assert!(recorded(&calls).is_empty());
    assert_eq!(runner.state(), RunnerState::Idle);
}

// ── Failures ───────────────────────────────────────────────────────────

#[test]
fn test_mandatory_failure_aborts_and_rolls_back() {
    let db = DuckDbBackend::in_memory().unwrap();
    let store = SqlVersionStore::new(&db);
    let calls = calls();
    let registry = registry(
        ReleaseLine::new(1)
            .patch(ok(&calls, "m1", 1).mandatory())
            .patch(
                PatchDescriptor::new(2, |ctx| {
                    ctx.ddl().create_table(
                        &TableDef::new("half_done").field(FieldDef::new("id", FieldType::Id)),
                    )?;
                    Err(PatchError::Failed("second statement failed".into()))
                })
                .mandatory(),
            )
            .patch(ok(&calls, "m3", 3).mandatory()),
    );
    let runner = MigrationRunner::new(&db, &store, DeploymentRole::Server, Default::default());

    let err = runner.run(&registry).unwrap_err();
    match err {
        UpgradeError::AbortedUpgrade { patch, source } => {
            assert_eq!(patch, "2 (mandatory)");
            assert!(matches!(source, PatchError::Failed(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(runner.state(), RunnerState::Aborted);
    assert_eq!(recorded(&calls), vec!["m1"]);
    assert_eq!(store.applied_version(Lineage::MandatoryBase).unwrap(), 1);
    assert!(!db.table_exists("half_done").unwrap());
}

#[test]
fn test_advance_policy_records_failed_optional() {
    let db = DuckDbBackend::in_memory().unwrap();
    let store = MemoryVersionStore::new();
    let calls = calls();
    let registry = registry(
        ReleaseLine::new(1)
            .patch(failing(&calls, "o2", 2))
            .patch(ok(&calls, "o4", 4)),
    );
    let options = UpgradeOptions {
        optional_failures: OptionalFailurePolicy::Advance,
        ..Default::default()
    };

    let report = run_with(&db, &store, options.clone(), &registry).unwrap();
    assert_eq!(recorded(&calls), vec!["o2", "o4"]);
    assert!(report.halted_lineages.is_empty());
    assert_eq!(report.watermarks.optional, 4);

    // Never retried
    run_with(&db, &store, options, &registry).unwrap();
    assert_eq!(recorded(&calls).len(), 2);
}

#[test]
fn test_retry_policy_halts_lineage_until_next_run() {
    let db = DuckDbBackend::in_memory().unwrap();
    let store = MemoryVersionStore::new();
    let calls = calls();
    let broken = Rc::new(Cell::new(true));
    let flag = Rc::clone(&broken);
    let tracker = Rc::clone(&calls);
    let registry = registry(
        ReleaseLine::new(1)
            .patch(ok(&calls, "o1", 1))
            .patch(PatchDescriptor::new(2, move |_| {
                tracker.borrow_mut().push("o2".into());
                if flag.get() {
                    Err(PatchError::Failed("not yet".into()))
                } else {
                    Ok(())
                }
            }))
            .patch(ok(&calls, "m3", 3).mandatory())
            .patch(ok(&calls, "o4", 4)),
    );

    let report = run_with(&db, &store, UpgradeOptions::default(), &registry).unwrap();
    assert_eq!(recorded(&calls), vec!["o1", "o2", "m3"]);
    assert_eq!(report.watermarks.optional, 1);
    assert_eq!(report.watermarks.mandatory, 3);

    broken.set(false);
    calls.borrow_mut().clear();
    let report = run_with(&db, &store, UpgradeOptions::default(), &registry).unwrap();
    assert_eq!(recorded(&calls), vec!["o2", "o4"]);
    assert_eq!(report.watermarks.optional, 4);
    assert!(report.halted_lineages.is_empty());
}

#[test]
fn test_sequence_collision_is_fatal_for_optional_patch() {
    let db = DuckDbBackend::in_memory().unwrap();
    let store = MemoryVersionStore::new();
    let registry = registry(ReleaseLine::new(1).patch(PatchDescriptor::new(1, |_| {
        Err(SequenceError::Collision {
            table: "widgets".into(),
            reason: "stored counter 0 is not positive".into(),
        }
        .into())
    })));

    let err = run_with(&db, &store, UpgradeOptions::default(), &registry).unwrap_err();
    assert!(
        matches!(err, UpgradeError::SequenceCollision { ref patch, .. } if patch == "1"),
        "{err}"
    );
    assert_eq!(store.applied_version(Lineage::OptionalBase).unwrap(), 0);
}

#[test]
fn test_duplicates_group_recorded_after_last_member() {
    let db = DuckDbBackend::in_memory().unwrap();
    let store = MemoryVersionStore::new();
    let calls = calls();
    let broken = Rc::new(Cell::new(true));
    let flag = Rc::clone(&broken);
    let tracker = Rc::clone(&calls);
    let registry = registry(
        ReleaseLine::new(1)
            .patch(ok(&calls, "7a", 7).mandatory())
            .patch(
                PatchDescriptor::new(7, move |_| {
                    tracker.borrow_mut().push("7b".into());
                    if flag.get() {
                        Err(PatchError::Failed("7b failed".into()))
                    } else {
                        Ok(())
                    }
                })
                .mandatory()
                .duplicates(),
            ),
    );

    assert!(run_with(&db, &store, UpgradeOptions::default(), &registry).is_err());
    assert_eq!(store.applied_version(Lineage::MandatoryBase).unwrap(), 0);

    broken.set(false);
    let report = run_with(&db, &store, UpgradeOptions::default(), &registry).unwrap();
    assert_eq!(recorded(&calls), vec!["7a", "7b", "7a", "7b"]);
    assert_eq!(report.watermarks.mandatory, 7);
}

#[test]
fn test_mixed_lineage_group_resumes_at_failed_member() {
    let db = DuckDbBackend::in_memory().unwrap();
    let store = MemoryVersionStore::new();
    let calls = calls();
    let broken = Rc::new(Cell::new(true));
    let flag = Rc::clone(&broken);
    let tracker = Rc::clone(&calls);
    let registry = registry(
        ReleaseLine::new(1)
            .patch(ok(&calls, "7a", 7).mandatory())
            .patch(ok(&calls, "7b", 7).duplicates())
            .patch(
                PatchDescriptor::new(7, move |_| {
                    tracker.borrow_mut().push("7c".into());
                    if flag.get() {
                        Err(PatchError::Failed("7c failed".into()))
                    } else {
                        Ok(())
                    }
                })
                .mandatory()
                .duplicates(),
            ),
    );

    let err = run_with(&db, &store, UpgradeOptions::default(), &registry).unwrap_err();
    assert!(matches!(err, UpgradeError::AbortedUpgrade { .. }), "{err}");
    assert_eq!(store.applied_version(Lineage::MandatoryBase).unwrap(), 0);
    assert_eq!(store.applied_version(Lineage::OptionalBase).unwrap(), 7);

    broken.set(false);
    let report = run_with(&db, &store, UpgradeOptions::default(), &registry).unwrap();
    assert_eq!(recorded(&calls), vec!["7a", "7b", "7c", "7a", "7c"]);
    assert_eq!(report.watermarks.mandatory, 7);
    assert_eq!(report.watermarks.optional, 7);
}

// ── Backend handling ───────────────────────────────────────────────────

#[test]
fn test_inapplicable_patch_recorded_without_running() {
    let db = DuckDbBackend::in_memory().unwrap();
    let store = MemoryVersionStore::new();
    let calls = calls();
    let registry = registry(
        ReleaseLine::new(1)
            .patch(ok(&calls, "sqlite-only", 1).only_on(&[DbType::Sqlite]))
            .patch(ok(&calls, "everywhere", 2)),
    );

    let report = run_with(&db, &store, UpgradeOptions::default(), &registry).unwrap();
    assert_eq!(recorded(&calls), vec!["everywhere"]);
    assert_eq!(report.skipped_inapplicable.len(), 1);
    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.watermarks.optional, 2);
}

#[test]
fn test_fixed_schema_refuses_pending_work() {
    let db = DuckDbBackend::in_memory()
        .unwrap()
        .with_schema_mode(SchemaMode::Fixed);
    let store = SqlVersionStore::new(&db);
    let calls = calls();
    let registry = registry(ReleaseLine::new(1).patch(ok(&calls, "m1", 1).mandatory()));

    let err = run_with(&db, &store, UpgradeOptions::default(), &registry).unwrap_err();
    assert!(
        matches!(err, UpgradeError::BackendUnsupported { pending: 1, .. }),
        "{err}"
    );
    assert!(recorded(&calls).is_empty());
    assert!(!db.table_exists("dbversion").unwrap());

    let empty = PatchRegistry::build(Vec::new(), DbType::DuckDb).unwrap();
    let report = run_with(&db, &store, UpgradeOptions::default(), &empty).unwrap();
    assert!(report.is_noop());
}

#[test]
fn test_newer_database_refused() {
    let db = DuckDbBackend::in_memory().unwrap();
    let store = MemoryVersionStore::with_watermarks(Watermarks {
        mandatory: 9,
        ..Default::default()
    });
    let calls = calls();
    let registry = registry(
        ReleaseLine::new(1)
            .patch(ok(&calls, "m5", 5).mandatory())
            .patch(ok(&calls, "o12", 12)),
    );

    let err = run_with(&db, &store, UpgradeOptions::default(), &registry).unwrap_err();
    match err {
        UpgradeError::DatabaseNewer {
            lineage,
            found,
            known,
        } => {
            assert_eq!(lineage, Lineage::MandatoryBase);
            assert_eq!((found, known), (9, 5));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(recorded(&calls).is_empty());
}

#[test]
fn test_context_carries_role() {
    let db = SqliteBackend::in_memory().unwrap();
    let store = MemoryVersionStore::new();
    let seen = Rc::new(Cell::new(None));
    let sink = Rc::clone(&seen);
    let registry = registry(ReleaseLine::new(1).patch(PatchDescriptor::new(1, move |ctx| {
        sink.set(Some((ctx.role(), ctx.db_type())));
        Ok(())
    })));

    MigrationRunner::new(&db, &store, DeploymentRole::Proxy, Default::default())
        .run(&registry)
        .unwrap();
    assert_eq!(seen.get(), Some((DeploymentRole::Proxy, DbType::Sqlite)));
}

#[test]
fn test_options_from_config() {
    let config = UpgradeConfig {
        optional_failures: OptionalFailurePolicy::Advance,
        target_version: Some(6000010),
    };
    let options = UpgradeOptions::from(&config);
    assert_eq!(options.optional_failures, OptionalFailurePolicy::Advance);
    assert_eq!(options.target_version, Some(6000010));
}
