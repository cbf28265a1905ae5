use super::*;
use op_db::{DuckDbBackend, SqliteBackend};

fn backends() -> Vec<Box<dyn Database>> {
    vec![
        Box::new(DuckDbBackend::in_memory().unwrap()),
        Box::new(SqliteBackend::in_memory().unwrap()),
    ]
}

fn widgets(db: &dyn Database, max_id: i64) {
    db.execute_batch("CREATE TABLE widgets (widgetid BIGINT NOT NULL, name VARCHAR(64), PRIMARY KEY (widgetid))")
        .unwrap();
    if max_id > 0 {
        db.execute(&format!(
            "INSERT INTO widgets (widgetid, name) VALUES ({max_id}, 'w')"
        ))
        .unwrap();
    }
}

fn counter(db: &dyn Database) -> Option<i64> {
    db.query_i64("SELECT nextid FROM ids WHERE table_name = 'widgets'")
        .unwrap()
}

#[test]
fn test_reserve_range_then_next_id() {
    for db in backends() {
        widgets(db.as_ref(), 10);
        let ids = IdSequenceAllocator::new(db.as_ref());

        assert_eq!(ids.reserve_range("widgets", 3).unwrap(), 11);
        assert_eq!(counter(db.as_ref()), Some(14));
        assert_eq!(ids.next_id("widgets").unwrap(), 14);
        assert_eq!(counter(db.as_ref()), Some(15));
    }
}

#[test]
fn test_empty_table_starts_at_one() {
    for db in backends() {
        widgets(db.as_ref(), 0);
        let ids = IdSequenceAllocator::new(db.as_ref());
        assert_eq!(ids.next_id("widgets").unwrap(), 1);
        assert_eq!(ids.next_id("widgets").unwrap(), 2);
    }
}

#[test]
fn test_next_id_skips_manual_inserts() {
    for db in backends() {
        widgets(db.as_ref(), 0);
        let ids = IdSequenceAllocator::new(db.as_ref());
        assert_eq!(ids.next_id("widgets").unwrap(), 1);

        db.execute("INSERT INTO widgets (widgetid) VALUES (50)").unwrap();
        assert_eq!(ids.next_id("widgets").unwrap(), 51);
    }
}

#[test]
fn test_resync_never_lowers_counter() {
    for db in backends() {
        widgets(db.as_ref(), 5);
        let ids = IdSequenceAllocator::new(db.as_ref());

        ids.resync_after_manual_insert("widgets").unwrap();
        assert_eq!(counter(db.as_ref()), Some(6));

        ids.reserve_range("widgets", 100).unwrap();
        assert_eq!(counter(db.as_ref()), Some(106));

        ids.resync_after_manual_insert("widgets").unwrap();
        assert_eq!(counter(db.as_ref()), Some(106));

        db.execute("INSERT INTO widgets (widgetid) VALUES (500)").unwrap();
        ids.resync_after_manual_insert("widgets").unwrap();
        assert_eq!(counter(db.as_ref()), Some(501));
    }
}

#[test]
fn test_invalid_count() {
    for db in backends() {
        widgets(db.as_ref(), 0);
        let ids = IdSequenceAllocator::new(db.as_ref());
        assert!(matches!(
            ids.reserve_range("widgets", 0),
            Err(SequenceError::InvalidCount(0))
        ));
        assert!(matches!(
            ids.reserve_range("widgets", -2),
            Err(SequenceError::InvalidCount(-2))
        ));
    }
}

#[test]
fn test_corrupt_counter_is_collision() {
    for db in backends() {
        widgets(db.as_ref(), 3);
        let ids = IdSequenceAllocator::new(db.as_ref());
        ids.ensure().unwrap();
        db.execute("INSERT INTO ids VALUES ('widgets', 'widgetid', 0)")
            .unwrap();

        let err = ids.next_id("widgets").unwrap_err();
        assert!(matches!(err, SequenceError::Collision { .. }), "{err}");
    }
}

#[test]
fn test_overflow_is_collision() {
    for db in backends() {
        widgets(db.as_ref(), i64::MAX - 1);
        let ids = IdSequenceAllocator::new(db.as_ref());
        let err = ids.reserve_range("widgets", 5).unwrap_err();
        assert!(matches!(err, SequenceError::Collision { .. }), "{err}");
    }
}

#[test]
fn test_requires_single_column_key() {
    for db in backends() {
        db.execute_batch("CREATE TABLE pairs (a BIGINT NOT NULL, b BIGINT NOT NULL, PRIMARY KEY (a, b))")
            .unwrap();
        let ids = IdSequenceAllocator::new(db.as_ref());
        assert!(matches!(
            ids.next_id("pairs"),
            Err(SequenceError::NoKeyField(_))
        ));
        assert!(matches!(
            ids.next_id("missing"),
            Err(SequenceError::Db(DbError::TableNotFound(_)))
        ));
    }
}
