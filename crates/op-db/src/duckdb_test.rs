use super::*;
use op_core::DbType;

#[test]
fn test_in_memory() {
    let db = DuckDbBackend::in_memory().unwrap();
    assert_eq!(db.db_type(), DbType::DuckDb);
    assert_eq!(db.schema_mode(), SchemaMode::Managed);
}

#[test]
fn test_with_schema_mode() {
    let db = DuckDbBackend::new(":memory:")
        .unwrap()
        .with_schema_mode(SchemaMode::Fixed);
    assert_eq!(db.schema_mode(), SchemaMode::Fixed);
}

#[test]
fn test_from_path_creates_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outpost.duckdb");
    let db = DuckDbBackend::from_path(&path).unwrap();
    db.execute_batch("CREATE TABLE t (id BIGINT)").unwrap();
    assert!(path.exists());
}

#[test]
fn test_query_i64() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch("CREATE TABLE nums (n BIGINT); INSERT INTO nums VALUES (3), (7);")
        .unwrap();

    assert_eq!(db.query_i64("SELECT MAX(n) FROM nums").unwrap(), Some(7));
    assert_eq!(
        db.query_i64("SELECT MAX(n) FROM nums WHERE n > 100").unwrap(),
        None
    );
    assert_eq!(db.query_i64("SELECT n FROM nums WHERE n = 0").unwrap(), None);
}

#[test]
fn test_query_rows_renders_text() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch(
        "CREATE TABLE t (id BIGINT, name VARCHAR); INSERT INTO t VALUES (1, 'a'), (2, NULL);",
    )
    .unwrap();

    let rows = db.query_rows("SELECT id, name FROM t ORDER BY id").unwrap();
    assert_eq!(
        rows,
        vec![
            vec![Some("1".to_string()), Some("a".to_string())],
            vec![Some("2".to_string()), None],
        ]
    );
}

#[test]
fn test_missing_table_error() {
    let db = DuckDbBackend::in_memory().unwrap();
    let err = db.query_i64("SELECT COUNT(*) FROM nonexistent").unwrap_err();
    assert!(matches!(err, DbError::TableNotFound(_)), "{err}");
}

#[test]
fn test_catalog() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch(
        "CREATE TABLE hosts (hostid BIGINT NOT NULL, host VARCHAR(128) DEFAULT 'x', PRIMARY KEY (hostid));
         CREATE TABLE items (itemid BIGINT PRIMARY KEY, hostid BIGINT, FOREIGN KEY (hostid) REFERENCES hosts (hostid));
         CREATE INDEX items_1 ON items (hostid);",
    )
    .unwrap();

    assert!(db.table_exists("hosts").unwrap());
    assert!(db.table_exists("HOSTS").unwrap());
    assert!(!db.table_exists("triggers").unwrap());

    let columns = db.columns("hosts").unwrap();
    assert_eq!(columns.len(), 2);
    assert_eq!(columns[0].name, "hostid");
    assert!(columns[0].not_null);
    assert!(!columns[1].not_null);
    assert!(columns[1].default.is_some());

    assert_eq!(db.primary_key("hosts").unwrap(), vec!["hostid".to_string()]);
    assert!(db.index_exists("items", "items_1").unwrap());
    assert!(!db.index_exists("items", "items_2").unwrap());

    let fks = db.foreign_keys("items").unwrap();
    assert_eq!(fks.len(), 1);
    assert_eq!(fks[0].fields, vec!["hostid".to_string()]);
    assert_eq!(fks[0].ref_table, "hosts");
}

#[test]
fn test_indexes_lists_explicit_indexes_only() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch(
        "CREATE TABLE items (itemid BIGINT PRIMARY KEY, hostid BIGINT, name VARCHAR);
         CREATE INDEX items_1 ON items (hostid);
         CREATE UNIQUE INDEX items_2 ON items (name);",
    )
    .unwrap();

    let indexes = db.indexes("items").unwrap();
    let names: Vec<&str> = indexes.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["items_1", "items_2"]);
    assert!(indexes[1].sql.to_uppercase().starts_with("CREATE UNIQUE INDEX"));
    assert!(!indexes[0].sql.ends_with(';'));
}

#[test]
fn test_parse_foreign_key() {
    let fk = parse_foreign_key("FOREIGN KEY (a, \"b\") REFERENCES parent(x, y)").unwrap();
    assert_eq!(fk.fields, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(fk.ref_table, "parent");
    assert_eq!(fk.ref_fields, vec!["x".to_string(), "y".to_string()]);

    assert!(parse_foreign_key("CHECK (a > 0)").is_none());
}

#[test]
fn test_rebuild_unsupported() {
    use crate::schema::{ForeignKeyDef, TableChange};

    let db = DuckDbBackend::in_memory().unwrap();
    let change = TableChange::AddForeignKey(ForeignKeyDef::new("fk", &["a"], "b", &["id"]));
    let err = db.rebuild_table("t", &change).unwrap_err();
    assert!(matches!(err, DbError::Unsupported { .. }));
}
