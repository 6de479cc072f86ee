use lifesync_core::db::migrations::latest_version;
use lifesync_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(latest_version(), 2);
    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "kv_store");
    assert_table_exists(&conn, "entity_snapshots");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lifesync.db");

    let conn_first = open_db(&path).unwrap();
    conn_first
        .execute(
            "INSERT INTO kv_store (key, value) VALUES ('marker', 'kept');",
            [],
        )
        .unwrap();
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    let value: String = conn_second
        .query_row("SELECT value FROM kv_store WHERE key = 'marker';", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(value, "kept");
}

#[test]
fn two_connections_on_one_file_both_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");

    let first = open_db(&path).unwrap();
    let second = open_db(&path).unwrap();

    assert_eq!(schema_version(&first), latest_version());
    assert_eq!(schema_version(&second), latest_version());
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn entity_snapshot_constraints_are_enforced() {
    let conn = open_db_in_memory().unwrap();

    let bad_kind = conn.execute(
        "INSERT INTO entity_snapshots (kind, id, owner_key, data, version, updated_at)
         VALUES ('note', 'n1', 'device:d1', '{}', 0, '2026-01-01T00:00:00Z');",
        [],
    );
    assert!(bad_kind.is_err());

    let negative_version = conn.execute(
        "INSERT INTO entity_snapshots (kind, id, owner_key, data, version, updated_at)
         VALUES ('profile', 'p1', 'device:d1', '{}', -1, '2026-01-01T00:00:00Z');",
        [],
    );
    assert!(negative_version.is_err());
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
