#![forbid(unsafe_code)]

use fpr_storage::{SqliteStore, StoreError};
use rusqlite::{Connection, params};
use std::path::PathBuf;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("fpr_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

#[test]
fn unit_variable_survives_reopen() {
    let storage_dir = temp_dir("unit_variable_survives_reopen");
    {
        let mut store = SqliteStore::open(&storage_dir).expect("open store");
        assert_eq!(
            store
                .unit_variable("FPR", "maxLastUpdate")
                .expect("read marker"),
            None
        );
        store
            .set_unit_variable("FPR", "maxLastUpdate", "2011-09-18T18:31:29")
            .expect("write marker");
        store
            .set_unit_variable("FPR", "maxLastUpdate", "2011-10-18T18:31:29")
            .expect("overwrite marker");
    }

    let store = SqliteStore::open(&storage_dir).expect("reopen store");
    assert_eq!(
        store
            .unit_variable("FPR", "maxLastUpdate")
            .expect("read marker")
            .as_deref(),
        Some("2011-10-18T18:31:29")
    );
}

#[test]
fn unit_variable_rejects_empty_names() {
    let mut store = SqliteStore::open(temp_dir("unit_variable_empty")).expect("open store");
    let err = store
        .set_unit_variable("", "maxLastUpdate", "x")
        .expect_err("empty unittype");
    assert!(matches!(err, StoreError::InvalidInput(_)));
}

#[test]
fn foreign_schema_version_requires_reset() {
    let storage_dir = temp_dir("foreign_schema_version");
    let db_path = {
        let store = SqliteStore::open(&storage_dir).expect("open store");
        store.db_path()
    };

    {
        let conn = Connection::open(&db_path).expect("open db");
        conn.execute(
            "UPDATE meta SET value=?1 WHERE key='schema_version'",
            params!["999"],
        )
        .expect("bump version");
    }

    let err = SqliteStore::open(&storage_dir).expect_err("mismatched schema");
    match err {
        StoreError::InvalidInput(msg) => assert!(msg.starts_with("RESET_REQUIRED")),
        other => panic!("expected InvalidInput, got {other:?}"),
    }
}

#[test]
fn uncommitted_transaction_is_not_persisted_after_reopen() {
    let storage_dir = temp_dir("uncommitted_transaction");
    let db_path = {
        let store = SqliteStore::open(&storage_dir).expect("open store");
        store.db_path()
    };

    {
        let mut conn = Connection::open(&db_path).expect("open db");
        let tx = conn.transaction().expect("begin tx");
        tx.execute(
            "INSERT INTO unit_variables(unittype, variable, value, updated_at_ms) VALUES (?1, ?2, ?3, 0)",
            params!["FPR", "maxLastUpdate", "2099-01-01T00:00:00"],
        )
        .expect("insert marker");
        // Dropped without commit.
    }

    let store = SqliteStore::open(&storage_dir).expect("reopen store");
    assert_eq!(
        store
            .unit_variable("FPR", "maxLastUpdate")
            .expect("read marker"),
        None
    );
}
