#![forbid(unsafe_code)]

use super::StoreError;
use rusqlite::{Connection, OptionalExtension, params};

const SCHEMA_VERSION: &str = "1";

const SQL: &str = r#"
        CREATE TABLE IF NOT EXISTS meta (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        -- One row per rule of any kind. `replaces` links a rule to the rule it supersedes
        -- within the same kind; the links form the replacement chains.
        CREATE TABLE IF NOT EXISTS rules (
          kind TEXT NOT NULL,
          id TEXT NOT NULL,
          enabled INTEGER NOT NULL CHECK(enabled IN (0, 1)),
          replaces TEXT,
          last_modified TEXT,
          payload_json TEXT NOT NULL,
          origin TEXT NOT NULL CHECK(origin IN ('local', 'remote')),
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          PRIMARY KEY(kind, id),
          FOREIGN KEY(kind, replaces)
            REFERENCES rules(kind, id)
            ON DELETE RESTRICT,
          CHECK(replaces IS NULL OR replaces <> id)
        );

        CREATE INDEX IF NOT EXISTS idx_rules_kind_replaces
          ON rules(kind, replaces);

        CREATE TABLE IF NOT EXISTS unit_variables (
          unittype TEXT NOT NULL,
          variable TEXT NOT NULL,
          value TEXT NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          PRIMARY KEY(unittype, variable)
        );
"#;

pub(super) fn install(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SQL)?;

    let version = conn
        .query_row(
            "SELECT value FROM meta WHERE key='schema_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?;

    match version {
        Some(v) if v == SCHEMA_VERSION => Ok(()),
        Some(_) => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema version mismatch",
        )),
        None => {
            conn.execute(
                "INSERT INTO meta(key, value) VALUES (?1, ?2)",
                params!["schema_version", SCHEMA_VERSION],
            )?;
            Ok(())
        }
    }
}
