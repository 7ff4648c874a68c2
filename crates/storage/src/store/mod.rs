#![forbid(unsafe_code)]

mod error;
mod reconcile;
mod requests;
mod rules;
mod schema;
mod types;
mod unit_vars;

pub use error::StoreError;
pub use requests::*;
pub use types::*;

use fpr_core::{ChainLookup, ChainRule, RuleId, RuleKind};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DB_FILENAME: &str = "fpr_registry.db";

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let conn = Connection::open(storage_dir.join(DB_FILENAME))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        schema::install(&conn)?;

        Ok(Self { conn, storage_dir })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn db_path(&self) -> PathBuf {
        self.storage_dir.join(DB_FILENAME)
    }
}

/// Chain reads scoped to one kind, borrowed from an open transaction.
struct SqlChain<'a> {
    conn: &'a Connection,
    kind: RuleKind,
}

impl ChainLookup for SqlChain<'_> {
    type Error = StoreError;

    fn rule(&self, id: &RuleId) -> Result<Option<ChainRule>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT enabled, replaces FROM rules WHERE kind=?1 AND id=?2",
                params![self.kind.as_str(), id.as_str()],
                |row| Ok((row.get::<_, bool>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?;

        match row {
            Some((enabled, replaces)) => Ok(Some(ChainRule {
                id: id.clone(),
                enabled,
                replaces: replaces.map(stored_rule_id).transpose()?,
            })),
            None => Ok(None),
        }
    }

    fn successors(&self, id: &RuleId) -> Result<Vec<RuleId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM rules WHERE kind=?1 AND replaces=?2 ORDER BY rowid ASC")?;
        let mut rows = stmt.query(params![self.kind.as_str(), id.as_str()])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(stored_rule_id(row.get::<_, String>(0)?)?);
        }
        Ok(out)
    }
}

const RULE_COLUMNS: &str = "kind, id, enabled, replaces, last_modified, payload_json, origin, created_at_ms, updated_at_ms";

fn rule_row_tx(
    conn: &Connection,
    kind: RuleKind,
    id: &RuleId,
) -> Result<Option<RuleRow>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RULE_COLUMNS} FROM rules WHERE kind=?1 AND id=?2"
    ))?;
    let mut rows = stmt.query(params![kind.as_str(), id.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(Some(decode_rule_row(row)?)),
        None => Ok(None),
    }
}

fn decode_rule_row(row: &rusqlite::Row<'_>) -> Result<RuleRow, StoreError> {
    let kind = row.get::<_, String>(0)?;
    let origin = row.get::<_, String>(6)?;
    Ok(RuleRow {
        kind: RuleKind::parse(&kind).ok_or(StoreError::InvalidInput("invalid stored rule kind"))?,
        id: stored_rule_id(row.get::<_, String>(1)?)?,
        enabled: row.get::<_, bool>(2)?,
        replaces: row
            .get::<_, Option<String>>(3)?
            .map(stored_rule_id)
            .transpose()?,
        last_modified: row.get::<_, Option<String>>(4)?,
        payload: decode_payload(&row.get::<_, String>(5)?)?,
        origin: RuleOrigin::parse(&origin)
            .ok_or(StoreError::InvalidInput("invalid stored rule origin"))?,
        created_at_ms: row.get::<_, i64>(7)?,
        updated_at_ms: row.get::<_, i64>(8)?,
    })
}

fn rule_exists_tx(conn: &Connection, kind: RuleKind, id: &RuleId) -> Result<bool, StoreError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM rules WHERE kind=?1 AND id=?2",
            params![kind.as_str(), id.as_str()],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

struct NewRule<'a> {
    kind: RuleKind,
    id: &'a RuleId,
    enabled: bool,
    replaces: Option<&'a RuleId>,
    last_modified: Option<&'a str>,
    payload: &'a Map<String, Value>,
    origin: RuleOrigin,
}

fn insert_rule_tx(conn: &Connection, rule: NewRule<'_>, now_ms: i64) -> Result<(), StoreError> {
    let enabled = rule.enabled || !rule.kind.capabilities().enabled;
    let insert = conn.execute(
        "INSERT INTO rules(kind, id, enabled, replaces, last_modified, payload_json, origin, created_at_ms, updated_at_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            rule.kind.as_str(),
            rule.id.as_str(),
            enabled,
            rule.replaces.map(RuleId::as_str),
            rule.last_modified,
            encode_payload(rule.payload)?,
            rule.origin.as_str(),
            now_ms,
        ],
    );

    match insert {
        Ok(_) => Ok(()),
        Err(err) => Err(map_insert_conflict(err)),
    }
}

fn set_enabled_tx(
    conn: &Connection,
    kind: RuleKind,
    id: &RuleId,
    enabled: bool,
    now_ms: i64,
) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE rules SET enabled=?3, updated_at_ms=?4 WHERE kind=?1 AND id=?2",
        params![kind.as_str(), id.as_str(), enabled, now_ms],
    )?;
    if changed == 0 {
        return Err(StoreError::UnknownId);
    }
    Ok(())
}

fn set_replaces_tx(
    conn: &Connection,
    kind: RuleKind,
    id: &RuleId,
    replaces: &RuleId,
    now_ms: i64,
) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE rules SET replaces=?3, updated_at_ms=?4 WHERE kind=?1 AND id=?2",
        params![kind.as_str(), id.as_str(), replaces.as_str(), now_ms],
    )?;
    if changed == 0 {
        return Err(StoreError::UnknownId);
    }
    Ok(())
}

fn encode_payload(payload: &Map<String, Value>) -> Result<String, StoreError> {
    serde_json::to_string(payload).map_err(|_| StoreError::InvalidInput("payload is not serializable"))
}

fn decode_payload(raw: &str) -> Result<Map<String, Value>, StoreError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(StoreError::InvalidInput("invalid stored payload_json")),
    }
}

fn stored_rule_id(value: String) -> Result<RuleId, StoreError> {
    RuleId::try_new(value).map_err(|_| StoreError::InvalidInput("invalid stored rule id"))
}

fn canonicalize_rule_id(value: &str) -> Result<RuleId, StoreError> {
    RuleId::try_new(value).map_err(|_| StoreError::InvalidInput("invalid rule id"))
}

fn map_insert_conflict(err: rusqlite::Error) -> StoreError {
    if is_constraint_violation(&err) {
        return StoreError::AlreadyExists;
    }
    StoreError::Sql(err)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                && message.as_deref().is_some_and(|value| {
                    value.contains("UNIQUE constraint failed")
                        || value.contains("PRIMARY KEY constraint failed")
                })
        }
        _ => false,
    }
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
