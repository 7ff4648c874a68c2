#![forbid(unsafe_code)]

use super::*;
use fpr_core::{ReconcilePlan, RemoteRecord, plan_reconcile};
use rusqlite::Transaction;

impl SqliteStore {
    /// Merges one registry record into the local chain state as a single transaction.
    pub fn reconcile_record(
        &mut self,
        kind: RuleKind,
        record: &RemoteRecord,
    ) -> Result<ReconcileOutcome, StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;

        let plan = plan_reconcile(&SqlChain { conn: &tx, kind }, kind, record)?;
        tracing::debug!(kind = %kind, id = %record.id, ?plan, "reconcile plan");

        let outcome = match plan {
            ReconcilePlan::UpdateExisting => {
                if refresh_payload_tx(&tx, kind, record, now_ms)? {
                    ReconcileOutcome::Updated
                } else {
                    ReconcileOutcome::Unchanged
                }
            }
            ReconcilePlan::InsertRoot { enabled, dangling } => {
                if let Some(target) = dangling.as_ref() {
                    tracing::warn!(
                        kind = %kind,
                        id = %record.id,
                        replaces = %target,
                        "replaces target is unknown locally; inserting as chain root"
                    );
                }
                insert_rule_tx(&tx, remote_rule(kind, record, enabled, None), now_ms)?;
                ReconcileOutcome::Inserted {
                    enabled,
                    replaces: None,
                    relinked: None,
                    dangling,
                }
            }
            ReconcilePlan::InsertReplacement {
                replaces,
                enabled,
                disable,
                relink,
            } => {
                if let Some(previous) = disable.as_ref() {
                    set_enabled_tx(&tx, kind, previous, false, now_ms)?;
                }
                insert_rule_tx(
                    &tx,
                    remote_rule(kind, record, enabled, Some(&replaces)),
                    now_ms,
                )?;
                if let Some(successor) = relink.as_ref() {
                    set_replaces_tx(&tx, kind, successor, &record.id, now_ms)?;
                }
                ReconcileOutcome::Inserted {
                    enabled,
                    replaces: Some(replaces),
                    relinked: relink,
                    dangling: None,
                }
            }
        };

        tx.commit()?;
        Ok(outcome)
    }
}

fn remote_rule<'a>(
    kind: RuleKind,
    record: &'a RemoteRecord,
    enabled: bool,
    replaces: Option<&'a RuleId>,
) -> NewRule<'a> {
    NewRule {
        kind,
        id: &record.id,
        enabled,
        replaces,
        last_modified: record.last_modified.as_deref(),
        payload: &record.payload,
        origin: RuleOrigin::Remote,
    }
}

/// Returns whether anything changed.
fn refresh_payload_tx(
    tx: &Transaction<'_>,
    kind: RuleKind,
    record: &RemoteRecord,
    now_ms: i64,
) -> Result<bool, StoreError> {
    let (stored_payload, stored_last_modified) = tx.query_row(
        "SELECT payload_json, last_modified FROM rules WHERE kind=?1 AND id=?2",
        params![kind.as_str(), record.id.as_str()],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
    )?;

    let payload_same = decode_payload(&stored_payload)? == record.payload;
    let last_modified_same = record.last_modified.is_none()
        || record.last_modified.as_deref() == stored_last_modified.as_deref();
    if payload_same && last_modified_same {
        return Ok(false);
    }

    tx.execute(
        "UPDATE rules SET payload_json=?3, last_modified=COALESCE(?4, last_modified), updated_at_ms=?5 \
         WHERE kind=?1 AND id=?2",
        params![
            kind.as_str(),
            record.id.as_str(),
            encode_payload(&record.payload)?,
            record.last_modified.as_deref(),
            now_ms,
        ],
    )?;
    Ok(true)
}
