#![forbid(unsafe_code)]

use super::*;
use fpr_core::plan_local_replacement;

impl SqliteStore {
    pub fn insert_rule(&mut self, request: InsertRuleRequest) -> Result<RuleRow, StoreError> {
        let id = canonicalize_rule_id(&request.id)?;
        let replaces = request
            .replaces
            .as_deref()
            .map(canonicalize_rule_id)
            .transpose()?;
        if replaces.as_ref().is_some_and(|target| target == &id) {
            return Err(StoreError::InvalidInput("rule must not replace itself"));
        }
        if replaces.is_some() && !request.kind.capabilities().replaces {
            return Err(StoreError::InvalidInput("kind does not support replaces"));
        }

        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        if rule_exists_tx(&tx, request.kind, &id)? {
            return Err(StoreError::AlreadyExists);
        }
        if let Some(target) = replaces.as_ref() {
            if !rule_exists_tx(&tx, request.kind, target)? {
                return Err(StoreError::UnknownId);
            }
        }

        insert_rule_tx(
            &tx,
            NewRule {
                kind: request.kind,
                id: &id,
                enabled: request.enabled,
                replaces: replaces.as_ref(),
                last_modified: request.last_modified.as_deref(),
                payload: &request.payload,
                origin: RuleOrigin::Local,
            },
            now_ms,
        )?;
        let row = rule_row_tx(&tx, request.kind, &id)?.ok_or(StoreError::UnknownId)?;
        tx.commit()?;
        Ok(row)
    }

    pub fn replace_rule(&mut self, request: ReplaceRuleRequest) -> Result<RuleRow, StoreError> {
        if !request.kind.capabilities().replaces {
            return Err(StoreError::InvalidInput("kind does not support replaces"));
        }
        let id = canonicalize_rule_id(&request.id)?;
        let replacing = canonicalize_rule_id(&request.replacing)?;
        if id == replacing {
            return Err(StoreError::InvalidInput("rule must not replace itself"));
        }

        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        if rule_exists_tx(&tx, request.kind, &id)? {
            return Err(StoreError::AlreadyExists);
        }

        let plan = plan_local_replacement(
            &SqlChain {
                conn: &tx,
                kind: request.kind,
            },
            &replacing,
        )
        .map_err(|err| match err {
            StoreError::Chain(fpr_core::ChainError::UnknownRule { .. }) => StoreError::UnknownId,
            other => other,
        })?;

        if let Some(previous) = plan.disable.as_ref() {
            set_enabled_tx(&tx, request.kind, previous, false, now_ms)?;
        }
        insert_rule_tx(
            &tx,
            NewRule {
                kind: request.kind,
                id: &id,
                enabled: true,
                replaces: Some(&replacing),
                last_modified: request.last_modified.as_deref(),
                payload: &request.payload,
                origin: RuleOrigin::Local,
            },
            now_ms,
        )?;
        let row = rule_row_tx(&tx, request.kind, &id)?.ok_or(StoreError::UnknownId)?;
        tx.commit()?;
        Ok(row)
    }

    pub fn rule(&self, kind: RuleKind, id: &str) -> Result<Option<RuleRow>, StoreError> {
        let id = canonicalize_rule_id(id)?;
        rule_row_tx(&self.conn, kind, &id)
    }

    pub fn list_rules(&self, kind: RuleKind) -> Result<Vec<RuleRow>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE kind=?1 ORDER BY rowid ASC"
        ))?;
        let mut rows = stmt.query(params![kind.as_str()])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(decode_rule_row(row)?);
        }
        Ok(out)
    }

    pub fn count_rules(&self, kind: RuleKind) -> Result<usize, StoreError> {
        let count = self.conn.query_row(
            "SELECT COUNT(1) FROM rules WHERE kind=?1",
            params![kind.as_str()],
            |row| row.get::<_, i64>(0),
        )?;
        usize::try_from(count).map_err(|_| StoreError::InvalidInput("numeric overflow"))
    }

    /// Members of the chain containing `id`, root first.
    pub fn chain(&self, kind: RuleKind, id: &str) -> Result<Vec<RuleRow>, StoreError> {
        let id = canonicalize_rule_id(id)?;
        let lookup = SqlChain {
            conn: &self.conn,
            kind,
        };
        let Some(start) = lookup.rule(&id)? else {
            return Err(StoreError::UnknownId);
        };

        let mut root = start;
        for _ in 0..=fpr_core::MAX_CHAIN_DEPTH {
            match root.replaces.as_ref() {
                Some(previous) => match lookup.rule(previous)? {
                    Some(rule) => root = rule,
                    None => break,
                },
                None => break,
            }
        }

        let mut out = Vec::new();
        let mut current = Some(root.id);
        while let Some(id) = current {
            if out.len() > fpr_core::MAX_CHAIN_DEPTH {
                return Err(StoreError::Chain(fpr_core::ChainError::DepthExceeded {
                    max: fpr_core::MAX_CHAIN_DEPTH,
                }));
            }
            let row = rule_row_tx(&self.conn, kind, &id)?.ok_or(StoreError::UnknownId)?;
            out.push(row);
            let successors = lookup.successors(&id)?;
            current = match successors.len() {
                0 => None,
                1 => successors.into_iter().next(),
                count => {
                    return Err(StoreError::Chain(fpr_core::ChainError::Branching {
                        id,
                        count,
                    }));
                }
            };
        }
        Ok(out)
    }
}
