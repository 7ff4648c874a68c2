#![forbid(unsafe_code)]

//! Replacement-chain reconciliation.
//!
//! A chain is the set of rules linked by `replaces` pointers, ending at a root with no
//! predecessor. At most one member is enabled. The planners here only read chain state
//! through [`ChainLookup`] and return the writes to perform; callers apply a plan inside
//! a single transaction.

use crate::ids::RuleId;
use crate::kinds::RuleKind;
use crate::record::RemoteRecord;
use std::collections::BTreeSet;

pub const MAX_CHAIN_DEPTH: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainRule {
    pub id: RuleId,
    pub enabled: bool,
    pub replaces: Option<RuleId>,
}

/// Indexed read access to the local rules of one kind.
pub trait ChainLookup {
    type Error: From<ChainError>;

    fn rule(&self, id: &RuleId) -> Result<Option<ChainRule>, Self::Error>;

    /// Ids of the rules whose `replaces` points at `id`.
    fn successors(&self, id: &RuleId) -> Result<Vec<RuleId>, Self::Error>;
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("replacement cycle detected at rule {id}")]
    Cycle { id: RuleId },
    #[error("replacement chain is deeper than {max} links")]
    DepthExceeded { max: usize },
    #[error("rule {id} is replaced by {count} rules")]
    Branching { id: RuleId, count: usize },
    #[error("chain has more than one enabled rule ({})", join_ids(.ids))]
    MultipleEnabled { ids: Vec<RuleId> },
    #[error("rule {id} is already replaced by {successor}")]
    AlreadyReplaced { id: RuleId, successor: RuleId },
    #[error("unknown rule {id}")]
    UnknownRule { id: RuleId },
}

fn join_ids(ids: &[RuleId]) -> String {
    ids.iter()
        .map(RuleId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Writes needed to merge one remote record into the local chain state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcilePlan {
    /// The id is already known locally: refresh payload, leave structure and enablement.
    UpdateExisting,
    /// Insert as a chain root. `dangling` names a `replaces` target that was not found.
    InsertRoot {
        enabled: bool,
        dangling: Option<RuleId>,
    },
    /// Insert directly after `replaces`.
    InsertReplacement {
        replaces: RuleId,
        enabled: bool,
        /// Previously enabled member at or before `replaces`.
        disable: Option<RuleId>,
        /// Local successor of `replaces`, rewritten to replace the inserted rule.
        relink: Option<RuleId>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalReplacementPlan {
    pub disable: Option<RuleId>,
}

pub fn plan_reconcile<L: ChainLookup>(
    lookup: &L,
    kind: RuleKind,
    record: &RemoteRecord,
) -> Result<ReconcilePlan, L::Error> {
    if lookup.rule(&record.id)?.is_some() {
        return Ok(ReconcilePlan::UpdateExisting);
    }

    let capabilities = kind.capabilities();
    let enabled = record.enabled || !capabilities.enabled;
    let target = match record.replaces.as_ref() {
        Some(target) if capabilities.replaces => target,
        _ => {
            return Ok(ReconcilePlan::InsertRoot {
                enabled,
                dangling: None,
            });
        }
    };

    let Some(target_rule) = lookup.rule(target)? else {
        return Ok(ReconcilePlan::InsertRoot {
            enabled,
            dangling: Some(target.clone()),
        });
    };

    let walk = walk_chain(lookup, &target_rule)?;
    let enabled = enabled && walk.enabled_after.is_none();
    let disable = if enabled {
        walk.enabled_at_or_before
    } else {
        None
    };

    Ok(ReconcilePlan::InsertReplacement {
        replaces: target_rule.id,
        enabled,
        disable,
        relink: walk.successor,
    })
}

/// Plans an operator-authored replacement: the new rule becomes the enabled tail after `target`.
pub fn plan_local_replacement<L: ChainLookup>(
    lookup: &L,
    target: &RuleId,
) -> Result<LocalReplacementPlan, L::Error> {
    let Some(target_rule) = lookup.rule(target)? else {
        return Err(ChainError::UnknownRule { id: target.clone() }.into());
    };

    let walk = walk_chain(lookup, &target_rule)?;
    if let Some(successor) = walk.successor {
        return Err(ChainError::AlreadyReplaced {
            id: target.clone(),
            successor,
        }
        .into());
    }

    Ok(LocalReplacementPlan {
        disable: walk.enabled_at_or_before,
    })
}

#[derive(Debug, Default)]
struct ChainWalk {
    enabled_at_or_before: Option<RuleId>,
    enabled_after: Option<RuleId>,
    successor: Option<RuleId>,
}

fn walk_chain<L: ChainLookup>(lookup: &L, start: &ChainRule) -> Result<ChainWalk, L::Error> {
    let mut seen = BTreeSet::new();
    let mut enabled = Vec::new();
    let mut walk = ChainWalk::default();
    seen.insert(start.id.clone());

    // Backwards to the root.
    let mut current = start.clone();
    let mut depth = 0usize;
    loop {
        if current.enabled {
            enabled.push(current.id.clone());
            walk.enabled_at_or_before = Some(current.id.clone());
        }
        let Some(previous) = current.replaces.as_ref() else {
            break;
        };
        if !seen.insert(previous.clone()) {
            return Err(ChainError::Cycle {
                id: previous.clone(),
            }
            .into());
        }
        depth = depth.saturating_add(1);
        if depth > MAX_CHAIN_DEPTH {
            return Err(ChainError::DepthExceeded {
                max: MAX_CHAIN_DEPTH,
            }
            .into());
        }
        match lookup.rule(previous)? {
            Some(rule) => current = rule,
            None => break,
        }
    }

    // Forwards to the tail.
    let mut current_id = start.id.clone();
    depth = 0;
    loop {
        let mut successors = lookup.successors(&current_id)?;
        let next = match successors.len() {
            0 => break,
            1 => successors.remove(0),
            count => {
                return Err(ChainError::Branching {
                    id: current_id,
                    count,
                }
                .into());
            }
        };
        if !seen.insert(next.clone()) {
            return Err(ChainError::Cycle { id: next }.into());
        }
        depth = depth.saturating_add(1);
        if depth > MAX_CHAIN_DEPTH {
            return Err(ChainError::DepthExceeded {
                max: MAX_CHAIN_DEPTH,
            }
            .into());
        }
        let Some(rule) = lookup.rule(&next)? else {
            break;
        };
        if walk.successor.is_none() {
            walk.successor = Some(rule.id.clone());
        }
        if rule.enabled {
            enabled.push(rule.id.clone());
            walk.enabled_after = Some(rule.id.clone());
        }
        current_id = rule.id;
    }

    if enabled.len() > 1 {
        return Err(ChainError::MultipleEnabled { ids: enabled }.into());
    }

    Ok(walk)
}

#[cfg(test)]
mod tests;
