#![forbid(unsafe_code)]

use crate::ids::{RuleId, RuleIdError};
use crate::kinds::RuleKind;
use crate::timestamp::Timestamp;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Fields the chain logic reads; everything else on a record is payload.
const STRUCTURAL_FIELDS: &[&str] = &[
    "uuid",
    "enabled",
    "replaces",
    "replaces_id",
    "lastmodified",
    "last_modified",
    "resource_uri",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("record has no uuid")]
    MissingId,
    #[error("invalid uuid: {0}")]
    InvalidId(RuleIdError),
    #[error("invalid enabled flag (expected a boolean)")]
    InvalidEnabled,
    #[error("invalid replaces reference: {0}")]
    InvalidReplaces(String),
}

/// One rule record as served by the registry, decoded into its chain-relevant parts.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteRecord {
    pub id: RuleId,
    pub enabled: bool,
    pub replaces: Option<RuleId>,
    pub last_modified: Option<String>,
    pub payload: Map<String, Value>,
}

impl RemoteRecord {
    pub fn from_json(kind: RuleKind, value: Value) -> Result<Self, RecordError> {
        let Value::Object(mut fields) = value else {
            return Err(RecordError::NotAnObject);
        };
        let capabilities = kind.capabilities();

        let id = match fields.get("uuid") {
            Some(Value::String(raw)) => RuleId::try_new(raw.as_str()).map_err(RecordError::InvalidId)?,
            _ => return Err(RecordError::MissingId),
        };

        let enabled = match fields.get("enabled") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(flag)) => *flag || !capabilities.enabled,
            Some(_) => return Err(RecordError::InvalidEnabled),
        };

        let replaces = if capabilities.replaces {
            match (fields.get("replaces"), fields.get("replaces_id")) {
                (Some(Value::String(reference)), _) | (_, Some(Value::String(reference))) => {
                    Some(parse_reference(reference)?)
                }
                (None | Some(Value::Null), None | Some(Value::Null)) => None,
                (Some(other), _) | (_, Some(other)) => {
                    return Err(RecordError::InvalidReplaces(other.to_string()));
                }
            }
        } else {
            None
        };

        let last_modified = ["lastmodified", "last_modified"]
            .into_iter()
            .find_map(|key| fields.get(key).and_then(Value::as_str))
            .map(str::to_string);

        for key in STRUCTURAL_FIELDS {
            fields.remove(*key);
        }

        Ok(Self {
            id,
            enabled,
            replaces,
            last_modified,
            payload: fields,
        })
    }

    pub fn last_modified_at(&self) -> Option<Timestamp> {
        self.last_modified.as_deref().and_then(Timestamp::parse)
    }
}

/// Resolves a resource reference (`/fpr/api/v2/id-command/<uuid>/`) or a bare id to a rule id.
pub fn parse_reference(reference: &str) -> Result<RuleId, RecordError> {
    let segment = reference
        .split('?')
        .next()
        .unwrap_or_default()
        .split('/')
        .rev()
        .find(|segment| !segment.trim().is_empty())
        .ok_or_else(|| RecordError::InvalidReplaces(reference.to_string()))?;
    RuleId::try_new(segment).map_err(|_| RecordError::InvalidReplaces(reference.to_string()))
}

/// Orders one fetched batch for reconciliation: every record comes after the record it
/// replaces when both are in the batch. Otherwise oldest `last_modified` first, records
/// without a parseable timestamp leading in fetch order.
pub fn order_batch(mut records: Vec<RemoteRecord>) -> Vec<RemoteRecord> {
    records.sort_by_key(RemoteRecord::last_modified_at);

    let index = records
        .iter()
        .enumerate()
        .map(|(position, record)| (record.id.clone(), position))
        .collect::<HashMap<_, _>>();
    let mut placed = vec![false; records.len()];
    let mut on_path = vec![false; records.len()];
    let mut order = Vec::with_capacity(records.len());

    for start in 0..records.len() {
        // Climb to the oldest unplaced in-batch ancestor, then place the path root first.
        let mut path = Vec::new();
        let mut current = Some(start);
        while let Some(position) = current {
            if placed[position] || on_path[position] {
                break;
            }
            on_path[position] = true;
            path.push(position);
            current = records[position]
                .replaces
                .as_ref()
                .and_then(|target| index.get(target).copied());
        }
        for position in path.into_iter().rev() {
            on_path[position] = false;
            placed[position] = true;
            order.push(position);
        }
    }

    let mut slots = records.into_iter().map(Some).collect::<Vec<_>>();
    order
        .into_iter()
        .filter_map(|position| slots[position].take())
        .collect()
}
