#![forbid(unsafe_code)]

use fpr_core::{RuleId, RuleKind};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleOrigin {
    /// Authored by an operator on this install.
    Local,
    /// Inserted by synchronization with the registry.
    Remote,
}

impl RuleOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleOrigin::Local => "local",
            RuleOrigin::Remote => "remote",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "local" => Some(RuleOrigin::Local),
            "remote" => Some(RuleOrigin::Remote),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RuleRow {
    pub kind: RuleKind,
    pub id: RuleId,
    pub enabled: bool,
    pub replaces: Option<RuleId>,
    pub last_modified: Option<String>,
    pub payload: Map<String, Value>,
    pub origin: RuleOrigin,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Inserted {
        enabled: bool,
        replaces: Option<RuleId>,
        relinked: Option<RuleId>,
        dangling: Option<RuleId>,
    },
    Updated,
    Unchanged,
}
