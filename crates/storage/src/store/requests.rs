#![forbid(unsafe_code)]

use fpr_core::RuleKind;
use serde_json::{Map, Value};

/// Direct insert of an operator-authored rule; stored exactly as given.
#[derive(Clone, Debug)]
pub struct InsertRuleRequest {
    pub kind: RuleKind,
    pub id: String,
    pub enabled: bool,
    pub replaces: Option<String>,
    pub last_modified: Option<String>,
    pub payload: Map<String, Value>,
}

/// Operator-authored replacement: the new rule becomes the enabled tail after `replacing`.
#[derive(Clone, Debug)]
pub struct ReplaceRuleRequest {
    pub kind: RuleKind,
    pub id: String,
    pub replacing: String,
    pub last_modified: Option<String>,
    pub payload: Map<String, Value>,
}
