#![forbid(unsafe_code)]

use std::fmt;

const MAX_RULE_ID_LEN: usize = 128;

/// Identity of a rule, shared by the local registry and the remote server (the remote `uuid`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleId(String);

impl RuleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, RuleIdError> {
        let value = value.into();
        let trimmed = value.trim();
        validate_rule_id(trimmed)?;
        if trimmed.len() == value.len() {
            Ok(Self(value))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleIdError {
    Empty,
    TooLong,
    ContainsSlash,
    ContainsControl,
}

impl RuleIdError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "rule id must not be empty",
            Self::TooLong => "rule id is too long",
            Self::ContainsSlash => "rule id must not contain '/'",
            Self::ContainsControl => "rule id contains control characters",
        }
    }
}

impl fmt::Display for RuleIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for RuleIdError {}

fn validate_rule_id(value: &str) -> Result<(), RuleIdError> {
    if value.is_empty() {
        return Err(RuleIdError::Empty);
    }
    if value.len() > MAX_RULE_ID_LEN {
        return Err(RuleIdError::TooLong);
    }
    if value.contains('/') {
        return Err(RuleIdError::ContainsSlash);
    }
    if value.chars().any(|c| c.is_control()) {
        return Err(RuleIdError::ContainsControl);
    }
    Ok(())
}
