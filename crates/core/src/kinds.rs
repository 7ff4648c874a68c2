#![forbid(unsafe_code)]

use std::fmt;

/// Which chain-relevant fields a rule kind carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub enabled: bool,
    pub replaces: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleKind {
    Format,
    FormatVersion,
    IdTool,
    IdCommand,
    IdRule,
    FpTool,
    FpCommand,
    FpRule,
}

impl RuleKind {
    /// Synchronization order: every kind comes after the kinds its records point at.
    pub const ALL: [RuleKind; 8] = [
        RuleKind::Format,
        RuleKind::FormatVersion,
        RuleKind::IdTool,
        RuleKind::IdCommand,
        RuleKind::IdRule,
        RuleKind::FpTool,
        RuleKind::FpCommand,
        RuleKind::FpRule,
    ];

    /// Resource slug on the registry server and the `kind` column locally.
    pub fn as_str(self) -> &'static str {
        match self {
            RuleKind::Format => "format",
            RuleKind::FormatVersion => "format-version",
            RuleKind::IdTool => "id-tool",
            RuleKind::IdCommand => "id-command",
            RuleKind::IdRule => "id-rule",
            RuleKind::FpTool => "fp-tool",
            RuleKind::FpCommand => "fp-command",
            RuleKind::FpRule => "fp-rule",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    pub fn capabilities(self) -> Capabilities {
        match self {
            RuleKind::Format => Capabilities {
                enabled: false,
                replaces: false,
            },
            RuleKind::IdTool | RuleKind::FpTool => Capabilities {
                enabled: true,
                replaces: false,
            },
            RuleKind::FormatVersion
            | RuleKind::IdCommand
            | RuleKind::IdRule
            | RuleKind::FpCommand
            | RuleKind::FpRule => Capabilities {
                enabled: true,
                replaces: true,
            },
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip_through_slug() {
        for kind in RuleKind::ALL {
            assert_eq!(RuleKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(RuleKind::parse("id_command"), None);
    }

    #[test]
    fn only_versioned_kinds_form_chains() {
        let chained = RuleKind::ALL
            .into_iter()
            .filter(|kind| kind.capabilities().replaces)
            .collect::<Vec<_>>();
        assert_eq!(
            chained,
            vec![
                RuleKind::FormatVersion,
                RuleKind::IdCommand,
                RuleKind::IdRule,
                RuleKind::FpCommand,
                RuleKind::FpRule,
            ]
        );
        assert!(!RuleKind::Format.capabilities().enabled);
    }
}
