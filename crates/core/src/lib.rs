#![forbid(unsafe_code)]

pub mod chain;
pub mod ids;
pub mod kinds;
pub mod record;
pub mod timestamp;

pub use chain::{
    ChainError, ChainLookup, ChainRule, LocalReplacementPlan, MAX_CHAIN_DEPTH, ReconcilePlan,
    plan_local_replacement, plan_reconcile,
};
pub use ids::{RuleId, RuleIdError};
pub use kinds::{Capabilities, RuleKind};
pub use record::{RecordError, RemoteRecord, order_batch};
pub use timestamp::Timestamp;
