#![forbid(unsafe_code)]

use fpr_core::{ChainError, RecordError, RuleId, RuleKind};
use fpr_storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

impl FetchError {
    /// Transport failures and server-side errors may succeed on a fresh attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidUrl { .. } => false,
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("page {url} is not valid JSON: {reason}")]
    Json { url: String, reason: String },
    #[error("page {url} has no objects array")]
    MissingObjects { url: String },
    #[error("invalid next link {next:?} on page {url}")]
    InvalidNext { url: String, next: String },
    #[error("invalid {kind} record: {source}")]
    Record {
        kind: RuleKind,
        #[source]
        source: RecordError,
    },
}

/// Failure while reading one page of a collection.
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl PageError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(err) => err.is_retryable(),
            Self::Decode(_) => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("fetch error: {0}")]
    Fetch(FetchError),
    #[error("decode error: {0}")]
    Decode(DecodeError),
    #[error("reconciliation error for {kind} {id}: {source}")]
    Reconciliation {
        kind: RuleKind,
        id: RuleId,
        #[source]
        source: ChainError,
    },
    #[error("persistence error: {0}")]
    Persistence(#[source] StoreError),
}

impl From<PageError> for SyncError {
    fn from(value: PageError) -> Self {
        match value {
            PageError::Fetch(err) => Self::Fetch(err),
            PageError::Decode(err) => Self::Decode(err),
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(value: StoreError) -> Self {
        Self::Persistence(value)
    }
}
