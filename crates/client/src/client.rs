#![forbid(unsafe_code)]

use crate::config::ClientConfig;
use crate::error::{DecodeError, FetchError, PageError, SyncError};
use crate::fetch::{HttpTransport, PageQuery, RecordPages, Transport, parse_base_url};
use fpr_core::{RemoteRecord, RuleKind, Timestamp, order_batch};
use fpr_storage::{ReconcileOutcome, SqliteStore, StoreError};
use reqwest::Url;
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;

pub const MARKER_UNITTYPE: &str = "FPR";
pub const MARKER_VARIABLE: &str = "maxLastUpdate";

const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Failure,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub dangling: usize,
}

impl SyncStats {
    fn record(&mut self, outcome: &ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Inserted { dangling, .. } => {
                self.inserted += 1;
                if dangling.is_some() {
                    self.dangling += 1;
                }
            }
            ReconcileOutcome::Updated => self.updated += 1,
            ReconcileOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

/// Outcome of one synchronization run, reported as a single unit.
#[derive(Debug)]
pub struct SyncResult {
    pub status: SyncStatus,
    pub message: String,
    pub error: Option<SyncError>,
    pub stats: SyncStats,
    pub max_last_update: Option<String>,
}

impl SyncResult {
    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }

    pub fn to_json(&self) -> Value {
        json!({
            "status": self.status,
            "message": self.message,
            "error": self.error.as_ref().map(|err| err.to_string()),
            "stats": self.stats,
            "max_last_update": self.max_last_update,
        })
    }
}

pub struct FprClient<T: Transport> {
    transport: T,
    base: Url,
    limit: u32,
    retries: u32,
    retry_backoff: Duration,
    incremental: bool,
}

impl FprClient<HttpTransport> {
    pub fn from_config(config: &ClientConfig) -> Result<Self, FetchError> {
        let transport = HttpTransport::new(Duration::from_secs(config.timeout_s))?;
        Ok(FprClient::new(transport, &config.server)?
            .with_limit(config.limit)
            .with_retries(config.retries)
            .with_incremental(!config.full))
    }
}

impl<T: Transport> FprClient<T> {
    pub fn new(transport: T, server: &str) -> Result<Self, FetchError> {
        Ok(Self {
            transport,
            base: parse_base_url(server)?,
            limit: 0,
            retries: 0,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            incremental: true,
        })
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// When off, every run fetches full collections instead of filtering by the stored marker.
    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// A fresh lazy pass over one collection.
    pub fn each_record(
        &self,
        kind: RuleKind,
        modified_since: Option<&str>,
    ) -> Result<RecordPages<'_, T>, FetchError> {
        RecordPages::new(
            &self.transport,
            &self.base,
            kind,
            &PageQuery {
                limit: self.limit,
                modified_since: modified_since.map(str::to_string),
            },
        )
    }

    /// Fetches and decodes a whole collection in reconciliation order (see [`order_batch`]).
    ///
    /// Retryable fetch failures restart the collection from its first page.
    pub fn fetch_kind(
        &self,
        kind: RuleKind,
        modified_since: Option<&str>,
    ) -> Result<Vec<RemoteRecord>, PageError> {
        let mut attempt = 0u32;
        loop {
            match self.fetch_kind_once(kind, modified_since) {
                Ok(records) => return Ok(records),
                Err(err) if err.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(
                        kind = %kind,
                        attempt,
                        retries = self.retries,
                        error = %err,
                        "fetch failed; retrying collection"
                    );
                    if !self.retry_backoff.is_zero() {
                        std::thread::sleep(self.retry_backoff.saturating_mul(attempt));
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn fetch_kind_once(
        &self,
        kind: RuleKind,
        modified_since: Option<&str>,
    ) -> Result<Vec<RemoteRecord>, PageError> {
        let mut records = Vec::new();
        for fields in self.each_record(kind, modified_since)? {
            let record = RemoteRecord::from_json(kind, Value::Object(fields?))
                .map_err(|source| DecodeError::Record { kind, source })?;
            records.push(record);
        }
        Ok(order_batch(records))
    }

    /// Pulls every collection and merges it into `store`. Never panics; failures come back
    /// as a `Failure` result with the triggering error attached.
    pub fn synchronize(&self, store: &mut SqliteStore) -> SyncResult {
        let mut stats = SyncStats::default();
        match self.run(store, &mut stats) {
            Ok(max_last_update) => {
                let message = format!(
                    "FPR updated: {} inserted, {} updated, {} unchanged",
                    stats.inserted, stats.updated, stats.unchanged
                );
                tracing::info!(
                    fetched = stats.fetched,
                    inserted = stats.inserted,
                    updated = stats.updated,
                    unchanged = stats.unchanged,
                    dangling = stats.dangling,
                    max_last_update = max_last_update.as_deref().unwrap_or(""),
                    "synchronization finished"
                );
                SyncResult {
                    status: SyncStatus::Success,
                    message,
                    error: None,
                    stats,
                    max_last_update,
                }
            }
            Err((kind, err)) => {
                let message = match kind {
                    Some(kind) => format!("FPR update failed while syncing {kind}: {err}"),
                    None => format!("FPR update failed: {err}"),
                };
                tracing::error!(error = %err, "{message}");
                SyncResult {
                    status: SyncStatus::Failure,
                    message,
                    error: Some(err),
                    stats,
                    max_last_update: None,
                }
            }
        }
    }

    fn run(
        &self,
        store: &mut SqliteStore,
        stats: &mut SyncStats,
    ) -> Result<Option<String>, (Option<RuleKind>, SyncError)> {
        let stored_marker = store
            .unit_variable(MARKER_UNITTYPE, MARKER_VARIABLE)
            .map_err(|err| (None, SyncError::from(err)))?;
        let modified_since = if self.incremental {
            Some(
                stored_marker
                    .clone()
                    .unwrap_or_else(|| Timestamp::epoch().to_marker()),
            )
        } else {
            None
        };
        let mut newest = stored_marker.as_deref().and_then(Timestamp::parse);

        for kind in RuleKind::ALL {
            let records = self
                .fetch_kind(kind, modified_since.as_deref())
                .map_err(|err| (Some(kind), SyncError::from(err)))?;
            tracing::info!(kind = %kind, records = records.len(), "fetched collection");
            stats.fetched += records.len();

            for record in &records {
                let outcome = store.reconcile_record(kind, record).map_err(|err| {
                    tracing::error!(
                        kind = %kind,
                        id = %record.id,
                        error = %err,
                        "failed to reconcile record"
                    );
                    (Some(kind), reconcile_error(kind, record, err))
                })?;
                tracing::debug!(kind = %kind, id = %record.id, ?outcome, "reconciled record");
                stats.record(&outcome);
                newest = newest.max(record.last_modified_at());
            }
        }

        let marker = newest.map(|timestamp| timestamp.to_marker());
        if let Some(value) = marker.as_deref() {
            if stored_marker.as_deref() != Some(value) {
                store
                    .set_unit_variable(MARKER_UNITTYPE, MARKER_VARIABLE, value)
                    .map_err(|err| (None, SyncError::from(err)))?;
            }
        }
        Ok(marker)
    }
}

fn reconcile_error(kind: RuleKind, record: &RemoteRecord, err: StoreError) -> SyncError {
    match err {
        StoreError::Chain(source) => SyncError::Reconciliation {
            kind,
            id: record.id.clone(),
            source,
        },
        other => SyncError::Persistence(other),
    }
}
