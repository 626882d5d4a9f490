//! Conditional writer: fans a batch of records out to the store.
//!
//! Each record becomes one `put_if_newer` call. Calls run concurrently, at
//! most `workers` at a time, and every call is classified:
//!
//! - `applied`: the store accepted the write
//! - `rejected_stale`: the store already holds the same or a newer block
//!   (normal under redelivery, never an error)
//! - `failed`: invalid record, backend error, or timeout
//!
//! The writer never retries; redelivery of the block plus the idempotent
//! write condition is the recovery path.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::WriteFailure;
use crate::store::{BalanceStore, PutOutcome};
use crate::types::ReconciledRecord;

/// Writer pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Maximum concurrent store calls per batch.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Per-call timeout in milliseconds; an expired call counts as `failed`.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_workers() -> usize {
    10
}

fn default_call_timeout_ms() -> u64 {
    5_000
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

/// Aggregate per-record outcomes for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub applied: usize,
    pub rejected_stale: usize,
    pub failed: usize,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.applied + self.rejected_stale + self.failed
    }

    /// Add another batch's counts to this one.
    pub fn merge(&mut self, other: BatchOutcome) {
        self.applied += other.applied;
        self.rejected_stale += other.rejected_stale;
        self.failed += other.failed;
    }

    fn record(&mut self, address: &str, result: Result<PutOutcome, WriteFailure>) {
        match result {
            Ok(PutOutcome::Applied) => self.applied += 1,
            Ok(PutOutcome::Stale) => self.rejected_stale += 1,
            Err(e) => {
                error!(%address, error = %e, "balance write failed");
                self.failed += 1;
            }
        }
    }
}

/// Persists reconciled records with the write-if-newer rule.
pub struct ConditionalWriter {
    store: Arc<dyn BalanceStore>,
    config: WriterConfig,
}

impl ConditionalWriter {
    pub fn new(store: Arc<dyn BalanceStore>, config: WriterConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn BalanceStore> {
        &self.store
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Write a batch and wait for every call to finish.
    ///
    /// An empty batch makes no store calls.
    pub async fn write_if_newer(&self, records: Vec<ReconciledRecord>) -> BatchOutcome {
        if records.is_empty() {
            return BatchOutcome::default();
        }

        let batch_size = records.len();
        let outcome = stream::iter(records)
            .map(|record| async move {
                let result = self.write_one(&record).await;
                (record.address, result)
            })
            .buffer_unordered(self.config.workers.max(1))
            .fold(BatchOutcome::default(), |mut acc, (address, result)| async move {
                acc.record(&address, result);
                acc
            })
            .await;

        info!(
            store = self.store.name(),
            batch_size,
            applied = outcome.applied,
            rejected_stale = outcome.rejected_stale,
            failed = outcome.failed,
            "batch write complete"
        );
        outcome
    }

    async fn write_one(&self, record: &ReconciledRecord) -> Result<PutOutcome, WriteFailure> {
        record.validate().map_err(WriteFailure::InvalidRecord)?;

        let item = record.to_item();
        let limit = Duration::from_millis(self.config.call_timeout_ms);
        match tokio::time::timeout(limit, self.store.put_if_newer(&item)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(WriteFailure::Timeout { ms: self.config.call_timeout_ms }),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
