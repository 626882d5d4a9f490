//! ChainBalance pipeline metrics.
//!
//! Every counter is an OpenTelemetry instrument, exported over OTLP when
//! [`MetricsExport`](crate::export::MetricsExport) is configured with an
//! endpoint. The same totals are mirrored in atomics so the CLI can print a
//! [`MetricsSnapshot`] at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

use chainbalance_core::BatchOutcome;
use chrono::{DateTime, Utc};
use opentelemetry::{
    global,
    metrics::{Counter, Meter},
    KeyValue,
};
use serde::{Deserialize, Serialize};

use crate::export::METER_NAME;

/// OpenTelemetry instruments for the pipeline.
#[derive(Clone)]
pub struct PipelineCounters {
    pub messages_processed: Counter<u64>,
    pub poison_messages: Counter<u64>,
    pub blocks_empty: Counter<u64>,
    pub batches_written: Counter<u64>,
    pub records_applied: Counter<u64>,
    pub records_stale: Counter<u64>,
    pub records_failed: Counter<u64>,
}

impl PipelineCounters {
    pub fn new(meter: &Meter) -> Self {
        Self {
            messages_processed: meter
                .u64_counter("chainbalance.messages_processed")
                .with_description("Feed messages pulled and handled")
                .build(),
            poison_messages: meter
                .u64_counter("chainbalance.poison_messages")
                .with_description("Payloads that failed to decode")
                .build(),
            blocks_empty: meter
                .u64_counter("chainbalance.blocks_empty")
                .with_description("Blocks without native-asset balance entries")
                .build(),
            batches_written: meter
                .u64_counter("chainbalance.batches_written")
                .with_description("Batches handed to the conditional writer")
                .build(),
            records_applied: meter
                .u64_counter("chainbalance.records_applied")
                .with_description("Balance writes accepted by the store")
                .build(),
            records_stale: meter
                .u64_counter("chainbalance.records_stale")
                .with_description("Balance writes rejected because the store was newer")
                .build(),
            records_failed: meter
                .u64_counter("chainbalance.records_failed")
                .with_description("Balance records that could not be converted or written")
                .build(),
        }
    }
}

#[derive(Debug, Default)]
struct Totals {
    messages_processed: AtomicU64,
    poison_messages: AtomicU64,
    blocks_empty: AtomicU64,
    batches_written: AtomicU64,
    records_applied: AtomicU64,
    records_stale: AtomicU64,
    records_failed: AtomicU64,
}

fn bump(total: &AtomicU64, counter: &Counter<u64>, n: u64, attrs: &[KeyValue]) {
    if n == 0 {
        return;
    }
    total.fetch_add(n, Ordering::Relaxed);
    counter.add(n, attrs);
}

/// Process-wide pipeline metrics, shared through an `Arc`.
pub struct SyncMetrics {
    started_at: DateTime<Utc>,
    counters: PipelineCounters,
    totals: Totals,
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::detached()
    }
}

impl SyncMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            started_at: Utc::now(),
            counters: PipelineCounters::new(meter),
            totals: Totals::default(),
        }
    }

    /// Metrics on the global meter. Without a registered provider the
    /// instruments are no-ops and only the snapshot is kept.
    pub fn detached() -> Self {
        Self::new(&global::meter(METER_NAME))
    }

    pub fn counters(&self) -> &PipelineCounters {
        &self.counters
    }

    pub fn record_message(&self) {
        bump(&self.totals.messages_processed, &self.counters.messages_processed, 1, &[]);
    }

    pub fn record_poison(&self, decoder: &str) {
        bump(
            &self.totals.poison_messages,
            &self.counters.poison_messages,
            1,
            &[KeyValue::new("decoder", decoder.to_string())],
        );
    }

    pub fn record_empty_block(&self) {
        bump(&self.totals.blocks_empty, &self.counters.blocks_empty, 1, &[]);
    }

    /// Fold one writer batch into the totals. Call only when the writer ran.
    pub fn record_batch(&self, outcome: &BatchOutcome) {
        let c = &self.counters;
        let t = &self.totals;
        bump(&t.batches_written, &c.batches_written, 1, &[]);
        bump(&t.records_applied, &c.records_applied, outcome.applied as u64, &[]);
        bump(&t.records_stale, &c.records_stale, outcome.rejected_stale as u64, &[]);
        bump(&t.records_failed, &c.records_failed, outcome.failed as u64, &[]);
    }

    /// Records that failed before reaching the writer (balance overflow,
    /// decimals out of range).
    pub fn record_unconvertible(&self, count: usize) {
        bump(
            &self.totals.records_failed,
            &self.counters.records_failed,
            count as u64,
            &[KeyValue::new("stage", "reconcile")],
        );
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let t = &self.totals;
        MetricsSnapshot {
            started_at: self.started_at,
            messages_processed: t.messages_processed.load(Ordering::Relaxed),
            poison_messages: t.poison_messages.load(Ordering::Relaxed),
            blocks_empty: t.blocks_empty.load(Ordering::Relaxed),
            batches_written: t.batches_written.load(Ordering::Relaxed),
            records_applied: t.records_applied.load(Ordering::Relaxed),
            records_stale: t.records_stale.load(Ordering::Relaxed),
            records_failed: t.records_failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SyncMetrics`] totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub started_at: DateTime<Utc>,
    pub messages_processed: u64,
    pub poison_messages: u64,
    pub blocks_empty: u64,
    pub batches_written: u64,
    pub records_applied: u64,
    pub records_stale: u64,
    pub records_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry_sdk::metrics::SdkMeterProvider;

    fn metrics() -> SyncMetrics {
        let provider = SdkMeterProvider::builder().build();
        SyncMetrics::new(&provider.meter("chainbalance-test"))
    }

    #[test]
    fn batches_accumulate() {
        let m = metrics();
        m.record_message();
        m.record_batch(&BatchOutcome {
            applied: 3,
            rejected_stale: 1,
            failed: 0,
        });
        m.record_batch(&BatchOutcome {
            applied: 0,
            rejected_stale: 2,
            failed: 1,
        });
        m.record_poison("bytes");

        let snap = m.snapshot();
        assert_eq!(snap.messages_processed, 1);
        assert_eq!(snap.batches_written, 2);
        assert_eq!(snap.records_applied, 3);
        assert_eq!(snap.records_stale, 3);
        assert_eq!(snap.records_failed, 1);
        assert_eq!(snap.poison_messages, 1);
    }

    #[test]
    fn unconvertible_records_do_not_count_as_batches() {
        let m = metrics();
        m.record_unconvertible(2);
        let snap = m.snapshot();
        assert_eq!(snap.records_failed, 2);
        assert_eq!(snap.batches_written, 0);
    }

    #[test]
    fn detached_metrics_still_snapshot() {
        let m = SyncMetrics::detached();
        m.record_empty_block();
        assert_eq!(m.snapshot().blocks_empty, 1);
    }

    #[test]
    fn snapshot_serializes() {
        let json = serde_json::to_value(metrics().snapshot()).unwrap();
        assert_eq!(json["records_applied"], 0);
        assert!(json["started_at"].is_string());
    }
}
