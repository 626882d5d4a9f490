//! # chainbalance-observability
//!
//! OpenTelemetry metrics and structured logging for the balance pipeline.
//!
//! ## Built-in metrics
//! - `chainbalance.messages_processed`: counter
//! - `chainbalance.poison_messages`: counter, tagged with decoder
//! - `chainbalance.blocks_empty`: counter
//! - `chainbalance.batches_written`: counter
//! - `chainbalance.records_applied` / `records_stale` / `records_failed`: counters
//!
//! Exported over OTLP when `otlp_endpoint` is set; a [`MetricsSnapshot`] of
//! the same totals is always available.
//!
//! ## Structured logging
//! Text or JSON logs through `tracing-subscriber`, with per-component levels.

pub mod export;
pub mod metrics;
pub mod tracing_setup;

pub use export::{MetricsExport, TelemetryConfig, TelemetryError};
pub use metrics::{MetricsSnapshot, PipelineCounters, SyncMetrics};
pub use tracing_setup::{init_tracing, LogConfig};
