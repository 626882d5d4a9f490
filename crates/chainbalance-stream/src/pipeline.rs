//! Pipeline driver: decode → reconcile → conditional write → commit.
//!
//! One message is in flight at a time. The writer fans out inside a batch,
//! but the next message is only pulled after the current one is committed.

use std::sync::Arc;
use std::time::Duration;

use chainbalance_core::{
    BatchOutcome, BlockDecoder, ConditionalWriter, Reconciler, Reconciliation, U256,
};
use chainbalance_observability::SyncMetrics;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::dead_letter::DeadLetterSink;
use crate::error::PipelineError;
use crate::feed::{BlockFeed, FeedMessage};

/// What happened to a single message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// The payload did not decode; it was logged (and diverted if a sink is set).
    Poison { reason: String },
    /// Decoded, but no native-asset entries. The store was not touched.
    Empty { block_number: U256 },
    /// Records were written; `outcome.failed` includes overflowed balances.
    Written {
        block_number: U256,
        outcome: BatchOutcome,
    },
}

/// Why [`Pipeline::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    FeedExhausted,
    Shutdown,
    /// Shutdown was requested and the in-flight block did not finish in time.
    /// Its offset was left uncommitted.
    DrainTimeout,
}

/// Totals for one call to [`Pipeline::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Messages committed, poison and empty ones included.
    pub messages: u64,
    pub poison: u64,
    pub empty_blocks: u64,
    pub totals: BatchOutcome,
    pub last_committed: Option<u64>,
    pub stop: StopReason,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            messages: 0,
            poison: 0,
            empty_blocks: 0,
            totals: BatchOutcome::default(),
            last_committed: None,
            stop: StopReason::FeedExhausted,
        }
    }

    fn absorb(&mut self, offset: u64, outcome: &MessageOutcome) {
        self.messages += 1;
        self.last_committed = Some(offset);
        match outcome {
            MessageOutcome::Poison { .. } => self.poison += 1,
            MessageOutcome::Empty { .. } => self.empty_blocks += 1,
            MessageOutcome::Written { outcome, .. } => self.totals.merge(*outcome),
        }
    }
}

/// Everything that handles a message except the feed itself.
struct Stages {
    decoder: Box<dyn BlockDecoder>,
    reconciler: Reconciler,
    writer: ConditionalWriter,
    metrics: Arc<SyncMetrics>,
    dead_letter: Option<Arc<dyn DeadLetterSink>>,
}

impl Stages {
    async fn process(&self, msg: &FeedMessage) -> Result<MessageOutcome, PipelineError> {
        self.metrics.record_message();

        let block = match self.decoder.decode(&msg.payload) {
            Ok(block) => block,
            Err(e) => {
                let reason = e.to_string();
                warn!(
                    partition = msg.partition,
                    offset = msg.offset,
                    decoder = self.decoder.name(),
                    error = %reason,
                    "undecodable message"
                );
                self.metrics.record_poison(self.decoder.name());
                if let Some(sink) = &self.dead_letter {
                    sink.divert(msg, &reason).await.map_err(|source| {
                        PipelineError::DeadLetter {
                            offset: msg.offset,
                            source,
                        }
                    })?;
                }
                return Ok(MessageOutcome::Poison { reason });
            }
        };

        let Reconciliation { records, failures } = self.reconciler.reconcile(&block);
        if records.is_empty() && failures.is_empty() {
            debug!(block = %block.number, offset = msg.offset, "no native balances in block");
            self.metrics.record_empty_block();
            return Ok(MessageOutcome::Empty {
                block_number: block.number,
            });
        }

        let mut outcome = BatchOutcome::default();
        if !records.is_empty() {
            outcome = self.writer.write_if_newer(records).await;
            self.metrics.record_batch(&outcome);
        }
        if !failures.is_empty() {
            self.metrics.record_unconvertible(failures.len());
            outcome.failed += failures.len();
        }

        Ok(MessageOutcome::Written {
            block_number: block.number,
            outcome,
        })
    }
}

enum Step {
    Done {
        result: Result<MessageOutcome, PipelineError>,
        then_stop: bool,
    },
    DrainExpired,
}

/// Resolves once shutdown has been signalled. A dropped sender never resolves.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Drives a [`BlockFeed`] through the balance pipeline.
pub struct Pipeline<F: BlockFeed> {
    feed: F,
    stages: Stages,
    config: PipelineConfig,
}

impl<F: BlockFeed> Pipeline<F> {
    pub fn new(
        feed: F,
        decoder: Box<dyn BlockDecoder>,
        reconciler: Reconciler,
        writer: ConditionalWriter,
    ) -> Self {
        Self {
            feed,
            stages: Stages {
                decoder,
                reconciler,
                writer,
                metrics: Arc::new(SyncMetrics::detached()),
                dead_letter: None,
            },
            config: PipelineConfig::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.stages.metrics = metrics;
        self
    }

    pub fn with_dead_letter(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.stages.dead_letter = Some(sink);
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.stages.metrics
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    pub fn into_feed(self) -> F {
        self.feed
    }

    /// Handle one message without committing it.
    pub async fn process(&self, msg: &FeedMessage) -> Result<MessageOutcome, PipelineError> {
        self.stages.process(msg).await
    }

    /// Consume the feed until it runs dry or `shutdown` flips to `true`.
    ///
    /// A message is committed only after its batch has fully completed.
    /// On shutdown the in-flight block gets `drain_timeout_ms` to finish;
    /// if it does not, the loop stops with its offset uncommitted.
    /// Feed and dead-letter errors stop the loop and are returned.
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunSummary, PipelineError> {
        let drain = Duration::from_millis(self.config.drain_timeout_ms);
        let mut summary = RunSummary::new();

        info!(
            topic = %self.feed.topic(),
            decoder = self.stages.decoder.name(),
            "pipeline started"
        );

        loop {
            if *shutdown.borrow() {
                summary.stop = StopReason::Shutdown;
                break;
            }

            let next = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => {
                    summary.stop = StopReason::Shutdown;
                    break;
                }
                next = self.feed.next_message() => next?,
            };
            let Some(msg) = next else {
                summary.stop = StopReason::FeedExhausted;
                break;
            };

            let step = {
                let work = self.stages.process(&msg);
                tokio::pin!(work);
                tokio::select! {
                    result = &mut work => Step::Done { result, then_stop: false },
                    _ = shutdown_requested(&mut shutdown) => {
                        info!(
                            offset = msg.offset,
                            drain_ms = self.config.drain_timeout_ms,
                            "shutdown requested, draining in-flight block"
                        );
                        match tokio::time::timeout(drain, &mut work).await {
                            Ok(result) => Step::Done { result, then_stop: true },
                            Err(_) => Step::DrainExpired,
                        }
                    }
                }
            };

            match step {
                Step::Done { result, then_stop } => {
                    let outcome = result?;
                    self.feed.commit(&msg).await?;
                    summary.absorb(msg.offset, &outcome);
                    if then_stop {
                        summary.stop = StopReason::Shutdown;
                        break;
                    }
                }
                Step::DrainExpired => {
                    warn!(offset = msg.offset, "drain timeout expired, offset left uncommitted");
                    summary.stop = StopReason::DrainTimeout;
                    break;
                }
            }
        }

        info!(
            messages = summary.messages,
            poison = summary.poison,
            empty = summary.empty_blocks,
            applied = summary.totals.applied,
            stale = summary.totals.rejected_stale,
            failed = summary.totals.failed,
            stop = ?summary.stop,
            "pipeline stopped"
        );
        Ok(summary)
    }
}
