//! # chainbalance-stream
//!
//! Pulls block messages from a feed and drives them through the balance
//! pipeline, one message at a time.
//!
//! ## Architecture
//! ```text
//! BlockFeed::next_message
//!       │
//!       ▼
//! BlockDecoder ──(decode error)──► DeadLetterSink (optional) ─┐
//!       │                                                     │
//!       ▼                                                     │
//! Reconciler ─► ConditionalWriter (bounded fan-out, waits)    │
//!       │                                                     │
//!       ▼                                                     ▼
//! BlockFeed::commit  ◄────────────────────────────────────────┘
//! ```
//!
//! Message N+1 is not pulled before message N is committed. A crash
//! before the commit redelivers the block, which the write-if-newer rule
//! makes harmless.

pub mod config;
pub mod dead_letter;
pub mod error;
pub mod feed;
pub mod pipeline;

pub use config::{FeedConfig, PipelineConfig};
pub use dead_letter::{DeadLetterSink, JsonLinesDeadLetter, MemoryDeadLetter};
pub use error::{FeedError, PipelineError};
pub use feed::{BlockFeed, FeedMessage, JsonLinesFeed, MemoryFeed};
pub use pipeline::{MessageOutcome, Pipeline, RunSummary, StopReason};
