//! Error types for the feed and the driver loop.

use thiserror::Error;

/// Errors from a [`BlockFeed`](crate::feed::BlockFeed) or dead-letter sink.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("feed serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("offset {offset} was never delivered")]
    UnknownOffset { offset: u64 },

    #[error("{0}")]
    Other(String),
}

/// Conditions that stop the driver loop without committing the current message.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("dead-letter sink rejected offset {offset}: {source}")]
    DeadLetter {
        offset: u64,
        #[source]
        source: FeedError,
    },
}
