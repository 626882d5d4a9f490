//! Error types for the reconciliation and write pipeline.

use thiserror::Error;

/// Errors raised by the numeric codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("integer is {len} bytes wide, limit is 32")]
    TooWide { len: usize },

    #[error("decimals exponent {decimals} is out of range, limit is 255")]
    DecimalsOutOfRange { decimals: u32 },
}

/// Errors raised while decoding a wire message into a [`Block`](crate::types::Block).
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("field '{field}' is not valid hex: {reason}")]
    Hex { field: &'static str, reason: String },

    #[error("field '{field}': {source}")]
    Integer {
        field: &'static str,
        #[source]
        source: CodecError,
    },
}

/// Errors returned by a [`BalanceStore`](crate::store::BalanceStore) backend.
///
/// A failed write condition is *not* an error; see
/// [`PutOutcome::Stale`](crate::store::PutOutcome::Stale).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("corrupt stored item for '{address}': {reason}")]
    Corrupt { address: String, reason: String },
}

/// Why a single record ended up in the `failed` bucket of a batch.
#[derive(Debug, Error)]
pub enum WriteFailure {
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("store call timed out after {ms}ms")]
    Timeout { ms: u64 },
}

impl WriteFailure {
    /// Returns `true` if the record never reached the store.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidRecord(_))
    }
}
