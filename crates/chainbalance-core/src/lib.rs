//! chainbalance-core: turns block balance updates into a monotonic
//! address → latest-balance table.
//!
//! # Architecture
//!
//! ```text
//! raw bytes ─► BlockDecoder (plain / byte-field wire variants)
//!                   │
//!                   ▼
//!              Block ─► Reconciler ─► ReconciledRecord × N
//!                        (native-asset filter,         │
//!                         max-tx-index dedup,          ▼
//!                         exact decimal codec)   ConditionalWriter
//!                                                (bounded fan-out)
//!                                                      │
//!                                                      ▼
//!                                        BalanceStore::put_if_newer
//!                                        (memory / file / SQLite / Postgres)
//! ```

pub mod codec;
pub mod error;
pub mod reconcile;
pub mod store;
pub mod types;
pub mod wire;
pub mod writer;

pub use codec::{
    bytes_to_uint, check_decimals, render_decimal, render_decimal_lossy, BalanceRendering,
    MAX_DECIMALS,
};
pub use error::{CodecError, DecodeError, StoreError, WriteFailure};
pub use reconcile::{normalize_address, EntryFailure, Reconciliation, Reconciler};
pub use store::{BalanceStore, MemoryBalanceStore, PutOutcome};
pub use types::{Asset, BalanceEntry, Block, PersistedItem, ReconciledRecord, Transaction};
pub use wire::{BlockDecoder, ByteFieldJsonDecoder, PlainJsonDecoder, WireFormat};
pub use writer::{BatchOutcome, ConditionalWriter, WriterConfig};

pub use alloy_primitives::U256;
