//! Canonical block model and the records derived from it.
//!
//! Every wire variant is normalized into these shapes before reconciliation,
//! so the reconciler never sees encoding differences.

use alloy_primitives::U256;

// ─── Block ────────────────────────────────────────────────────────────────────

/// A decoded block, read-only to the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Block number (up to 256 bits).
    pub number: U256,
    /// Unix timestamp of the block (seconds since epoch).
    pub timestamp: i64,
    /// Transactions in block order.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Total number of balance entries across all transactions.
    pub fn entry_count(&self) -> usize {
        self.transactions.iter().map(|tx| tx.balances.len()).sum()
    }
}

/// A transaction and the post-transaction balances it touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Position of the transaction in its block; the dedup ordering key.
    pub index: u64,
    pub balances: Vec<BalanceEntry>,
}

/// One account balance observed after a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceEntry {
    /// Account address as delivered (normalized later by the reconciler).
    pub address: String,
    pub asset: Asset,
    /// Raw amount as a big-endian byte sequence.
    pub post_balance: Vec<u8>,
}

/// The asset a balance is denominated in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Asset {
    /// Token contract identifier; empty for the chain's native asset.
    pub contract_identifier: String,
    /// Power-of-ten divisor applied to the raw amount.
    pub decimals: u32,
}

impl Asset {
    /// The chain's base currency with the given precision.
    pub fn native(decimals: u32) -> Self {
        Self {
            contract_identifier: String::new(),
            decimals,
        }
    }

    /// Returns `true` if this is the native asset (no contract identifier).
    pub fn is_native(&self) -> bool {
        self.contract_identifier.trim().is_empty()
    }
}

// ─── Records ──────────────────────────────────────────────────────────────────

/// The latest balance for one address within one block.
///
/// Produced by the reconciler, consumed and dropped by the writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledRecord {
    /// Normalized address: lowercase, single `0x` prefix.
    pub address: String,
    pub block_number: U256,
    pub block_timestamp: i64,
    /// Exact decimal rendering of `post_balance / 10^decimals`.
    pub balance: String,
}

impl ReconciledRecord {
    /// Check the record is writable: an address with at least one hex digit.
    pub fn validate(&self) -> Result<(), String> {
        let body = self.address.strip_prefix("0x").unwrap_or(&self.address);
        if body.is_empty() {
            return Err("missing address".into());
        }
        if !body.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("address '{}' is not hex", self.address));
        }
        Ok(())
    }

    /// The item this record asks the store to hold.
    pub fn to_item(&self) -> PersistedItem {
        PersistedItem {
            address: self.address.clone(),
            block_number: self.block_number,
            block_timestamp: self.block_timestamp,
            balance: self.balance.clone(),
        }
    }
}

/// A stored row, keyed by `address`.
///
/// Across the write history of an address, `block_number` never decreases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedItem {
    pub address: String,
    pub block_number: U256,
    pub block_timestamp: i64,
    pub balance: String,
}

impl PersistedItem {
    /// Returns `true` if `self` may overwrite `existing` (strictly newer block).
    pub fn supersedes(&self, existing: &PersistedItem) -> bool {
        existing.block_number < self.block_number
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
