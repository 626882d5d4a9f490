//! Balance reconciler: one record per address per block.
//!
//! For every address, the balance entry from the highest transaction index
//! wins. When two entries share an index, the one scanned later wins.
//! Entries carrying a contract identifier (token balances) are ignored.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::{debug, warn};

use crate::codec::{bytes_to_uint, check_decimals, BalanceRendering};
use crate::error::CodecError;
use crate::types::{BalanceEntry, Block, ReconciledRecord};

/// Lowercase an address and give it exactly one `0x` prefix.
pub fn normalize_address(raw: &str) -> String {
    let lower = raw.trim().to_ascii_lowercase();
    let body = lower.strip_prefix("0x").unwrap_or(&lower);
    format!("0x{body}")
}

/// An address whose selected balance could not be converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFailure {
    pub address: String,
    pub error: CodecError,
}

/// Output of reconciling one block.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// At most one record per address; order is unspecified.
    pub records: Vec<ReconciledRecord>,
    /// Addresses dropped because their balance overflowed or their decimals were out of range.
    pub failures: Vec<EntryFailure>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.failures.is_empty()
    }
}

/// Reduces a block to its latest native-asset balance per address.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    rendering: BalanceRendering,
}

impl Reconciler {
    pub fn new(rendering: BalanceRendering) -> Self {
        Self { rendering }
    }

    pub fn rendering(&self) -> BalanceRendering {
        self.rendering
    }

    pub fn reconcile(&self, block: &Block) -> Reconciliation {
        // normalized address → (max tx index, selected entry)
        let mut latest: HashMap<String, (u64, &BalanceEntry)> = HashMap::new();

        for tx in &block.transactions {
            for entry in &tx.balances {
                if !entry.asset.is_native() {
                    continue;
                }
                let address = normalize_address(&entry.address);
                match latest.entry(address) {
                    Entry::Occupied(mut slot) => {
                        if tx.index >= slot.get().0 {
                            slot.insert((tx.index, entry));
                        }
                    }
                    Entry::Vacant(slot) => {
                        slot.insert((tx.index, entry));
                    }
                }
            }
        }

        let mut out = Reconciliation::default();
        for (address, (_, entry)) in latest {
            let converted = check_decimals(entry.asset.decimals)
                .and_then(|()| bytes_to_uint(&entry.post_balance));
            match converted {
                Ok(amount) => out.records.push(ReconciledRecord {
                    balance: self.rendering.render(amount, entry.asset.decimals),
                    address,
                    block_number: block.number,
                    block_timestamp: block.timestamp,
                }),
                Err(error) => {
                    warn!(%address, block = %block.number, %error, "balance not convertible");
                    out.failures.push(EntryFailure { address, error });
                }
            }
        }

        debug!(
            block = %block.number,
            entries = block.entry_count(),
            records = out.records.len(),
            failures = out.failures.len(),
            "block reconciled"
        );
        out
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
