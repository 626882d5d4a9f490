//! Balance store abstraction.
//!
//! A store holds one [`PersistedItem`] per address and must evaluate the
//! "strictly newer block" condition atomically with the write itself.
//! Reading the row first and writing afterwards is not a valid
//! implementation: a concurrent writer could land in between.
//!
//! Implementations: [`MemoryBalanceStore`] here, plus the file, SQLite and
//! Postgres backends in `chainbalance-storage`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::PersistedItem;

/// Result of a conditional write that reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// No prior item, or the prior item was from an older block.
    Applied,
    /// The stored item is from the same or a newer block; nothing changed.
    Stale,
}

/// Keyed store with an atomic write-if-newer primitive.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Backend name for logs (e.g. `"sqlite"`).
    fn name(&self) -> &str;

    /// Write `item` iff no item exists for its address or the existing
    /// item's block number is strictly lower.
    async fn put_if_newer(&self, item: &PersistedItem) -> Result<PutOutcome, StoreError>;

    /// Fetch the current item for an address.
    async fn get(&self, address: &str) -> Result<Option<PersistedItem>, StoreError>;
}

// ─── In-memory store (dev / tests) ────────────────────────────────────────────

/// In-memory balance store. All data is lost when the process exits.
#[derive(Default)]
pub struct MemoryBalanceStore {
    items: Mutex<HashMap<String, PersistedItem>>,
}

impl MemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored addresses.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.items.lock().map_err(poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("memory store lock poisoned".into())
}

#[async_trait]
impl BalanceStore for MemoryBalanceStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put_if_newer(&self, item: &PersistedItem) -> Result<PutOutcome, StoreError> {
        let mut items = self.items.lock().map_err(poisoned)?;
        if let Some(existing) = items.get(&item.address) {
            if !item.supersedes(existing) {
                return Ok(PutOutcome::Stale);
            }
        }
        items.insert(item.address.clone(), item.clone());
        Ok(PutOutcome::Applied)
    }

    async fn get(&self, address: &str) -> Result<Option<PersistedItem>, StoreError> {
        Ok(self.items.lock().map_err(poisoned)?.get(address).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use std::sync::Arc;

    fn item(block: u64, balance: &str) -> PersistedItem {
        PersistedItem {
            address: "0xabc".into(),
            block_number: U256::from(block),
            block_timestamp: block as i64 * 12,
            balance: balance.into(),
        }
    }

    #[tokio::test]
    async fn first_write_applies() {
        let store = MemoryBalanceStore::new();
        assert_eq!(store.put_if_newer(&item(10, "1")).await.unwrap(), PutOutcome::Applied);
        assert_eq!(store.get("0xabc").await.unwrap().unwrap().balance, "1");
    }

    #[tokio::test]
    async fn same_or_older_block_is_stale() {
        let store = MemoryBalanceStore::new();
        store.put_if_newer(&item(10, "1")).await.unwrap();
        assert_eq!(store.put_if_newer(&item(10, "2")).await.unwrap(), PutOutcome::Stale);
        assert_eq!(store.put_if_newer(&item(9, "3")).await.unwrap(), PutOutcome::Stale);
        assert_eq!(store.get("0xabc").await.unwrap().unwrap().balance, "1");
    }

    #[tokio::test]
    async fn newer_block_overwrites() {
        let store = MemoryBalanceStore::new();
        store.put_if_newer(&item(10, "1")).await.unwrap();
        assert_eq!(store.put_if_newer(&item(11, "5")).await.unwrap(), PutOutcome::Applied);
        let stored = store.get("0xabc").await.unwrap().unwrap();
        assert_eq!(stored.block_number, U256::from(11u64));
        assert_eq!(stored.balance, "5");
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn poisoned_lock_is_an_error() {
        let store = Arc::new(MemoryBalanceStore::new());
        let holder = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = holder.items.lock().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        assert!(matches!(store.len(), Err(StoreError::Backend(_))));
        assert!(store.is_empty().is_err());
    }
}
