//! JSON-file balance store for local development.
//!
//! The whole table is kept in memory and rewritten to disk after every
//! applied write (write to a temp file, then rename). Good enough for a
//! single process replaying a few thousand blocks; use SQLite or Postgres
//! for anything shared.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use chainbalance_core::{BalanceStore, PersistedItem, PutOutcome, StoreError};

use crate::encoding::parse_stored;

/// On-disk row. Block numbers are decimal strings so 256-bit values survive JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileRow {
    block_number: String,
    block_timestamp: i64,
    balance: String,
}

impl FileRow {
    fn from_item(item: &PersistedItem) -> Self {
        Self {
            block_number: item.block_number.to_string(),
            block_timestamp: item.block_timestamp,
            balance: item.balance.clone(),
        }
    }

    fn into_item(self, address: &str) -> Result<PersistedItem, StoreError> {
        let block_number = parse_stored(address, &self.block_number)?;
        Ok(PersistedItem {
            address: address.to_string(),
            block_number,
            block_timestamp: self.block_timestamp,
            balance: self.balance,
        })
    }
}

/// Balance table persisted as a pretty-printed JSON object keyed by address.
pub struct JsonFileStore {
    path: PathBuf,
    rows: Mutex<BTreeMap<String, FileRow>>,
}

impl JsonFileStore {
    /// Open the file at `path`, creating an empty table if it does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let rows = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), rows = rows.len(), "file store opened");
        Ok(Self {
            path,
            rows: Mutex::new(rows),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    async fn flush(&self, rows: &BTreeMap<String, FileRow>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(rows)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl BalanceStore for JsonFileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn put_if_newer(&self, item: &PersistedItem) -> Result<PutOutcome, StoreError> {
        // The lock covers check, update and flush, so the condition and the
        // write are one step for every caller in this process.
        let mut rows = self.rows.lock().await;
        if let Some(existing) = rows.get(&item.address) {
            let existing = existing.clone().into_item(&item.address)?;
            if !item.supersedes(&existing) {
                return Ok(PutOutcome::Stale);
            }
        }

        let previous = rows.insert(item.address.clone(), FileRow::from_item(item));
        if let Err(e) = self.flush(&rows).await {
            match previous {
                Some(row) => rows.insert(item.address.clone(), row),
                None => rows.remove(&item.address),
            };
            return Err(e);
        }
        Ok(PutOutcome::Applied)
    }

    async fn get(&self, address: &str) -> Result<Option<PersistedItem>, StoreError> {
        let rows = self.rows.lock().await;
        rows.get(address)
            .cloned()
            .map(|row| row.into_item(address))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainbalance_core::U256;

    fn item(address: &str, block: u64, balance: &str) -> PersistedItem {
        PersistedItem {
            address: address.into(),
            block_number: U256::from(block),
            block_timestamp: 1_700_000_000 + block as i64,
            balance: balance.into(),
        }
    }

    #[tokio::test]
    async fn conditional_write_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("balances.json");

        let store = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(
            store.put_if_newer(&item("0xaa", 5, "1.25")).await.unwrap(),
            PutOutcome::Applied
        );
        assert_eq!(store.put_if_newer(&item("0xaa", 5, "9")).await.unwrap(), PutOutcome::Stale);
        assert_eq!(store.put_if_newer(&item("0xaa", 4, "9")).await.unwrap(), PutOutcome::Stale);
        assert_eq!(store.put_if_newer(&item("0xbb", 1, "0")).await.unwrap(), PutOutcome::Applied);
        drop(store);

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.len().await, 2);
        let aa = reopened.get("0xaa").await.unwrap().unwrap();
        assert_eq!(aa.block_number, U256::from(5u64));
        assert_eq!(aa.balance, "1.25");
        assert_eq!(
            reopened.put_if_newer(&item("0xaa", 6, "2")).await.unwrap(),
            PutOutcome::Applied
        );
    }

    #[tokio::test]
    async fn stores_full_width_block_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("wide.json")).await.unwrap();
        let mut wide = item("0xcc", 0, "1");
        wide.block_number = U256::MAX;
        store.put_if_newer(&wide).await.unwrap();
        assert_eq!(store.get("0xcc").await.unwrap().unwrap().block_number, U256::MAX);
    }

    #[tokio::test]
    async fn missing_file_is_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("absent.json")).await.unwrap();
        assert_eq!(store.len().await, 0);
        assert!(store.get("0xaa").await.unwrap().is_none());
    }
}
