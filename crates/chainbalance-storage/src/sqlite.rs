//! SQLite balance store.
//!
//! One row per address. The write-if-newer rule is a single
//! `INSERT … ON CONFLICT DO UPDATE … WHERE` statement, so SQLite evaluates
//! the condition and applies the row atomically. A statement that touches
//! zero rows means the stored block was the same or newer.
//!
//! Block numbers are stored as 78-digit zero-padded text: SQLite integers
//! stop at 64 bits, and padded text compares in numeric order.
//!
//! # Usage
//! ```rust,no_run
//! use chainbalance_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStorage::open("./balances.db", "latest_balances").await?;
//! let scratch = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use chainbalance_core::{BalanceStore, PersistedItem, PutOutcome, StoreError};

use crate::encoding::{check_table_name, parse_stored, to_sortable};

/// Default table name.
pub const DEFAULT_TABLE: &str = "latest_balances";

fn storage_err(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// SQLite-backed balance table.
pub struct SqliteStorage {
    pool: SqlitePool,
    upsert_sql: String,
    select_sql: String,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./balances.db"`) or a full
    /// SQLite URL (`"sqlite:./balances.db?mode=rwc"`).
    pub async fn open(path: &str, table: &str) -> Result<Self, StoreError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        Self::with_pool(pool, table).await
    }

    /// Open an in-memory SQLite database.
    ///
    /// The pool is capped at one connection: each `:memory:` connection is
    /// a separate database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;
        Self::with_pool(pool, DEFAULT_TABLE).await
    }

    async fn with_pool(pool: SqlitePool, table: &str) -> Result<Self, StoreError> {
        check_table_name(table)?;
        let storage = Self {
            pool,
            upsert_sql: format!(
                "INSERT INTO {table} (address, block_number, block_timestamp, balance)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT (address) DO UPDATE SET
                    block_number    = excluded.block_number,
                    block_timestamp = excluded.block_timestamp,
                    balance         = excluded.balance
                 WHERE excluded.block_number > {table}.block_number"
            ),
            select_sql: format!(
                "SELECT address, block_number, block_timestamp, balance
                 FROM {table} WHERE address = ?"
            ),
        };
        storage.init_schema(table).await?;
        Ok(storage)
    }

    async fn init_schema(&self, table: &str) -> Result<(), StoreError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                address         TEXT    NOT NULL PRIMARY KEY,
                block_number    TEXT    NOT NULL,
                block_timestamp INTEGER NOT NULL,
                balance         TEXT    NOT NULL
            );"
        ))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }
}

#[async_trait]
impl BalanceStore for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn put_if_newer(&self, item: &PersistedItem) -> Result<PutOutcome, StoreError> {
        let result = sqlx::query(&self.upsert_sql)
            .bind(&item.address)
            .bind(to_sortable(item.block_number))
            .bind(item.block_timestamp)
            .bind(&item.balance)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            debug!(address = %item.address, block = %item.block_number, "stale write skipped");
            Ok(PutOutcome::Stale)
        } else {
            Ok(PutOutcome::Applied)
        }
    }

    async fn get(&self, address: &str) -> Result<Option<PersistedItem>, StoreError> {
        let row = sqlx::query(&self.select_sql)
            .bind(address)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.map(|r| {
            let block_number: String = r.get("block_number");
            Ok(PersistedItem {
                address: r.get("address"),
                block_number: parse_stored(address, &block_number)?,
                block_timestamp: r.get("block_timestamp"),
                balance: r.get("balance"),
            })
        })
        .transpose()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chainbalance_core::U256;
    use std::sync::Arc;

    fn item(address: &str, block: u64, balance: &str) -> PersistedItem {
        PersistedItem {
            address: address.into(),
            block_number: U256::from(block),
            block_timestamp: 1_700_000_000 + block as i64,
            balance: balance.into(),
        }
    }

    #[tokio::test]
    async fn insert_then_stale_then_newer() {
        let store = SqliteStorage::in_memory().await.unwrap();

        assert_eq!(store.put_if_newer(&item("0xaa", 10, "1")).await.unwrap(), PutOutcome::Applied);
        assert_eq!(store.put_if_newer(&item("0xaa", 10, "2")).await.unwrap(), PutOutcome::Stale);
        assert_eq!(store.put_if_newer(&item("0xaa", 9, "3")).await.unwrap(), PutOutcome::Stale);
        assert_eq!(store.put_if_newer(&item("0xaa", 11, "4")).await.unwrap(), PutOutcome::Applied);

        let stored = store.get("0xaa").await.unwrap().unwrap();
        assert_eq!(stored.block_number, U256::from(11u64));
        assert_eq!(stored.block_timestamp, 1_700_000_011);
        assert_eq!(stored.balance, "4");
    }

    #[tokio::test]
    async fn compares_numerically_not_by_digit_count() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.put_if_newer(&item("0xbb", 100, "a")).await.unwrap();
        // "99" > "100" as unpadded text; padded text must still reject it.
        assert_eq!(store.put_if_newer(&item("0xbb", 99, "b")).await.unwrap(), PutOutcome::Stale);
        assert_eq!(
            store.put_if_newer(&item("0xbb", 1_000, "c")).await.unwrap(),
            PutOutcome::Applied
        );
    }

    #[tokio::test]
    async fn full_width_block_number_roundtrip() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let mut wide = item("0xcc", 0, "1");
        wide.block_number = U256::MAX;
        store.put_if_newer(&wide).await.unwrap();
        assert_eq!(store.get("0xcc").await.unwrap().unwrap().block_number, U256::MAX);
        assert_eq!(
            store.put_if_newer(&item("0xcc", u64::MAX, "2")).await.unwrap(),
            PutOutcome::Stale
        );
    }

    #[tokio::test]
    async fn missing_address_returns_none() {
        let store = SqliteStorage::in_memory().await.unwrap();
        assert!(store.get("0xdead").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_writers_converge_on_max_block() {
        let store = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let mut handles = Vec::new();
        for block in [4u64, 12, 7, 10, 1, 12, 3] {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.put_if_newer(&item("0xdd", block, &block.to_string())).await.unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let stored = store.get("0xdd").await.unwrap().unwrap();
        assert_eq!(stored.block_number, U256::from(12u64));
        assert_eq!(stored.balance, "12");
    }

    #[tokio::test]
    async fn file_backed_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("balances.db");
        let path = path.to_str().unwrap();

        let store = SqliteStorage::open(path, "balances_v1").await.unwrap();
        store.put_if_newer(&item("0xee", 5, "0.5")).await.unwrap();
        drop(store);

        let reopened = SqliteStorage::open(path, "balances_v1").await.unwrap();
        assert_eq!(reopened.get("0xee").await.unwrap().unwrap().balance, "0.5");
    }
}
