//! chainbalance-storage: durable backends for the balance table.
//!
//! Backends:
//! - [`file`]: JSON file on disk (local development)
//! - [`sqlite`]: SQLite via `sqlx` (feature `sqlite`)
//! - [`postgres`]: PostgreSQL via `sqlx` (feature `postgres`)
//!
//! The in-memory store lives in `chainbalance-core` next to the trait.
//! Every backend implements the write-if-newer condition inside a single
//! atomic operation of the underlying engine.

#[cfg(feature = "file")]
pub mod file;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

mod encoding;

#[cfg(feature = "file")]
pub use file::JsonFileStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStorage;
