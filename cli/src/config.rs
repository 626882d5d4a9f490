//! YAML application config and store selection.
//!
//! ```yaml
//! store:
//!   backend: sqlite            # memory | file | sqlite | postgres
//!   url: ./balances.db
//!   table: latest_balances
//! feed:
//!   path: ./blocks.jsonl
//!   topic: ethereum.blocks
//!   group_id: balances
//!   dead_letter_path: ./dead.jsonl
//! wire_format: bytes           # bytes | plain
//! balance_rendering: exact     # exact | legacy_float
//! writer: { workers: 10, call_timeout_ms: 5000 }
//! pipeline: { drain_timeout_ms: 10000 }
//! log: { level: info, json: false }
//! telemetry: { otlp_endpoint: "http://localhost:4317" }
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chainbalance_core::{
    BalanceRendering, BalanceStore, MemoryBalanceStore, WireFormat, WriterConfig,
};
use chainbalance_observability::{LogConfig, TelemetryConfig};
use chainbalance_storage::postgres::PostgresOptions;
use chainbalance_storage::sqlite::DEFAULT_TABLE;
use chainbalance_storage::{JsonFileStore, PostgresStorage, SqliteStorage};
use chainbalance_stream::{FeedConfig, PipelineConfig};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Overrides `store.url` when set.
pub const STORE_URL_ENV: &str = "CHAINBALANCE_STORE_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// File path, SQLite path, or Postgres URL depending on `backend`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: None,
            table: default_table(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    pub feed: FeedConfig,
    #[serde(default)]
    pub wire_format: WireFormat,
    #[serde(default)]
    pub balance_rendering: BalanceRendering,
    #[serde(default)]
    pub writer: WriterConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Read the file, apply the environment override, and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config = Self::from_yaml(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.apply_store_url(std::env::var(STORE_URL_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn apply_store_url(&mut self, url: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.store.url = Some(url);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.backend != StoreBackend::Memory && self.store.url.is_none() {
            bail!(
                "store.url is required for the {:?} backend (or set {STORE_URL_ENV})",
                self.store.backend
            );
        }
        if self.writer.workers == 0 {
            bail!("writer.workers must be at least 1");
        }
        Ok(())
    }
}

/// Build the configured backend once; the pipeline only sees the trait.
pub async fn open_store(config: &StoreConfig, workers: usize) -> Result<Arc<dyn BalanceStore>> {
    let url = config.url.as_deref().unwrap_or_default();
    let store: Arc<dyn BalanceStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryBalanceStore::new()),
        StoreBackend::File => Arc::new(JsonFileStore::open(url).await?),
        StoreBackend::Sqlite => Arc::new(SqliteStorage::open(url, &config.table).await?),
        StoreBackend::Postgres => {
            let opts = PostgresOptions {
                max_connections: u32::try_from(workers).unwrap_or(u32::MAX).max(10),
                ..PostgresOptions::default()
            };
            Arc::new(PostgresStorage::connect(url, &config.table, opts).await?)
        }
    };
    info!(backend = store.name(), table = %config.table, "balance store ready");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
store:
  backend: sqlite
  url: /tmp/balances.db
  table: eth_balances
feed:
  path: /data/blocks.jsonl
  topic: ethereum.blocks
  group_id: balances
wire_format: plain
balance_rendering: legacy_float
writer:
  workers: 4
pipeline:
  drain_timeout_ms: 2500
log:
  level: debug
  components:
    chainbalance-core: trace
telemetry:
  otlp_endpoint: http://collector:4317
  export_interval_secs: 10
"#;

    #[test]
    fn parses_full_config() {
        let cfg = AppConfig::from_yaml(FULL).unwrap();
        assert_eq!(cfg.store.backend, StoreBackend::Sqlite);
        assert_eq!(cfg.store.table, "eth_balances");
        assert_eq!(cfg.feed.topic, "ethereum.blocks");
        assert_eq!(cfg.feed.group_id.as_deref(), Some("balances"));
        assert_eq!(cfg.wire_format, WireFormat::Plain);
        assert_eq!(cfg.balance_rendering, BalanceRendering::LegacyFloat);
        assert_eq!(cfg.writer.workers, 4);
        assert_eq!(cfg.writer.call_timeout_ms, 5_000);
        assert_eq!(cfg.pipeline.drain_timeout_ms, 2_500);
        assert_eq!(cfg.log.directives(), "debug,chainbalance_core=trace");
        assert_eq!(
            cfg.telemetry.otlp_endpoint.as_deref(),
            Some("http://collector:4317")
        );
        assert_eq!(cfg.telemetry.export_interval_secs, 10);
        cfg.validate().unwrap();
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = AppConfig::from_yaml("feed:\n  path: blocks.jsonl\n").unwrap();
        assert_eq!(cfg.store.backend, StoreBackend::Memory);
        assert_eq!(cfg.store.table, "latest_balances");
        assert_eq!(cfg.wire_format, WireFormat::Bytes);
        assert_eq!(cfg.balance_rendering, BalanceRendering::Exact);
        assert_eq!(cfg.writer.workers, 10);
        assert_eq!(cfg.pipeline.drain_timeout_ms, 10_000);
        assert_eq!(cfg.feed.dead_letter_path, None);
        assert_eq!(cfg.telemetry.otlp_endpoint, None);
        cfg.validate().unwrap();
    }

    #[test]
    fn durable_backend_needs_url() {
        let yaml = "store:\n  backend: postgres\nfeed:\n  path: b.jsonl\n";
        let mut cfg = AppConfig::from_yaml(yaml).unwrap();
        assert!(cfg.validate().is_err());

        cfg.apply_store_url(Some("  ".into()));
        assert!(cfg.validate().is_err());

        cfg.apply_store_url(Some("postgres://localhost/balances".into()));
        cfg.validate().unwrap();
        assert_eq!(cfg.store.url.as_deref(), Some("postgres://localhost/balances"));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(AppConfig::from_yaml("store:\n  backend: dynamo\nfeed:\n  path: b\n").is_err());
    }

    #[tokio::test]
    async fn opens_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            backend: StoreBackend::File,
            url: Some(dir.path().join("balances.json").display().to_string()),
            table: default_table(),
        };
        let store = open_store(&config, 10).await.unwrap();
        assert!(store.get("0xaa").await.unwrap().is_none());
    }
}
