//! ChainBalance CLI: run the balance pipeline and inspect its output.
//!
//! # Commands
//! ```
//! chainbalance run    --config <chainbalance.yaml>
//! chainbalance lookup --config <chainbalance.yaml> <address>
//! chainbalance render <amount> <decimals> [--legacy]
//! chainbalance info
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chainbalance_core::{
    check_decimals, normalize_address, render_decimal, render_decimal_lossy, ConditionalWriter,
    Reconciler, U256,
};
use chainbalance_observability::{init_tracing, LogConfig, MetricsExport, SyncMetrics};
use chainbalance_stream::{JsonLinesDeadLetter, JsonLinesFeed, Pipeline};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

mod config;

use config::{open_store, AppConfig, STORE_URL_ENV};

#[derive(Parser)]
#[command(
    name = "chainbalance",
    about = "Latest native-asset balance per address, from a block feed",
    long_about = "
ChainBalance CLI: consume block updates, keep the newest native balance per
address, and query the result.

ENVIRONMENT VARIABLES:
  CHAINBALANCE_STORE_URL   Overrides store.url from the config file
  RUST_LOG                 Overrides the configured log levels
",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume the configured feed until it is exhausted or a signal arrives
    Run {
        /// Path to the YAML config file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print the stored balance for one address
    Lookup {
        #[arg(short, long)]
        config: PathBuf,
        /// Address, with or without 0x, any case
        address: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a raw integer amount as a decimal string
    Render {
        /// Unsigned decimal integer, up to 2^256 - 1
        amount: String,
        decimals: u32,
        /// Use the lossy float rendering instead of the exact one
        #[arg(long)]
        legacy: bool,
    },

    /// Show defaults and available backends
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => cmd_run(&config).await,
        Commands::Lookup { config, address, json } => cmd_lookup(&config, &address, json).await,
        Commands::Render { amount, decimals, legacy } => {
            println!("{}", render_amount(&amount, decimals, legacy)?);
            Ok(())
        }
        Commands::Info => {
            cmd_info();
            Ok(())
        }
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn cmd_run(path: &Path) -> Result<()> {
    let cfg = AppConfig::load(path)?;
    init_tracing(&cfg.log);

    let store = open_store(&cfg.store, cfg.writer.workers).await?;
    let writer = ConditionalWriter::new(store, cfg.writer.clone());
    let feed = JsonLinesFeed::open(&cfg.feed.path, cfg.feed.topic.clone())
        .await
        .with_context(|| format!("opening feed {}", cfg.feed.path.display()))?;
    let export = MetricsExport::init(&cfg.telemetry)?;
    let metrics = Arc::new(SyncMetrics::new(&export.meter()));

    let mut pipeline = Pipeline::new(
        feed,
        cfg.wire_format.decoder(),
        Reconciler::new(cfg.balance_rendering),
        writer,
    )
    .with_metrics(metrics.clone())
    .with_config(cfg.pipeline.clone());
    if let Some(dead_letter) = &cfg.feed.dead_letter_path {
        pipeline = pipeline.with_dead_letter(Arc::new(JsonLinesDeadLetter::new(dead_letter)));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => warn!(error = %e, "signal handler failed, stopping"),
        }
        let _ = shutdown_tx.send(true);
    });

    info!(
        feed = %cfg.feed.path.display(),
        group = cfg.feed.group_id.as_deref().unwrap_or("-"),
        "starting"
    );
    let summary = pipeline.run(shutdown_rx).await?;
    let snapshot = metrics.snapshot();
    info!(
        messages = snapshot.messages_processed,
        poison = snapshot.poison_messages,
        applied = snapshot.records_applied,
        stale = snapshot.records_stale,
        failed = snapshot.records_failed,
        "final metrics"
    );

    let report = serde_json::json!({
        "summary": summary,
        "metrics": snapshot,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    export.shutdown()?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

async fn cmd_lookup(path: &Path, address: &str, as_json: bool) -> Result<()> {
    let cfg = AppConfig::load(path)?;
    init_tracing(&LogConfig {
        level: "warn".into(),
        ..cfg.log.clone()
    });

    let store = open_store(&cfg.store, cfg.writer.workers).await?;
    let address = normalize_address(address);
    let Some(item) = store.get(&address).await? else {
        bail!("no balance recorded for {address}");
    };

    if as_json {
        let value = serde_json::json!({
            "address": item.address,
            "block_number": item.block_number.to_string(),
            "block_timestamp": item.block_timestamp,
            "balance": item.balance,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", item.address);
        println!("  balance:         {}", item.balance);
        println!("  block number:    {}", item.block_number);
        println!("  block timestamp: {}", item.block_timestamp);
    }
    Ok(())
}

fn render_amount(amount: &str, decimals: u32, legacy: bool) -> Result<String> {
    let value = U256::from_str_radix(amount.trim(), 10)
        .with_context(|| format!("'{amount}' is not an unsigned integer below 2^256"))?;
    check_decimals(decimals)?;
    Ok(if legacy {
        render_decimal_lossy(value, decimals)
    } else {
        render_decimal(value, decimals)
    })
}

fn cmd_info() {
    println!("ChainBalance v{}", env!("CARGO_PKG_VERSION"));
    println!("  Store backends: memory, file, sqlite, postgres");
    println!("  Wire formats: bytes (default), plain");
    println!("  Default writer workers: 10");
    println!("  Default call timeout: 5000 ms");
    println!("  Default drain timeout: 10000 ms");
    println!("  Store URL override: {STORE_URL_ENV}");
    println!("  Metrics: OpenTelemetry, OTLP export via telemetry.otlp_endpoint");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_exact_and_legacy() {
        assert_eq!(render_amount("1500", 3, false).unwrap(), "1.5");
        assert_eq!(render_amount("1500", 3, true).unwrap(), "1.5");
        assert_eq!(render_amount("7", 0, false).unwrap(), "7");
    }

    #[test]
    fn render_rejects_garbage() {
        assert!(render_amount("-1", 0, false).is_err());
        assert!(render_amount("12ab", 0, false).is_err());
        assert!(render_amount("1", 70_000, false).is_err());
    }

    #[test]
    fn cli_parses_render() {
        let cli = Cli::try_parse_from(["chainbalance", "render", "1000", "2", "--legacy"]).unwrap();
        match cli.command {
            Commands::Render { amount, decimals, legacy } => {
                assert_eq!(amount, "1000");
                assert_eq!(decimals, 2);
                assert!(legacy);
            }
            _ => panic!("wrong subcommand"),
        }
    }
}
