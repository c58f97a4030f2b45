//! `dv` command-line front end.
//!
//! Reads `dv.toml` (or the path given with `--config`), opens the SQLite
//! vault and runs one command. Reports are printed to stdout as JSON; logs
//! go to stderr and follow `RUST_LOG`.
//!
//! ```text
//! dv load --source ERP --table customers --file customers.jsonl
//! dv load --source SAAS --table order_items --file order_items.csv
//! dv validate
//! dv history --satellite sat_customer_erp --key CUST-001
//! dv history --satellite sat_order_item_saas --key ORD-1 --key PROD-1
//! ```
//!
//! Ctrl-C during `load` cancels the batch; rows already written are kept.

mod lookup;
mod reader;
mod settings;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use dv_core::{
  hash::hub_hash_key,
  mapping::MappingCatalog,
  model::RecordSet,
  store::VaultStore,
};
use dv_load::Orchestrator;
use dv_store_sqlite::SqliteStore;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

use crate::{
  lookup::{business_key, satellite_parent_key},
  settings::EngineConfig,
};

#[derive(Parser)]
#[command(author, version, about = "Data vault loader")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "dv.toml", global = true)]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Load one source file as a batch.
  Load {
    /// Source system, e.g. `ERP`.
    #[arg(long)]
    source: String,
    /// Source table, e.g. `customers`.
    #[arg(long)]
    table:  String,
    /// CSV (by `.csv` extension), JSON array or JSON Lines file.
    #[arg(long)]
    file:   PathBuf,
    /// Load timestamp (RFC 3339). Defaults to now.
    #[arg(long)]
    as_of:  Option<DateTime<Utc>>,
  },
  /// Validate the whole vault.
  Validate,
  /// Print a satellite's history for one parent.
  History {
    #[arg(long)]
    satellite: String,
    /// Business key as it appears in the source. Repeat once per link
    /// participant, in declaration order, for a link satellite.
    #[arg(long = "key", required = true)]
    keys:      Vec<String>,
    /// Only print the row current at this instant.
    #[arg(long)]
    as_of:     Option<DateTime<Utc>>,
  },
  /// Print the normalised business key and hub hash key.
  Hash {
    #[arg(long)]
    entity: String,
    #[arg(long)]
    key:    String,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = EngineConfig::load(&cli.config)?;
  let catalog = cfg.catalog()?;

  match cli.command {
    Command::Load {
      source,
      table,
      file,
      as_of,
    } => {
      let records = reader::read_records(&file)?;
      let as_of = as_of.unwrap_or_else(Utc::now);
      let engine = open_engine(&cfg, catalog).await?;
      let cancel = CancellationToken::new();
      tokio::spawn({
        let cancel = cancel.clone();
        async move {
          if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling batch");
            cancel.cancel();
          }
        }
      });
      match engine
        .run_batch_with_cancel(&source, RecordSet::new(table, records), as_of, cancel)
        .await
      {
        Ok(report) => print_json(&report),
        Err(err) => {
          print_json(&err.report)?;
          Err(err.into())
        }
      }
    }
    Command::Validate => {
      let engine = open_engine(&cfg, catalog).await?;
      let report = engine.validate().await?;
      print_json(&report)?;
      if !report.passed() {
        anyhow::bail!("validation failed");
      }
      Ok(())
    }
    Command::History {
      satellite,
      keys,
      as_of,
    } => {
      let parent = satellite_parent_key(&catalog, &satellite, &keys)?;
      let engine = open_engine(&cfg, catalog).await?;
      let store = engine.store();
      let rows: Vec<_> = match as_of {
        Some(as_of) => store
          .satellite_as_of(satellite, parent, as_of)
          .await?
          .into_iter()
          .collect(),
        None => store.satellite_history(satellite, parent).await?,
      };
      print_json(&rows)
    }
    Command::Hash { entity, key } => {
      let business_key = business_key(&catalog, &entity, &key)?;
      print_json(&serde_json::json!({
        "entity_type":  entity,
        "hash_key":     hub_hash_key(&entity, &business_key),
        "business_key": business_key,
      }))
    }
  }
}

async fn open_engine(
  cfg: &EngineConfig,
  catalog: MappingCatalog,
) -> anyhow::Result<Orchestrator<SqliteStore>> {
  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  Ok(
    Orchestrator::new(Arc::new(store), catalog)
      .with_validation_rules(cfg.validation_rules())
      .with_validation_after_batch(cfg.validate_after_batch),
  )
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
