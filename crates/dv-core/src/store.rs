//! The `VaultStore` trait and supporting snapshot and ledger types.
//!
//! The trait is implemented by storage backends (e.g. `dv-store-sqlite`).
//! Loaders and the orchestrator in `dv-load` depend on this abstraction, not
//! on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  hash::HashKey,
  model::{
    BatchMetadata, HubRow, InsertOutcome, LinkRow, NewSatelliteRow,
    SatelliteRow,
  },
};

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// A point-in-time copy of every vault row, read in one consistent pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultSnapshot {
  pub taken_at:   DateTime<Utc>,
  pub hubs:       Vec<HubRow>,
  pub links:      Vec<LinkRow>,
  /// Ordered by `(satellite, parent_hash_key, load_ts, seq)`.
  pub satellites: Vec<SatelliteRow>,
}

// ─── Batch ledger ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
  Completed,
  Aborted,
}

/// The terminal record of a batch run. The report is stored as JSON so the
/// store stays independent of the loader crate's report types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
  pub batch_id:    Uuid,
  pub status:      BatchStatus,
  pub finished_at: DateTime<Utc>,
  pub report:      serde_json::Value,
}

/// A batch as recorded in the ledger, with its outcome once it has one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEntry {
  pub metadata:   BatchMetadata,
  pub table:      String,
  pub started_at: DateTime<Utc>,
  pub outcome:    Option<BatchOutcome>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an append-only vault backend.
///
/// There is no update or delete operation. Hub and link writes
/// are atomic insert-if-absent; satellite writes always append, and change
/// detection happens in the loader.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait VaultStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Hubs and links ────────────────────────────────────────────────────

  /// Insert `row` unless a hub with the same hash key exists. Atomic with
  /// respect to concurrent callers.
  fn insert_hub(
    &self,
    row: HubRow,
  ) -> impl Future<Output = Result<InsertOutcome<HubRow>, Self::Error>> + Send + '_;

  /// Insert `row` unless a link with the same hash key exists. Atomic with
  /// respect to concurrent callers.
  fn insert_link(
    &self,
    row: LinkRow,
  ) -> impl Future<Output = Result<InsertOutcome<LinkRow>, Self::Error>> + Send + '_;

  fn get_hub(
    &self,
    hash_key: HashKey,
  ) -> impl Future<Output = Result<Option<HubRow>, Self::Error>> + Send + '_;

  // ── Satellites ────────────────────────────────────────────────────────

  /// The most recently loaded row of `satellite` for `parent`, ordered by
  /// load timestamp with ties broken by insertion sequence.
  fn latest_satellite(
    &self,
    satellite: String,
    parent: HashKey,
  ) -> impl Future<Output = Result<Option<SatelliteRow>, Self::Error>> + Send + '_;

  /// Append a row and return it with its assigned sequence.
  fn append_satellite(
    &self,
    row: NewSatelliteRow,
  ) -> impl Future<Output = Result<SatelliteRow, Self::Error>> + Send + '_;

  /// Every row of `satellite` for `parent`, oldest first.
  fn satellite_history(
    &self,
    satellite: String,
    parent: HashKey,
  ) -> impl Future<Output = Result<Vec<SatelliteRow>, Self::Error>> + Send + '_;

  /// The row of `satellite` for `parent` that was current at `as_of`.
  fn satellite_as_of(
    &self,
    satellite: String,
    parent: HashKey,
    as_of: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<SatelliteRow>, Self::Error>> + Send + '_;

  // ── Batch ledger ──────────────────────────────────────────────────────

  fn record_batch_started(
    &self,
    metadata: BatchMetadata,
    table: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn record_batch_finished(
    &self,
    outcome: BatchOutcome,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_batch(
    &self,
    batch_id: Uuid,
  ) -> impl Future<Output = Result<Option<BatchEntry>, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Read every hub, link and satellite row in one consistent snapshot.
  fn snapshot(
    &self,
  ) -> impl Future<Output = Result<VaultSnapshot, Self::Error>> + Send + '_;
}
