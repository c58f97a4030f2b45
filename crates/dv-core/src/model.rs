//! Vault row types and batch metadata.
//!
//! Rows are immutable once written. Hubs and links are inserted at most once
//! per hash key; satellites accumulate one row per observed change of a
//! parent's attributes. History is never rewritten; it is reconstructed on
//! read by ordering satellite rows by `(load_ts, seq)`.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error,
  hash::{Attributes, HashDiff, HashKey},
};

// ─── Source records ──────────────────────────────────────────────────────────

/// One raw source row: field name to JSON value. Missing fields read as null.
pub type Record = BTreeMap<String, serde_json::Value>;

/// Field a source reader puts a row it could not parse under. A record that
/// carries it fails key normalisation instead of loading as a null key.
pub const MALFORMED_FIELD: &str = "_malformed";

/// The records of one source file or table, processed together as a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordSet {
  pub table:   String,
  pub records: Vec<Record>,
}

impl RecordSet {
  pub fn new(table: impl Into<String>, records: Vec<Record>) -> Self {
    Self {
      table: table.into(),
      records,
    }
  }
}

// ─── Batch metadata ──────────────────────────────────────────────────────────

/// Context shared by every row inserted within one batch run.
///
/// Passed explicitly to each loader call; nothing about a batch is held in
/// ambient state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMetadata {
  pub batch_id:      Uuid,
  pub source_system: String,
  /// `<source_system>.<table>`, stamped on every row for traceability.
  pub record_source: String,
  /// Shared load timestamp; truncated to microseconds, the precision the
  /// stores persist.
  pub load_ts:       DateTime<Utc>,
}

impl BatchMetadata {
  pub fn new(
    source_system: impl Into<String>,
    table: &str,
    load_ts: DateTime<Utc>,
  ) -> Self {
    let source_system = source_system.into();
    Self {
      batch_id: Uuid::new_v4(),
      record_source: format!("{source_system}.{table}"),
      source_system,
      load_ts: load_ts.trunc_subsecs(6),
    }
  }
}

// ─── Hubs ────────────────────────────────────────────────────────────────────

/// One distinct business entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubRow {
  pub hash_key:      HashKey,
  pub entity_type:   String,
  /// The normalised business key the hash was computed from.
  pub business_key:  String,
  pub source_system: String,
  pub load_ts:       DateTime<Utc>,
  pub record_source: String,
  pub batch_id:      Uuid,
}

// ─── Links ───────────────────────────────────────────────────────────────────

/// A hub referenced by a link, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkParticipant {
  /// The participant's role within the link, e.g. `"order"` or `"customer"`.
  pub role:        String,
  pub entity_type: String,
  pub hash_key:    HashKey,
}

/// One distinct relationship between two or more hubs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRow {
  pub hash_key:      HashKey,
  pub link_type:     String,
  pub participants:  Vec<LinkParticipant>,
  pub load_ts:       DateTime<Utc>,
  pub record_source: String,
  pub batch_id:      Uuid,
}

// ─── Satellites ──────────────────────────────────────────────────────────────

/// Whether a satellite hangs off a hub or a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParentKind {
  Hub,
  Link,
}

impl ParentKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Hub => "hub",
      Self::Link => "link",
    }
  }
}

impl fmt::Display for ParentKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ParentKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "hub" => Ok(Self::Hub),
      "link" => Ok(Self::Link),
      other => Err(Error::UnknownParentKind(other.to_owned())),
    }
  }
}

/// A satellite row as produced by a loader, before the store assigns its
/// insertion sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSatelliteRow {
  pub satellite:       String,
  pub parent_kind:     ParentKind,
  /// Entity type of the parent hub, or link type of the parent link.
  pub parent_type:     String,
  pub parent_hash_key: HashKey,
  pub load_ts:         DateTime<Utc>,
  pub hash_diff:       HashDiff,
  pub attributes:      Attributes,
  pub record_source:   String,
  pub batch_id:        Uuid,
}

/// A persisted satellite row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteRow {
  /// Store-assigned, strictly increasing insertion sequence. Breaks ties
  /// between rows sharing a load timestamp.
  pub seq:             i64,
  pub satellite:       String,
  pub parent_kind:     ParentKind,
  pub parent_type:     String,
  pub parent_hash_key: HashKey,
  pub load_ts:         DateTime<Utc>,
  pub hash_diff:       HashDiff,
  pub attributes:      Attributes,
  pub record_source:   String,
  pub batch_id:        Uuid,
}

impl SatelliteRow {
  pub fn from_new(seq: i64, row: NewSatelliteRow) -> Self {
    Self {
      seq,
      satellite: row.satellite,
      parent_kind: row.parent_kind,
      parent_type: row.parent_type,
      parent_hash_key: row.parent_hash_key,
      load_ts: row.load_ts,
      hash_diff: row.hash_diff,
      attributes: row.attributes,
      record_source: row.record_source,
      batch_id: row.batch_id,
    }
  }
}

// ─── Write outcomes ──────────────────────────────────────────────────────────

/// Result of an atomic insert-if-absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome<T> {
  Inserted,
  /// A row with the same hash key already existed; it is returned unchanged.
  Present(T),
}
