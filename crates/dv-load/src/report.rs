//! Loader outcomes and the batch report.

use chrono::{DateTime, Utc};
use dv_core::{hash::HashKey, model::BatchMetadata, normalize::NormalizationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validate::ValidationReport;

// ─── Per-record issues ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
  /// The key field had the wrong type; the record was skipped.
  Normalization,
  /// A required key was null or missing, so no hash key could be computed.
  UnresolvedKey,
  /// An existing row shares the hash key but not the business key.
  DuplicateHashCollision,
  /// A differing satellite row already exists at this exact load timestamp.
  SameLoadConflict,
  /// The latest satellite row is newer than this batch's load timestamp.
  StaleLoad,
}

/// A problem with one source record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordIssue {
  /// Position of the record within its record set.
  pub index:    usize,
  pub kind:     IssueKind,
  pub field:    Option<String>,
  pub hash_key: Option<HashKey>,
  pub detail:   String,
}

impl RecordIssue {
  pub fn normalization(index: usize, field: &str, err: &NormalizationError) -> Self {
    Self {
      index,
      kind: IssueKind::Normalization,
      field: Some(field.to_owned()),
      hash_key: None,
      detail: err.to_string(),
    }
  }

  pub fn unresolved(index: usize, field: &str) -> Self {
    Self {
      index,
      kind: IssueKind::UnresolvedKey,
      field: Some(field.to_owned()),
      hash_key: None,
      detail: format!("{field} is null or missing"),
    }
  }

  pub fn with_key(index: usize, kind: IssueKind, hash_key: HashKey, detail: String) -> Self {
    Self {
      index,
      kind,
      field: None,
      hash_key: Some(hash_key),
      detail,
    }
  }
}

// ─── Loader outcomes ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubLoadOutcome {
  pub entity_type: String,
  pub inserted:    usize,
  pub skipped:     usize,
  pub failed:      Vec<RecordIssue>,
  pub collisions:  Vec<RecordIssue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkLoadOutcome {
  pub link_type:  String,
  pub inserted:   usize,
  pub skipped:    usize,
  pub unresolved: Vec<RecordIssue>,
  pub failed:     Vec<RecordIssue>,
  pub collisions: Vec<RecordIssue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SatelliteLoadOutcome {
  pub satellite:  String,
  pub inserted:   usize,
  pub unchanged:  usize,
  pub unresolved: Vec<RecordIssue>,
  pub failed:     Vec<RecordIssue>,
  pub conflicts:  Vec<RecordIssue>,
}

// ─── Batch report ────────────────────────────────────────────────────────────

/// Structured summary of one batch run. Returned on success and carried by
/// [`crate::BatchAbortedError`] when a batch stops early.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
  pub batch_id:      Uuid,
  pub source_system: String,
  pub table:         String,
  pub record_source: String,
  pub load_ts:       DateTime<Utc>,
  /// Number of records in the record set.
  pub records:       usize,
  pub hubs:          Vec<HubLoadOutcome>,
  pub links:         Vec<LinkLoadOutcome>,
  pub satellites:    Vec<SatelliteLoadOutcome>,
  pub validation:    Option<ValidationReport>,
  /// Why the batch stopped early, if it did.
  pub aborted:       Option<String>,
}

impl BatchReport {
  pub fn new(metadata: &BatchMetadata, table: &str, records: usize) -> Self {
    Self {
      batch_id: metadata.batch_id,
      source_system: metadata.source_system.clone(),
      table: table.to_owned(),
      record_source: metadata.record_source.clone(),
      load_ts: metadata.load_ts,
      records,
      hubs: Vec::new(),
      links: Vec::new(),
      satellites: Vec::new(),
      validation: None,
      aborted: None,
    }
  }

  pub fn hub(&self, entity_type: &str) -> Option<&HubLoadOutcome> {
    self.hubs.iter().find(|h| h.entity_type == entity_type)
  }

  pub fn link(&self, link_type: &str) -> Option<&LinkLoadOutcome> {
    self.links.iter().find(|l| l.link_type == link_type)
  }

  pub fn satellite(&self, name: &str) -> Option<&SatelliteLoadOutcome> {
    self.satellites.iter().find(|s| s.satellite == name)
  }

  /// Rows written by this batch across all loaders.
  pub fn inserted(&self) -> usize {
    self.hubs.iter().map(|h| h.inserted).sum::<usize>()
      + self.links.iter().map(|l| l.inserted).sum::<usize>()
      + self.satellites.iter().map(|s| s.inserted).sum::<usize>()
  }

  /// Every per-record issue, from every loader.
  pub fn issues(&self) -> impl Iterator<Item = &RecordIssue> {
    let hubs = self.hubs.iter().flat_map(|h| h.failed.iter().chain(&h.collisions));
    let links = self
      .links
      .iter()
      .flat_map(|l| l.unresolved.iter().chain(&l.failed).chain(&l.collisions));
    let sats = self
      .satellites
      .iter()
      .flat_map(|s| s.unresolved.iter().chain(&s.failed).chain(&s.conflicts));
    hubs.chain(links).chain(sats)
  }
}
