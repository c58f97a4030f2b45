//! Encoding and decoding helpers between vault row types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings with microsecond
//! precision and a `Z` suffix, so text comparison in SQL orders them
//! chronologically. Attribute maps and reports are compact JSON. UUIDs are
//! hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use dv_core::{
  hash::{Attributes, HashDiff, HashKey},
  model::{BatchMetadata, HubRow, LinkParticipant, LinkRow, ParentKind, SatelliteRow},
  store::{BatchEntry, BatchOutcome, BatchStatus},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_attributes(attributes: &Attributes) -> Result<String> {
  Ok(serde_json::to_string(attributes)?)
}

pub fn decode_attributes(s: &str) -> Result<Attributes> {
  Ok(serde_json::from_str(s)?)
}

pub fn encode_status(status: BatchStatus) -> &'static str {
  match status {
    BatchStatus::Completed => "completed",
    BatchStatus::Aborted => "aborted",
  }
}

pub fn decode_status(s: &str) -> Result<BatchStatus> {
  match s {
    "completed" => Ok(BatchStatus::Completed),
    "aborted" => Ok(BatchStatus::Aborted),
    other => Err(Error::UnknownBatchStatus(other.to_owned())),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const HUB_COLUMNS: &str = "hash_key, entity_type, business_key, \
                               source_system, load_ts, record_source, batch_id";

/// Raw strings read directly from a `hubs` row.
pub struct RawHub {
  pub hash_key:      String,
  pub entity_type:   String,
  pub business_key:  String,
  pub source_system: String,
  pub load_ts:       String,
  pub record_source: String,
  pub batch_id:      String,
}

impl RawHub {
  /// Read a row selected with [`HUB_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      hash_key:      row.get(0)?,
      entity_type:   row.get(1)?,
      business_key:  row.get(2)?,
      source_system: row.get(3)?,
      load_ts:       row.get(4)?,
      record_source: row.get(5)?,
      batch_id:      row.get(6)?,
    })
  }

  pub fn into_hub(self) -> Result<HubRow> {
    Ok(HubRow {
      hash_key:      HashKey::parse(&self.hash_key)?,
      entity_type:   self.entity_type,
      business_key:  self.business_key,
      source_system: self.source_system,
      load_ts:       decode_dt(&self.load_ts)?,
      record_source: self.record_source,
      batch_id:      decode_uuid(&self.batch_id)?,
    })
  }
}

pub const LINK_COLUMNS: &str =
  "hash_key, link_type, load_ts, record_source, batch_id";

/// Raw strings read from a `links` row.
pub struct RawLink {
  pub hash_key:      String,
  pub link_type:     String,
  pub load_ts:       String,
  pub record_source: String,
  pub batch_id:      String,
}

impl RawLink {
  /// Read a row selected with [`LINK_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      hash_key:      row.get(0)?,
      link_type:     row.get(1)?,
      load_ts:       row.get(2)?,
      record_source: row.get(3)?,
      batch_id:      row.get(4)?,
    })
  }

  /// Combine with the link's participant rows, already in position order.
  pub fn into_link(self, participants: Vec<RawParticipant>) -> Result<LinkRow> {
    if participants.is_empty() {
      return Err(Error::LinkWithoutParticipants(self.hash_key));
    }
    let participants = participants
      .into_iter()
      .map(RawParticipant::into_participant)
      .collect::<Result<Vec<_>>>()?;
    Ok(LinkRow {
      hash_key: HashKey::parse(&self.hash_key)?,
      link_type: self.link_type,
      participants,
      load_ts: decode_dt(&self.load_ts)?,
      record_source: self.record_source,
      batch_id: decode_uuid(&self.batch_id)?,
    })
  }
}

pub const PARTICIPANT_COLUMNS: &str =
  "link_hash_key, role, entity_type, hub_hash_key";

/// Raw strings read from a `link_participants` row.
pub struct RawParticipant {
  pub link_hash_key: String,
  pub role:          String,
  pub entity_type:   String,
  pub hub_hash_key:  String,
}

impl RawParticipant {
  /// Read a row selected with [`PARTICIPANT_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      link_hash_key: row.get(0)?,
      role:          row.get(1)?,
      entity_type:   row.get(2)?,
      hub_hash_key:  row.get(3)?,
    })
  }

  fn into_participant(self) -> Result<LinkParticipant> {
    Ok(LinkParticipant {
      role:        self.role,
      entity_type: self.entity_type,
      hash_key:    HashKey::parse(&self.hub_hash_key)?,
    })
  }
}

pub const SATELLITE_COLUMNS: &str = "seq, satellite, parent_kind, parent_type, \
                                     parent_hash_key, load_ts, hash_diff, \
                                     attributes, record_source, batch_id";

/// Raw values read from a `satellites` row.
pub struct RawSatellite {
  pub seq:             i64,
  pub satellite:       String,
  pub parent_kind:     String,
  pub parent_type:     String,
  pub parent_hash_key: String,
  pub load_ts:         String,
  pub hash_diff:       String,
  pub attributes:      String,
  pub record_source:   String,
  pub batch_id:        String,
}

impl RawSatellite {
  /// Read a row selected with [`SATELLITE_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      seq:             row.get(0)?,
      satellite:       row.get(1)?,
      parent_kind:     row.get(2)?,
      parent_type:     row.get(3)?,
      parent_hash_key: row.get(4)?,
      load_ts:         row.get(5)?,
      hash_diff:       row.get(6)?,
      attributes:      row.get(7)?,
      record_source:   row.get(8)?,
      batch_id:        row.get(9)?,
    })
  }

  pub fn into_satellite(self) -> Result<SatelliteRow> {
    Ok(SatelliteRow {
      seq:             self.seq,
      satellite:       self.satellite,
      parent_kind:     self.parent_kind.parse::<ParentKind>()?,
      parent_type:     self.parent_type,
      parent_hash_key: HashKey::parse(&self.parent_hash_key)?,
      load_ts:         decode_dt(&self.load_ts)?,
      hash_diff:       HashDiff::parse(&self.hash_diff)?,
      attributes:      decode_attributes(&self.attributes)?,
      record_source:   self.record_source,
      batch_id:        decode_uuid(&self.batch_id)?,
    })
  }
}

/// Raw strings read from `batches` left-joined with `batch_outcomes`.
pub struct RawBatch {
  pub batch_id:      String,
  pub source_system: String,
  pub table_name:    String,
  pub record_source: String,
  pub load_ts:       String,
  pub started_at:    String,
  pub status:        Option<String>,
  pub finished_at:   Option<String>,
  pub report_json:   Option<String>,
}

impl RawBatch {
  pub fn into_entry(self) -> Result<BatchEntry> {
    let batch_id = decode_uuid(&self.batch_id)?;
    let outcome = match (self.status, self.finished_at, self.report_json) {
      (Some(status), Some(finished_at), Some(report)) => Some(BatchOutcome {
        batch_id,
        status: decode_status(&status)?,
        finished_at: decode_dt(&finished_at)?,
        report: serde_json::from_str(&report)?,
      }),
      _ => None,
    };

    Ok(BatchEntry {
      metadata: BatchMetadata {
        batch_id,
        source_system: self.source_system,
        record_source: self.record_source,
        load_ts: decode_dt(&self.load_ts)?,
      },
      table: self.table_name,
      started_at: decode_dt(&self.started_at)?,
      outcome,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_are_fixed_width_and_sortable() {
    let early = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let late = Utc.timestamp_opt(1_700_000_000, 500_000_000).unwrap();
    let (a, b) = (encode_dt(early), encode_dt(late));
    assert_eq!(a.len(), b.len());
    assert!(a < b);
    assert_eq!(decode_dt(&a).unwrap(), early);
  }
}
