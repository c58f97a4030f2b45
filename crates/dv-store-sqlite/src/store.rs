//! [`SqliteStore`], the SQLite implementation of [`VaultStore`].

use std::{collections::HashMap, path::Path};

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use dv_core::{
  hash::HashKey,
  model::{BatchMetadata, HubRow, InsertOutcome, LinkRow, NewSatelliteRow, SatelliteRow},
  store::{BatchEntry, BatchOutcome, VaultSnapshot, VaultStore},
};

use crate::{
  Result,
  encode::{
    HUB_COLUMNS, LINK_COLUMNS, PARTICIPANT_COLUMNS, RawBatch, RawHub, RawLink,
    RawParticipant, RawSatellite, SATELLITE_COLUMNS, encode_attributes, encode_dt,
    encode_status, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A vault backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted. All clones
/// share one connection thread, so calls are serialised.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Query satellite rows for one parent. `tail` is appended verbatim after
  /// the parent filter; `?3` binds `as_of` when given.
  async fn query_satellites(
    &self,
    satellite: String,
    parent: HashKey,
    as_of: Option<DateTime<Utc>>,
    tail: &'static str,
  ) -> Result<Vec<SatelliteRow>> {
    let parent_str = parent.to_string();
    let as_of_str  = as_of.map(encode_dt);

    let raws: Vec<RawSatellite> = self
      .conn
      .call(move |conn| {
        let as_of_clause = if as_of_str.is_some() { "AND load_ts <= ?3" } else { "" };
        let sql = format!(
          "SELECT {SATELLITE_COLUMNS} FROM satellites
           WHERE satellite = ?1 AND parent_hash_key = ?2 {as_of_clause}
           {tail}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = match as_of_str {
          Some(ts) => stmt
            .query_map(rusqlite::params![satellite, parent_str, ts], RawSatellite::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
          None => stmt
            .query_map(rusqlite::params![satellite, parent_str], RawSatellite::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSatellite::into_satellite).collect()
  }
}

fn read_participants(
  conn: &rusqlite::Connection,
  link_hash_key: &str,
) -> rusqlite::Result<Vec<RawParticipant>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {PARTICIPANT_COLUMNS} FROM link_participants
     WHERE link_hash_key = ?1 ORDER BY position"
  ))?;
  stmt
    .query_map(rusqlite::params![link_hash_key], RawParticipant::from_row)?
    .collect()
}

// ─── VaultStore impl ─────────────────────────────────────────────────────────

impl VaultStore for SqliteStore {
  type Error = crate::Error;

  // ── Hubs and links ────────────────────────────────────────────────────────

  async fn insert_hub(&self, row: HubRow) -> Result<InsertOutcome<HubRow>> {
    let hash_key      = row.hash_key.to_string();
    let entity_type   = row.entity_type;
    let business_key  = row.business_key;
    let source_system = row.source_system;
    let load_ts       = encode_dt(row.load_ts);
    let record_source = row.record_source;
    let batch_id      = encode_uuid(row.batch_id);

    let existing: Option<RawHub> = self
      .conn
      .call(move |conn| {
        let inserted = conn.execute(
          "INSERT OR IGNORE INTO hubs (
             hash_key, entity_type, business_key, source_system,
             load_ts, record_source, batch_id
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            hash_key,
            entity_type,
            business_key,
            source_system,
            load_ts,
            record_source,
            batch_id,
          ],
        )?;
        if inserted == 1 {
          return Ok(None);
        }
        let existing = conn.query_row(
          &format!("SELECT {HUB_COLUMNS} FROM hubs WHERE hash_key = ?1"),
          rusqlite::params![hash_key],
          RawHub::from_row,
        )?;
        Ok(Some(existing))
      })
      .await?;

    match existing {
      None => Ok(InsertOutcome::Inserted),
      Some(raw) => Ok(InsertOutcome::Present(raw.into_hub()?)),
    }
  }

  async fn insert_link(&self, row: LinkRow) -> Result<InsertOutcome<LinkRow>> {
    let hash_key      = row.hash_key.to_string();
    let link_type     = row.link_type;
    let load_ts       = encode_dt(row.load_ts);
    let record_source = row.record_source;
    let batch_id      = encode_uuid(row.batch_id);
    let participants: Vec<(String, String, String)> = row
      .participants
      .into_iter()
      .map(|p| (p.role, p.entity_type, p.hash_key.to_string()))
      .collect();

    let existing: Option<(RawLink, Vec<RawParticipant>)> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let inserted = tx.execute(
          "INSERT OR IGNORE INTO links (
             hash_key, link_type, load_ts, record_source, batch_id
           ) VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![hash_key, link_type, load_ts, record_source, batch_id],
        )?;

        if inserted == 0 {
          let link = tx.query_row(
            &format!("SELECT {LINK_COLUMNS} FROM links WHERE hash_key = ?1"),
            rusqlite::params![hash_key],
            RawLink::from_row,
          )?;
          let existing = read_participants(&tx, &hash_key)?;
          return Ok(Some((link, existing)));
        }

        {
          let mut stmt = tx.prepare(
            "INSERT INTO link_participants (
               link_hash_key, position, role, entity_type, hub_hash_key
             ) VALUES (?1, ?2, ?3, ?4, ?5)",
          )?;
          for (position, (role, entity_type, hub_hash_key)) in
            participants.iter().enumerate()
          {
            stmt.execute(rusqlite::params![
              hash_key,
              position as i64,
              role,
              entity_type,
              hub_hash_key,
            ])?;
          }
        }
        tx.commit()?;
        Ok(None)
      })
      .await?;

    match existing {
      None => Ok(InsertOutcome::Inserted),
      Some((link, participants)) => {
        Ok(InsertOutcome::Present(link.into_link(participants)?))
      }
    }
  }

  async fn get_hub(&self, hash_key: HashKey) -> Result<Option<HubRow>> {
    let hash_key = hash_key.to_string();

    let raw: Option<RawHub> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {HUB_COLUMNS} FROM hubs WHERE hash_key = ?1"),
            rusqlite::params![hash_key],
            RawHub::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawHub::into_hub).transpose()
  }

  // ── Satellites ────────────────────────────────────────────────────────────

  async fn latest_satellite(
    &self,
    satellite: String,
    parent: HashKey,
  ) -> Result<Option<SatelliteRow>> {
    let rows = self
      .query_satellites(satellite, parent, None, "ORDER BY load_ts DESC, seq DESC LIMIT 1")
      .await?;
    Ok(rows.into_iter().next())
  }

  async fn append_satellite(&self, row: NewSatelliteRow) -> Result<SatelliteRow> {
    let satellite   = row.satellite.clone();
    let parent_kind = row.parent_kind.as_str();
    let parent_type = row.parent_type.clone();
    let parent_hk   = row.parent_hash_key.to_string();
    let load_ts     = encode_dt(row.load_ts);
    let hash_diff   = row.hash_diff.to_string();
    let attributes  = encode_attributes(&row.attributes)?;
    let source      = row.record_source.clone();
    let batch_id    = encode_uuid(row.batch_id);

    let seq: i64 = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO satellites (
             satellite, parent_kind, parent_type, parent_hash_key,
             load_ts, hash_diff, attributes, record_source, batch_id
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            satellite,
            parent_kind,
            parent_type,
            parent_hk,
            load_ts,
            hash_diff,
            attributes,
            source,
            batch_id,
          ],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(SatelliteRow::from_new(seq, row))
  }

  async fn satellite_history(
    &self,
    satellite: String,
    parent: HashKey,
  ) -> Result<Vec<SatelliteRow>> {
    self
      .query_satellites(satellite, parent, None, "ORDER BY load_ts ASC, seq ASC")
      .await
  }

  async fn satellite_as_of(
    &self,
    satellite: String,
    parent: HashKey,
    as_of: DateTime<Utc>,
  ) -> Result<Option<SatelliteRow>> {
    let rows = self
      .query_satellites(
        satellite,
        parent,
        Some(as_of),
        "ORDER BY load_ts DESC, seq DESC LIMIT 1",
      )
      .await?;
    Ok(rows.into_iter().next())
  }

  // ── Batch ledger ──────────────────────────────────────────────────────────

  async fn record_batch_started(
    &self,
    metadata: BatchMetadata,
    table: String,
  ) -> Result<()> {
    let batch_id   = encode_uuid(metadata.batch_id);
    let load_ts    = encode_dt(metadata.load_ts);
    let started_at = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO batches (
             batch_id, source_system, table_name, record_source, load_ts, started_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            batch_id,
            metadata.source_system,
            table,
            metadata.record_source,
            load_ts,
            started_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn record_batch_finished(&self, outcome: BatchOutcome) -> Result<()> {
    let batch_id    = encode_uuid(outcome.batch_id);
    let status      = encode_status(outcome.status);
    let finished_at = encode_dt(outcome.finished_at);
    let report      = outcome.report.to_string();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO batch_outcomes (batch_id, status, finished_at, report_json)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![batch_id, status, finished_at, report],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_batch(&self, batch_id: Uuid) -> Result<Option<BatchEntry>> {
    let id_str = encode_uuid(batch_id);

    let raw: Option<RawBatch> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT
               b.batch_id, b.source_system, b.table_name, b.record_source,
               b.load_ts, b.started_at,
               o.status, o.finished_at, o.report_json
             FROM batches b
             LEFT JOIN batch_outcomes o ON o.batch_id = b.batch_id
             WHERE b.batch_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok(RawBatch {
                batch_id:      row.get(0)?,
                source_system: row.get(1)?,
                table_name:    row.get(2)?,
                record_source: row.get(3)?,
                load_ts:       row.get(4)?,
                started_at:    row.get(5)?,
                status:        row.get(6)?,
                finished_at:   row.get(7)?,
                report_json:   row.get(8)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawBatch::into_entry).transpose()
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn snapshot(&self) -> Result<VaultSnapshot> {
    // All four reads share one transaction, so concurrent writers on other
    // connections to the same file cannot interleave between them.
    let (raw_hubs, raw_links, raw_participants, raw_sats) = self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        let hubs = {
          let mut stmt = tx.prepare(&format!(
            "SELECT {HUB_COLUMNS} FROM hubs ORDER BY entity_type, hash_key"
          ))?;
          stmt
            .query_map([], RawHub::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        let links = {
          let mut stmt = tx.prepare(&format!(
            "SELECT {LINK_COLUMNS} FROM links ORDER BY link_type, hash_key"
          ))?;
          stmt
            .query_map([], RawLink::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        let participants = {
          let mut stmt = tx.prepare(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM link_participants
             ORDER BY link_hash_key, position"
          ))?;
          stmt
            .query_map([], RawParticipant::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        let satellites = {
          let mut stmt = tx.prepare(&format!(
            "SELECT {SATELLITE_COLUMNS} FROM satellites
             ORDER BY satellite, parent_hash_key, load_ts, seq"
          ))?;
          stmt
            .query_map([], RawSatellite::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        tx.commit()?;
        Ok((hubs, links, participants, satellites))
      })
      .await?;

    let mut by_link: HashMap<String, Vec<RawParticipant>> = HashMap::new();
    for participant in raw_participants {
      by_link
        .entry(participant.link_hash_key.clone())
        .or_default()
        .push(participant);
    }

    let hubs = raw_hubs
      .into_iter()
      .map(RawHub::into_hub)
      .collect::<Result<Vec<_>>>()?;
    let links = raw_links
      .into_iter()
      .map(|link| {
        let participants = by_link.remove(&link.hash_key).unwrap_or_default();
        link.into_link(participants)
      })
      .collect::<Result<Vec<_>>>()?;
    let satellites = raw_sats
      .into_iter()
      .map(RawSatellite::into_satellite)
      .collect::<Result<Vec<_>>>()?;

    Ok(VaultSnapshot {
      taken_at: Utc::now(),
      hubs,
      links,
      satellites,
    })
  }
}
