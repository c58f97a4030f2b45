//! Satellite loader: change-driven history.
//!
//! For each parent key the satellite is a chain of states: no row, then a row
//! with hash diff `D`, then `D'`, and so on. A transition fires only when the
//! incoming hash diff differs from the immediate predecessor, which is the
//! latest row by `(load_ts, seq)`. Older rows are never consulted, so a value
//! that changes and later changes back produces three rows, not two.

use dv_core::{
  hash::{Attributes, hash_diff},
  mapping::{Parent, SatelliteMapping},
  model::{NewSatelliteRow, ParentKind, Record},
  store::VaultStore,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::{
  BatchContext, KeyLocks, LoadError, Result,
  keys::parent_key,
  report::{IssueKind, RecordIssue, SatelliteLoadOutcome},
};

/// Collect the mapped attributes of `record`; absent fields read as null.
pub fn attributes_of(mapping: &SatelliteMapping, record: &Record) -> Attributes {
  mapping
    .attributes
    .iter()
    .map(|name| (name.clone(), record.get(name).cloned().unwrap_or(Value::Null)))
    .collect()
}

/// Append a satellite row for every record whose attributes differ from the
/// parent's latest row.
///
/// The read-compare-append for one parent runs under `locks`, so concurrent
/// batches cannot both append on top of the same predecessor. A parent whose
/// latest row is at or after this batch's load timestamp cannot take a
/// differing row without breaking the strictly increasing history; such
/// records are reported in `conflicts` and not inserted.
#[tracing::instrument(
  level = "debug",
  skip_all,
  fields(satellite = %mapping.name, batch_id = %ctx.metadata.batch_id),
)]
pub async fn load_satellite<S: VaultStore>(
  store: &S,
  locks: &KeyLocks,
  mapping: &SatelliteMapping,
  parent: Parent<'_>,
  records: &[Record],
  ctx: &BatchContext,
) -> Result<SatelliteLoadOutcome> {
  let meta = &ctx.metadata;
  let (parent_kind, parent_type) = match parent {
    Parent::Hub(hub) => (ParentKind::Hub, hub.entity_type.as_str()),
    Parent::Link(link) => (ParentKind::Link, link.link_type.as_str()),
  };
  let mut outcome = SatelliteLoadOutcome {
    satellite: mapping.name.clone(),
    ..SatelliteLoadOutcome::default()
  };

  for (index, record) in records.iter().enumerate() {
    ctx.check_cancelled()?;

    let parent_hash_key = match parent_key(parent, record) {
      Ok(hash_key) => hash_key,
      Err(problem) => {
        problem.file(index, &mut outcome.unresolved, &mut outcome.failed);
        continue;
      }
    };

    let attributes = attributes_of(mapping, record);
    let diff = hash_diff(&attributes);

    let _guard = ctx
      .or_cancel(locks.lock(format!("{}/{parent_hash_key}", mapping.name)))
      .await?;

    let latest = ctx
      .or_cancel(store.latest_satellite(mapping.name.clone(), parent_hash_key.clone()))
      .await?
      .map_err(LoadError::storage)?;

    if let Some(prev) = &latest {
      if prev.hash_diff == diff {
        outcome.unchanged += 1;
        continue;
      }
      if prev.load_ts >= meta.load_ts {
        let (kind, detail) = if prev.load_ts == meta.load_ts {
          (
            IssueKind::SameLoadConflict,
            format!("a differing row was already loaded at {}", meta.load_ts),
          )
        } else {
          (
            IssueKind::StaleLoad,
            format!("latest row at {} is newer than {}", prev.load_ts, meta.load_ts),
          )
        };
        warn!(index, %parent_hash_key, ?kind, "satellite change not applied");
        outcome.conflicts.push(RecordIssue::with_key(
          index,
          kind,
          parent_hash_key,
          detail,
        ));
        continue;
      }
    }

    ctx
      .or_cancel(store.append_satellite(NewSatelliteRow {
        satellite: mapping.name.clone(),
        parent_kind,
        parent_type: parent_type.to_owned(),
        parent_hash_key,
        load_ts: meta.load_ts,
        hash_diff: diff,
        attributes,
        record_source: meta.record_source.clone(),
        batch_id: meta.batch_id,
      }))
      .await?
      .map_err(LoadError::storage)?;
    outcome.inserted += 1;
  }

  info!(
    satellite = %outcome.satellite,
    inserted = outcome.inserted,
    unchanged = outcome.unchanged,
    unresolved = outcome.unresolved.len(),
    conflicts = outcome.conflicts.len(),
    "satellite load finished"
  );
  Ok(outcome)
}
