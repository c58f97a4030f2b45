//! Link loader.

use dv_core::{
  mapping::LinkMapping,
  model::{InsertOutcome, LinkRow, Record},
  store::VaultStore,
};
use tracing::{info, warn};

use crate::{
  BatchContext, LoadError, Result,
  keys::link_key,
  report::{IssueKind, LinkLoadOutcome, RecordIssue},
};

/// Insert one link row per distinct participant combination in `records`.
///
/// Participant hash keys come from each record's own natural keys; the
/// referenced hubs need not exist, so links load in any order relative to
/// their hubs. A record with a null or missing participant key is excluded
/// and reported in `unresolved`.
#[tracing::instrument(
  level = "debug",
  skip_all,
  fields(link_type = %mapping.link_type, batch_id = %ctx.metadata.batch_id),
)]
pub async fn load_link<S: VaultStore>(
  store: &S,
  mapping: &LinkMapping,
  records: &[Record],
  ctx: &BatchContext,
) -> Result<LinkLoadOutcome> {
  let meta = &ctx.metadata;
  let mut outcome = LinkLoadOutcome {
    link_type: mapping.link_type.clone(),
    ..LinkLoadOutcome::default()
  };

  for (index, record) in records.iter().enumerate() {
    ctx.check_cancelled()?;

    let (hash_key, participants) = match link_key(mapping, record) {
      Ok(resolved) => resolved,
      Err(problem) => {
        problem.file(index, &mut outcome.unresolved, &mut outcome.failed);
        continue;
      }
    };

    let row = LinkRow {
      hash_key:      hash_key.clone(),
      link_type:     mapping.link_type.clone(),
      participants:  participants.clone(),
      load_ts:       meta.load_ts,
      record_source: meta.record_source.clone(),
      batch_id:      meta.batch_id,
    };

    match ctx
      .or_cancel(store.insert_link(row))
      .await?
      .map_err(LoadError::storage)?
    {
      InsertOutcome::Inserted => outcome.inserted += 1,
      InsertOutcome::Present(existing) => {
        outcome.skipped += 1;
        if existing.participants != participants {
          warn!(%hash_key, "link hash key collision between distinct participants");
          outcome.collisions.push(RecordIssue::with_key(
            index,
            IssueKind::DuplicateHashCollision,
            hash_key,
            format!("{} participants differ from the existing row", mapping.link_type),
          ));
        }
      }
    }
  }

  info!(
    link_type = %outcome.link_type,
    inserted = outcome.inserted,
    skipped = outcome.skipped,
    unresolved = outcome.unresolved.len(),
    "link load finished"
  );
  Ok(outcome)
}
