//! Hub loader.

use dv_core::{
  hash::hub_hash_key,
  mapping::HubMapping,
  model::{HubRow, InsertOutcome, Record},
  normalize::normalize_field,
  store::VaultStore,
};
use tracing::{info, warn};

use crate::{
  BatchContext, LoadError, Result,
  report::{HubLoadOutcome, IssueKind, RecordIssue},
};

/// Insert one hub row per distinct business key in `records`.
///
/// Each key is normalised, hashed and written with an atomic insert-if-absent,
/// so re-running a batch inserts nothing new. Null keys become the mapping's
/// sentinel and are loaded like any other key; the validator reports them.
/// A key of the wrong type, or a record the reader could not parse, is
/// recorded in `failed` and the record skipped.
#[tracing::instrument(
  level = "debug",
  skip_all,
  fields(entity_type = %mapping.entity_type, batch_id = %ctx.metadata.batch_id),
)]
pub async fn load_hub<S: VaultStore>(
  store: &S,
  mapping: &HubMapping,
  records: &[Record],
  ctx: &BatchContext,
) -> Result<HubLoadOutcome> {
  let meta = &ctx.metadata;
  let mut outcome = HubLoadOutcome {
    entity_type: mapping.entity_type.clone(),
    ..HubLoadOutcome::default()
  };

  for (index, record) in records.iter().enumerate() {
    ctx.check_cancelled()?;

    let business_key = match normalize_field(record, &mapping.key_field, &mapping.rules) {
      Ok(key) => key,
      Err(err) => {
        warn!(index, field = %mapping.key_field, %err, "hub key normalization failed");
        outcome
          .failed
          .push(RecordIssue::normalization(index, &mapping.key_field, &err));
        continue;
      }
    };

    let hash_key = hub_hash_key(&mapping.entity_type, &business_key);
    let row = HubRow {
      hash_key:      hash_key.clone(),
      entity_type:   mapping.entity_type.clone(),
      business_key:  business_key.clone(),
      source_system: meta.source_system.clone(),
      load_ts:       meta.load_ts,
      record_source: meta.record_source.clone(),
      batch_id:      meta.batch_id,
    };

    match ctx
      .or_cancel(store.insert_hub(row))
      .await?
      .map_err(LoadError::storage)?
    {
      InsertOutcome::Inserted => outcome.inserted += 1,
      InsertOutcome::Present(existing) => {
        outcome.skipped += 1;
        if existing.business_key != business_key
          || existing.entity_type != mapping.entity_type
        {
          warn!(%hash_key, "hash key collision between distinct business keys");
          outcome.collisions.push(RecordIssue::with_key(
            index,
            IssueKind::DuplicateHashCollision,
            hash_key,
            format!(
              "{}/{business_key} collides with existing {}/{}",
              mapping.entity_type, existing.entity_type, existing.business_key
            ),
          ));
        }
      }
    }
  }

  info!(
    entity_type = %outcome.entity_type,
    inserted = outcome.inserted,
    skipped = outcome.skipped,
    failed = outcome.failed.len(),
    "hub load finished"
  );
  Ok(outcome)
}
