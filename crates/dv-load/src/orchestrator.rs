//! Batch orchestration.
//!
//! One [`Orchestrator::run_batch`] call loads one source record set:
//!
//! 1. Resolve the `(source_system, table)` mapping.
//! 2. Record the batch in the store's ledger.
//! 3. Load every hub, in parallel across entity types.
//! 4. Load every link, then every satellite.
//! 5. Optionally validate the vault.
//! 6. Record the outcome and return the [`BatchReport`].
//!
//! Every row written by the batch carries the same load timestamp, record
//! source and batch id. A storage failure or cancellation stops the batch at
//! the current step; earlier writes stay committed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dv_core::{
  mapping::{MappingCatalog, SourceMapping},
  model::{BatchMetadata, Record, RecordSet},
  store::{BatchOutcome, BatchStatus, VaultStore},
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
  BatchAbortedError, BatchContext, BatchReport, KeyLocks, LoadError, Result,
  hub::load_hub,
  link::load_link,
  report::HubLoadOutcome,
  satellite::load_satellite,
  validate::{self, ValidationReport, ValidationRules},
};

pub struct Orchestrator<S> {
  store:                Arc<S>,
  catalog:              Arc<MappingCatalog>,
  locks:                Arc<KeyLocks>,
  rules:                Arc<ValidationRules>,
  validate_after_batch: bool,
}

impl<S> Clone for Orchestrator<S> {
  fn clone(&self) -> Self {
    Self {
      store:                Arc::clone(&self.store),
      catalog:              Arc::clone(&self.catalog),
      locks:                Arc::clone(&self.locks),
      rules:                Arc::clone(&self.rules),
      validate_after_batch: self.validate_after_batch,
    }
  }
}

impl<S> Orchestrator<S>
where
  S: VaultStore + 'static,
{
  pub fn new(store: Arc<S>, catalog: MappingCatalog) -> Self {
    Self {
      store,
      catalog: Arc::new(catalog),
      locks: Arc::new(KeyLocks::new()),
      rules: Arc::new(ValidationRules::default()),
      validate_after_batch: true,
    }
  }

  pub fn with_validation_rules(mut self, rules: ValidationRules) -> Self {
    self.rules = Arc::new(rules);
    self
  }

  /// Whether [`Self::run_batch`] validates the vault once its loads finish.
  pub fn with_validation_after_batch(mut self, enabled: bool) -> Self {
    self.validate_after_batch = enabled;
    self
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn catalog(&self) -> &MappingCatalog { &self.catalog }

  /// Load `record_set` from `source_system` with load timestamp `as_of`.
  pub async fn run_batch(
    &self,
    source_system: &str,
    record_set: RecordSet,
    as_of: DateTime<Utc>,
  ) -> Result<BatchReport, BatchAbortedError> {
    self
      .run_batch_with_cancel(source_system, record_set, as_of, CancellationToken::new())
      .await
  }

  /// As [`Self::run_batch`], stopping early once `cancel` fires. A store
  /// call or lock wait in flight is abandoned, not awaited.
  #[tracing::instrument(
    skip_all,
    fields(source_system = %source_system, table = %record_set.table),
  )]
  pub async fn run_batch_with_cancel(
    &self,
    source_system: &str,
    record_set: RecordSet,
    as_of: DateTime<Utc>,
    cancel: CancellationToken,
  ) -> Result<BatchReport, BatchAbortedError> {
    let RecordSet { table, records } = record_set;
    let metadata = BatchMetadata::new(source_system, &table, as_of);
    let mut report = BatchReport::new(&metadata, &table, records.len());

    let Some(mapping) = self.catalog.find(source_system, &table).cloned() else {
      let cause = LoadError::UnknownSource {
        source_system: source_system.to_owned(),
        table,
      };
      return Err(self.abort(report, cause, false).await);
    };

    let ctx = BatchContext::with_cancel(metadata, cancel);
    info!(
      batch_id = %ctx.metadata.batch_id,
      load_ts = %ctx.metadata.load_ts,
      records = records.len(),
      "batch started"
    );

    if let Err(err) = self
      .store
      .record_batch_started(ctx.metadata.clone(), table)
      .await
    {
      return Err(self.abort(report, LoadError::storage(err), false).await);
    }

    if let Err(cause) = self.run_steps(&mapping, records, &ctx, &mut report).await {
      return Err(self.abort(report, cause, true).await);
    }

    if let Err(cause) = self.finish(&report, BatchStatus::Completed).await {
      return Err(self.abort(report, cause, true).await);
    }

    info!(
      batch_id = %report.batch_id,
      inserted = report.inserted(),
      issues = report.issues().count(),
      "batch completed"
    );
    Ok(report)
  }

  /// Validate a consistent snapshot of the whole vault.
  pub async fn validate(&self) -> Result<ValidationReport> {
    let snapshot = self.store.snapshot().await.map_err(LoadError::storage)?;
    Ok(validate::validate(&snapshot, &self.rules))
  }

  async fn run_steps(
    &self,
    mapping: &SourceMapping,
    records: Vec<Record>,
    ctx: &BatchContext,
    report: &mut BatchReport,
  ) -> Result<()> {
    let records = Arc::new(records);

    ctx.check_cancelled()?;
    let hubs = self.load_hubs(mapping, &records, ctx).await;
    let mut first_error = None;
    for result in hubs {
      match result {
        Ok(outcome) => report.hubs.push(outcome),
        Err(err) => {
          first_error.get_or_insert(err);
        }
      }
    }
    if let Some(err) = first_error {
      return Err(err);
    }

    for link in &mapping.links {
      ctx.check_cancelled()?;
      let outcome = load_link(&*self.store, link, &records, ctx).await?;
      report.links.push(outcome);
    }

    for sat in &mapping.satellites {
      ctx.check_cancelled()?;
      let parent = mapping.parent_of(sat)?;
      let outcome =
        load_satellite(&*self.store, &self.locks, sat, parent, &records, ctx).await?;
      report.satellites.push(outcome);
    }

    if self.validate_after_batch {
      ctx.check_cancelled()?;
      report.validation = Some(ctx.or_cancel(self.validate()).await??);
    }
    Ok(())
  }

  /// Run every hub loader of `mapping` concurrently. Results come back in
  /// mapping order.
  async fn load_hubs(
    &self,
    mapping: &SourceMapping,
    records: &Arc<Vec<Record>>,
    ctx: &BatchContext,
  ) -> Vec<Result<HubLoadOutcome>> {
    let mut set = JoinSet::new();
    for (position, hub) in mapping.hubs.iter().enumerate() {
      let store = Arc::clone(&self.store);
      let records = Arc::clone(records);
      let hub = hub.clone();
      let ctx = ctx.clone();
      set.spawn(async move { (position, load_hub(&*store, &hub, &records, &ctx).await) });
    }

    let mut results = Vec::with_capacity(mapping.hubs.len());
    while let Some(joined) = set.join_next().await {
      match joined {
        Ok(result) => results.push(result),
        Err(err) => results.push((usize::MAX, Err(LoadError::Task(err.to_string())))),
      }
    }
    results.sort_by_key(|(position, _)| *position);
    results.into_iter().map(|(_, result)| result).collect()
  }

  async fn finish(&self, report: &BatchReport, status: BatchStatus) -> Result<()> {
    let outcome = BatchOutcome {
      batch_id: report.batch_id,
      status,
      finished_at: Utc::now(),
      report: serde_json::to_value(report)?,
    };
    self
      .store
      .record_batch_finished(outcome)
      .await
      .map_err(LoadError::storage)
  }

  /// Close out a failed batch. The ledger write is best effort: the store
  /// may be the thing that failed.
  async fn abort(
    &self,
    mut report: BatchReport,
    cause: LoadError,
    started: bool,
  ) -> BatchAbortedError {
    report.aborted = Some(cause.to_string());
    error!(batch_id = %report.batch_id, %cause, "batch aborted");

    if started && let Err(err) = self.finish(&report, BatchStatus::Aborted).await {
      warn!(batch_id = %report.batch_id, %err, "could not record aborted batch");
    }

    BatchAbortedError {
      batch_id: report.batch_id,
      cause,
      report: Box::new(report),
    }
  }
}
