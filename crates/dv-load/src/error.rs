//! Error types for `dv-load`.
//!
//! Only systemic failures are errors here. Per-record problems are
//! [`crate::report::RecordIssue`]s and never abort a batch.

use thiserror::Error;
use uuid::Uuid;

use crate::report::BatchReport;

#[derive(Debug, Error)]
pub enum LoadError {
  /// The store failed; the current batch cannot continue.
  #[error("storage unavailable: {0}")]
  StorageUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("batch cancelled")]
  Cancelled,

  #[error("no mapping for source {source_system}.{table}")]
  UnknownSource {
    source_system: String,
    table:         String,
  },

  #[error("mapping error: {0}")]
  Mapping(#[from] dv_core::Error),

  #[error("loader task failed: {0}")]
  Task(String),

  #[error("report serialization failed: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl LoadError {
  pub fn storage<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::StorageUnavailable(Box::new(err))
  }
}

/// A batch stopped before completing. Rows committed before the abort stay
/// in the vault; re-running the batch is the recovery path.
#[derive(Debug, Error)]
#[error("batch {batch_id} aborted: {cause}")]
pub struct BatchAbortedError {
  pub batch_id: Uuid,
  #[source]
  pub cause:    LoadError,
  /// Everything the batch accomplished before it stopped.
  pub report:   Box<BatchReport>,
}

pub type Result<T, E = LoadError> = std::result::Result<T, E>;
