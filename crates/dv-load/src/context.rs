//! Per-batch context handed to every loader.

use std::future::Future;

use dv_core::model::BatchMetadata;
use tokio_util::sync::CancellationToken;

use crate::{LoadError, Result};

/// Batch metadata plus the token that cancels the batch. Cancelling stops a
/// batch at the next record boundary or pending await; rows already written
/// are kept.
#[derive(Debug, Clone)]
pub struct BatchContext {
  pub metadata: BatchMetadata,
  pub cancel:   CancellationToken,
}

impl BatchContext {
  pub fn new(metadata: BatchMetadata) -> Self {
    Self::with_cancel(metadata, CancellationToken::new())
  }

  pub fn with_cancel(metadata: BatchMetadata, cancel: CancellationToken) -> Self {
    Self { metadata, cancel }
  }

  pub fn check_cancelled(&self) -> Result<()> {
    if self.cancel.is_cancelled() {
      return Err(LoadError::Cancelled);
    }
    Ok(())
  }

  /// Await `fut` unless the batch is cancelled first.
  pub async fn or_cancel<F: Future>(&self, fut: F) -> Result<F::Output> {
    tokio::select! {
      biased;
      _ = self.cancel.cancelled() => Err(LoadError::Cancelled),
      out = fut => Ok(out),
    }
  }
}
