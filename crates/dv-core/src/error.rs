//! Error types for `dv-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid digest {0:?}: expected 64 lowercase hex characters")]
  InvalidDigest(String),

  #[error("unknown parent kind: {0:?}")]
  UnknownParentKind(String),

  #[error("invalid source mapping {source_system}.{table}: {reason}")]
  InvalidMapping {
    source_system: String,
    table:         String,
    reason:        String,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
