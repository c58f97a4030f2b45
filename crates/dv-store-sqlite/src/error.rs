//! Error type for `dv-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] dv_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown batch status: {0:?}")]
  UnknownBatchStatus(String),

  /// A link row was read without any participant rows.
  #[error("link {0} has no participants")]
  LinkWithoutParticipants(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
