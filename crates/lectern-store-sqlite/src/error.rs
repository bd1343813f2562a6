//! Error type for `lectern-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] lectern_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// The settlement deadline passed before the transaction could commit.
  /// Nothing was written.
  #[error("settlement deadline passed before commit")]
  DeadlineExceeded,

  /// A just-written row could not be read back.
  #[error("row vanished after write: {0}")]
  Vanished(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
