//! Error types for `lectern-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown role: {0:?}")]
  UnknownRole(String),

  #[error("unknown subject status: {0:?}")]
  UnknownStatus(String),

  #[error("invalid email address: {0:?}")]
  InvalidEmail(String),

  /// A price that cannot be expressed as a non-negative amount of minor units.
  #[error("invalid price: {0}")]
  InvalidPrice(f64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
