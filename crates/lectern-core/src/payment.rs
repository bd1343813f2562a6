//! Payment records and the settlement vocabulary shared by stores and the
//! workflow that drives them.
//!
//! A [`PaymentRecord`] is the durable proof of an enrollment. Records are
//! append-only: once written, no field is ever updated and no row is deleted.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Record ──────────────────────────────────────────────────────────────────

/// An immutable ledger entry written by a successful settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
  pub payment_id:         Uuid,
  pub email:              String,
  pub subject_id:         Uuid,
  /// The selection this payment retired.
  pub selection_id:       Uuid,
  /// Amount in the currency's minor unit (e.g. cents).
  pub amount:             i64,
  pub reservation_handle: String,
  /// Server-assigned; never changes after creation.
  pub recorded_at:        DateTime<Utc>,
}

// ─── Settlement ──────────────────────────────────────────────────────────────

/// Everything a store needs to run one settlement transaction.
///
/// The reservation handle doubles as the idempotency key: a store must never
/// hold two records with the same handle or the same selection.
#[derive(Debug, Clone)]
pub struct SettlementCommand {
  pub selection_id:       Uuid,
  pub subject_id:         Uuid,
  pub email:              String,
  pub amount:             i64,
  pub reservation_handle: String,
  /// Roll back instead of committing once this instant has passed.
  pub deadline:           Option<Instant>,
}

/// Why a store refused to settle. None of these leave partial state behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
  SelectionNotFound,
  SubjectNotFound,
  /// The selection exists but belongs to another student or subject.
  SelectionMismatch,
  /// The subject has not been approved yet.
  SubjectNotApproved,
  SoldOut,
  /// The amount paid is not the selection's price snapshot.
  AmountMismatch,
  /// The handle or selection was already settled with different details.
  IdempotencyConflict,
}

/// Result of [`crate::store::MarketplaceStore::settle`].
#[derive(Debug, Clone)]
pub enum SettleOutcome {
  /// The transaction committed and appended this record.
  Settled(PaymentRecord),
  /// An earlier attempt with the same key already committed; nothing changed.
  Replayed(PaymentRecord),
  Rejected(Rejection),
}

// ─── Amounts ─────────────────────────────────────────────────────────────────

/// Convert a major-unit price (e.g. dollars) into minor units (e.g. cents).
///
/// Rounds to the nearest minor unit so that `19.99` becomes `1999` rather than
/// `1998`.
pub fn minor_units(price: f64) -> Result<i64> {
  if !price.is_finite() || price < 0.0 {
    return Err(Error::InvalidPrice(price));
  }
  let cents = (price * 100.0).round();
  if cents > i64::MAX as f64 {
    return Err(Error::InvalidPrice(price));
  }
  Ok(cents as i64)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn minor_units_rounds_to_nearest_cent() {
    assert_eq!(minor_units(50.0).unwrap(), 5000);
    assert_eq!(minor_units(19.99).unwrap(), 1999);
    assert_eq!(minor_units(0.0).unwrap(), 0);
  }

  #[test]
  fn minor_units_rejects_negative_and_non_finite() {
    assert!(minor_units(-1.0).is_err());
    assert!(minor_units(f64::NAN).is_err());
    assert!(minor_units(f64::INFINITY).is_err());
  }
}
