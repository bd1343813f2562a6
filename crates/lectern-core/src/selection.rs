//! Selection: a student's intent to enroll, held until paid or cancelled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A pending selection. Several may exist for the same (student, subject).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
  pub selection_id:   Uuid,
  pub student_email:  String,
  pub subject_id:     Uuid,
  /// The subject's price when the selection was made, in major units.
  pub price_snapshot: f64,
  pub created_at:     DateTime<Utc>,
}

/// Input to [`crate::store::MarketplaceStore::select`].
#[derive(Debug, Clone)]
pub struct NewSelection {
  pub student_email:  String,
  pub subject_id:     Uuid,
  pub price_snapshot: f64,
}
