//! Subject: a course offered by an instructor, with its seat counters.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Approval state of a subject. Only ever advances `Pending` → `Approved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectStatus {
  Pending,
  Approved,
}

impl SubjectStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Approved => "approved",
    }
  }
}

impl FromStr for SubjectStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "pending" => Ok(Self::Pending),
      "approved" => Ok(Self::Approved),
      other => Err(Error::UnknownStatus(other.to_owned())),
    }
  }
}

/// A subject record.
///
/// `available_seats + enrolled_count` is constant once the subject exists;
/// settlement moves one seat from the first counter to the second.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
  pub subject_id:       Uuid,
  pub instructor_email: String,
  pub title:            String,
  /// Price in the currency's major unit.
  pub price:            f64,
  pub available_seats:  u32,
  pub enrolled_count:   u32,
  pub status:           SubjectStatus,
  /// Admin feedback on the submission, if any.
  pub feedback:         Option<String>,
  pub created_at:       DateTime<Utc>,
}

impl Subject {
  /// Total seats the subject was created with.
  pub fn capacity(&self) -> u32 { self.available_seats + self.enrolled_count }
}

/// Input to [`crate::store::MarketplaceStore::add_subject`]. New subjects are
/// always `Pending` with no enrollments.
#[derive(Debug, Clone)]
pub struct NewSubject {
  pub instructor_email: String,
  pub title:            String,
  pub price:            f64,
  pub available_seats:  u32,
}
