//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. UUIDs are stored as
//! hyphenated lowercase strings. Enums are stored by their lowercase name.

use chrono::{DateTime, Utc};
use lectern_core::{
  identity::{Identity, Role},
  payment::PaymentRecord,
  selection::Selection,
  subject::{Subject, SubjectStatus},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const IDENTITY_COLUMNS: &str = "email, role, name, photo_url, created_at";

/// Raw strings read directly from an `identities` row.
pub struct RawIdentity {
  pub email:      String,
  pub role:       String,
  pub name:       Option<String>,
  pub photo_url:  Option<String>,
  pub created_at: String,
}

impl RawIdentity {
  /// Read a row selected with [`IDENTITY_COLUMNS`].
  pub fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      email:      row.get(0)?,
      role:       row.get(1)?,
      name:       row.get(2)?,
      photo_url:  row.get(3)?,
      created_at: row.get(4)?,
    })
  }

  pub fn into_identity(self) -> Result<Identity> {
    Ok(Identity {
      email:      self.email,
      role:       self.role.parse::<Role>()?,
      name:       self.name,
      photo_url:  self.photo_url,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub const SUBJECT_COLUMNS: &str = "subject_id, instructor_email, title, price, \
  available_seats, enrolled_count, status, feedback, created_at";

/// Raw values read directly from a `subjects` row.
pub struct RawSubject {
  pub subject_id:       String,
  pub instructor_email: String,
  pub title:            String,
  pub price:            f64,
  pub available_seats:  u32,
  pub enrolled_count:   u32,
  pub status:           String,
  pub feedback:         Option<String>,
  pub created_at:       String,
}

impl RawSubject {
  /// Read a row selected with [`SUBJECT_COLUMNS`].
  pub fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subject_id:       row.get(0)?,
      instructor_email: row.get(1)?,
      title:            row.get(2)?,
      price:            row.get(3)?,
      available_seats:  row.get(4)?,
      enrolled_count:   row.get(5)?,
      status:           row.get(6)?,
      feedback:         row.get(7)?,
      created_at:       row.get(8)?,
    })
  }

  pub fn into_subject(self) -> Result<Subject> {
    Ok(Subject {
      subject_id:       decode_uuid(&self.subject_id)?,
      instructor_email: self.instructor_email,
      title:            self.title,
      price:            self.price,
      available_seats:  self.available_seats,
      enrolled_count:   self.enrolled_count,
      status:           self.status.parse::<SubjectStatus>()?,
      feedback:         self.feedback,
      created_at:       decode_dt(&self.created_at)?,
    })
  }
}

pub const SELECTION_COLUMNS: &str =
  "selection_id, student_email, subject_id, price_snapshot, created_at";

/// Raw values read directly from a `selections` row.
pub struct RawSelection {
  pub selection_id:   String,
  pub student_email:  String,
  pub subject_id:     String,
  pub price_snapshot: f64,
  pub created_at:     String,
}

impl RawSelection {
  /// Read a row selected with [`SELECTION_COLUMNS`].
  pub fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      selection_id:   row.get(0)?,
      student_email:  row.get(1)?,
      subject_id:     row.get(2)?,
      price_snapshot: row.get(3)?,
      created_at:     row.get(4)?,
    })
  }

  pub fn into_selection(self) -> Result<Selection> {
    Ok(Selection {
      selection_id:   decode_uuid(&self.selection_id)?,
      student_email:  self.student_email,
      subject_id:     decode_uuid(&self.subject_id)?,
      price_snapshot: self.price_snapshot,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}

pub const PAYMENT_COLUMNS: &str = "payment_id, email, subject_id, selection_id, \
  amount, reservation_handle, recorded_at";

/// Raw values read directly from a `payments` row.
pub struct RawPayment {
  pub payment_id:         String,
  pub email:              String,
  pub subject_id:         String,
  pub selection_id:       String,
  pub amount:             i64,
  pub reservation_handle: String,
  pub recorded_at:        String,
}

impl RawPayment {
  /// Read a row selected with [`PAYMENT_COLUMNS`].
  pub fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      payment_id:         row.get(0)?,
      email:              row.get(1)?,
      subject_id:         row.get(2)?,
      selection_id:       row.get(3)?,
      amount:             row.get(4)?,
      reservation_handle: row.get(5)?,
      recorded_at:        row.get(6)?,
    })
  }

  pub fn into_payment(self) -> Result<PaymentRecord> {
    Ok(PaymentRecord {
      payment_id:         decode_uuid(&self.payment_id)?,
      email:              self.email,
      subject_id:         decode_uuid(&self.subject_id)?,
      selection_id:       decode_uuid(&self.selection_id)?,
      amount:             self.amount,
      reservation_handle: self.reservation_handle,
      recorded_at:        decode_dt(&self.recorded_at)?,
    })
  }
}
