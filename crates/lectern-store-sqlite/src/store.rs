//! [`SqliteStore`], the SQLite implementation of [`MarketplaceStore`].

use std::{path::Path, time::{Duration, Instant}};

use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use lectern_core::{
  identity::{Identity, NewIdentity, Role},
  payment::{PaymentRecord, Rejection, SettleOutcome, SettlementCommand, minor_units},
  selection::{NewSelection, Selection},
  store::MarketplaceStore,
  subject::{NewSubject, Subject, SubjectStatus},
};

use crate::{
  encode::{
    encode_dt, encode_uuid, RawIdentity, RawPayment, RawSelection, RawSubject,
    IDENTITY_COLUMNS, PAYMENT_COLUMNS, SELECTION_COLUMNS, SUBJECT_COLUMNS,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Lectern store backed by a single SQLite file.
///
/// Clones share one connection thread.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// What the settlement transaction observed, before decoding.
enum RawSettle {
  Committed,
  Existing(RawPayment),
  Rejected(Rejection),
  Expired,
}

fn past(deadline: Option<Instant>) -> bool {
  deadline.is_some_and(|d| Instant::now() >= d)
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// How long a write waits on another connection's lock before failing.
  pub async fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.busy_timeout(timeout)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn fetch_subject(&self, id: Uuid) -> Result<Option<Subject>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawSubject> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {SUBJECT_COLUMNS} FROM subjects WHERE subject_id = ?1"),
            rusqlite::params![id_str],
            RawSubject::read,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSubject::into_subject).transpose()
  }

  async fn fetch_identity(&self, email: String) -> Result<Option<Identity>> {
    let raw: Option<RawIdentity> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE email = ?1"),
            rusqlite::params![email],
            RawIdentity::read,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawIdentity::into_identity).transpose()
  }
}

// ─── MarketplaceStore impl ───────────────────────────────────────────────────

impl MarketplaceStore for SqliteStore {
  type Error = Error;

  // ── Identities ────────────────────────────────────────────────────────────

  async fn upsert_identity(&self, input: NewIdentity) -> Result<Identity> {
    let email    = input.email.clone();
    let role_str = input.role.as_str().to_owned();
    let at_str   = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO identities (email, role, name, photo_url, password_hash, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (email) DO UPDATE SET
             name      = COALESCE(excluded.name, identities.name),
             photo_url = COALESCE(excluded.photo_url, identities.photo_url)",
          rusqlite::params![
            input.email,
            role_str,
            input.name,
            input.photo_url,
            input.password_hash,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    self
      .fetch_identity(email.clone())
      .await?
      .ok_or(Error::Vanished(email))
  }

  async fn get_identity(&self, email: &str) -> Result<Option<Identity>> {
    self.fetch_identity(email.to_owned()).await
  }

  async fn password_hash(&self, email: &str) -> Result<Option<String>> {
    let email = email.to_owned();

    let hash: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT password_hash FROM identities WHERE email = ?1",
            rusqlite::params![email],
            |row| row.get(0),
          )
          .optional()?)
      })
      .await?;

    Ok(hash)
  }

  async fn set_role(&self, email: &str, role: Role) -> Result<Option<Identity>> {
    let email_owned = email.to_owned();
    let role_str    = role.as_str().to_owned();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE identities SET role = ?2 WHERE email = ?1",
          rusqlite::params![email_owned, role_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Ok(None);
    }
    self.fetch_identity(email.to_owned()).await
  }

  async fn list_identities(&self) -> Result<Vec<Identity>> {
    let raws: Vec<RawIdentity> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {IDENTITY_COLUMNS} FROM identities ORDER BY created_at, email"
        ))?;
        let rows = stmt
          .query_map([], RawIdentity::read)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawIdentity::into_identity).collect()
  }

  // ── Subjects ──────────────────────────────────────────────────────────────

  async fn add_subject(&self, input: NewSubject) -> Result<Subject> {
    let subject = Subject {
      subject_id:       Uuid::new_v4(),
      instructor_email: input.instructor_email,
      title:            input.title,
      price:            input.price,
      available_seats:  input.available_seats,
      enrolled_count:   0,
      status:           SubjectStatus::Pending,
      feedback:         None,
      created_at:       Utc::now(),
    };

    let id_str     = encode_uuid(subject.subject_id);
    let email      = subject.instructor_email.clone();
    let title      = subject.title.clone();
    let price      = subject.price;
    let seats      = subject.available_seats;
    let status_str = subject.status.as_str().to_owned();
    let at_str     = encode_dt(subject.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO subjects (
             subject_id, instructor_email, title, price,
             available_seats, enrolled_count, status, feedback, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, NULL, ?7)",
          rusqlite::params![id_str, email, title, price, seats, status_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(subject)
  }

  async fn get_subject(&self, id: Uuid) -> Result<Option<Subject>> {
    self.fetch_subject(id).await
  }

  async fn list_subjects(&self, status: Option<SubjectStatus>) -> Result<Vec<Subject>> {
    let status_str = status.map(|s| s.as_str().to_owned());

    let raws: Vec<RawSubject> = self
      .conn
      .call(move |conn| {
        let rows = if let Some(s) = status_str {
          let mut stmt = conn.prepare(&format!(
            "SELECT {SUBJECT_COLUMNS} FROM subjects WHERE status = ?1 ORDER BY created_at"
          ))?;
          stmt
            .query_map(rusqlite::params![s], RawSubject::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(&format!(
            "SELECT {SUBJECT_COLUMNS} FROM subjects ORDER BY created_at"
          ))?;
          stmt
            .query_map([], RawSubject::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSubject::into_subject).collect()
  }

  async fn approve_subject(&self, id: Uuid) -> Result<Option<Subject>> {
    let id_str = encode_uuid(id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE subjects SET status = 'approved' WHERE subject_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Ok(None);
    }
    self.fetch_subject(id).await
  }

  async fn set_feedback(&self, id: Uuid, feedback: String) -> Result<Option<Subject>> {
    let id_str = encode_uuid(id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE subjects SET feedback = ?2 WHERE subject_id = ?1",
          rusqlite::params![id_str, feedback],
        )?)
      })
      .await?;

    if changed == 0 {
      return Ok(None);
    }
    self.fetch_subject(id).await
  }

  // ── Selections ────────────────────────────────────────────────────────────

  async fn select(&self, input: NewSelection) -> Result<Selection> {
    let selection = Selection {
      selection_id:   Uuid::new_v4(),
      student_email:  input.student_email,
      subject_id:     input.subject_id,
      price_snapshot: input.price_snapshot,
      created_at:     Utc::now(),
    };

    let id_str         = encode_uuid(selection.selection_id);
    let email          = selection.student_email.clone();
    let subject_id_str = encode_uuid(selection.subject_id);
    let price          = selection.price_snapshot;
    let at_str         = encode_dt(selection.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO selections (selection_id, student_email, subject_id, price_snapshot, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, email, subject_id_str, price, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(selection)
  }

  async fn get_selection(&self, id: Uuid) -> Result<Option<Selection>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawSelection> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {SELECTION_COLUMNS} FROM selections WHERE selection_id = ?1"),
            rusqlite::params![id_str],
            RawSelection::read,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSelection::into_selection).transpose()
  }

  async fn list_selections(&self, student_email: &str) -> Result<Vec<Selection>> {
    let email = student_email.to_owned();

    let raws: Vec<RawSelection> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SELECTION_COLUMNS} FROM selections
           WHERE student_email = ?1 ORDER BY created_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![email], RawSelection::read)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSelection::into_selection).collect()
  }

  async fn cancel_selection(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM selections WHERE selection_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;

    Ok(removed > 0)
  }

  // ── Settlement ────────────────────────────────────────────────────────────

  async fn settle(&self, command: SettlementCommand) -> Result<SettleOutcome> {
    let record = PaymentRecord {
      payment_id:         Uuid::new_v4(),
      email:              command.email.clone(),
      subject_id:         command.subject_id,
      selection_id:       command.selection_id,
      amount:             command.amount,
      reservation_handle: command.reservation_handle.clone(),
      recorded_at:        Utc::now(),
    };

    let payment_id_str   = encode_uuid(record.payment_id);
    let selection_id_str = encode_uuid(command.selection_id);
    let subject_id_str   = encode_uuid(command.subject_id);
    let email            = command.email.clone();
    let handle           = command.reservation_handle.clone();
    let amount           = command.amount;
    let at_str           = encode_dt(record.recorded_at);
    let deadline         = command.deadline;

    // Every early return drops `tx`, which rolls back anything written so far.
    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if past(deadline) {
          return Ok(RawSettle::Expired);
        }

        let existing = tx
          .query_row(
            &format!(
              "SELECT {PAYMENT_COLUMNS} FROM payments
               WHERE reservation_handle = ?1 OR selection_id = ?2"
            ),
            rusqlite::params![handle, selection_id_str],
            RawPayment::read,
          )
          .optional()?;
        if let Some(raw) = existing {
          return Ok(RawSettle::Existing(raw));
        }

        let owner: Option<(String, String, f64)> = tx
          .query_row(
            "SELECT student_email, subject_id, price_snapshot
             FROM selections WHERE selection_id = ?1",
            rusqlite::params![selection_id_str],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
          )
          .optional()?;
        match owner {
          None => return Ok(RawSettle::Rejected(Rejection::SelectionNotFound)),
          Some((student, subject, _)) if student != email || subject != subject_id_str => {
            return Ok(RawSettle::Rejected(Rejection::SelectionMismatch));
          }
          Some((_, _, price)) if minor_units(price).ok() != Some(amount) => {
            return Ok(RawSettle::Rejected(Rejection::AmountMismatch));
          }
          Some(_) => {}
        }

        tx.execute(
          "DELETE FROM selections WHERE selection_id = ?1",
          rusqlite::params![selection_id_str],
        )?;

        let seated = tx.execute(
          "UPDATE subjects
           SET available_seats = available_seats - 1,
               enrolled_count  = enrolled_count + 1
           WHERE subject_id = ?1
             AND status = 'approved'
             AND available_seats > 0",
          rusqlite::params![subject_id_str],
        )?;
        if seated == 0 {
          let status: Option<String> = tx
            .query_row(
              "SELECT status FROM subjects WHERE subject_id = ?1",
              rusqlite::params![subject_id_str],
              |row| row.get(0),
            )
            .optional()?;
          let rejection = match status.as_deref() {
            None => Rejection::SubjectNotFound,
            Some("approved") => Rejection::SoldOut,
            Some(_) => Rejection::SubjectNotApproved,
          };
          return Ok(RawSettle::Rejected(rejection));
        }

        tx.execute(
          "INSERT INTO payments (
             payment_id, email, subject_id, selection_id,
             amount, reservation_handle, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            payment_id_str,
            email,
            subject_id_str,
            selection_id_str,
            amount,
            handle,
            at_str,
          ],
        )?;

        if past(deadline) {
          return Ok(RawSettle::Expired);
        }
        tx.commit()?;
        Ok(RawSettle::Committed)
      })
      .await?;

    match raw {
      RawSettle::Committed => Ok(SettleOutcome::Settled(record)),
      RawSettle::Rejected(rejection) => Ok(SettleOutcome::Rejected(rejection)),
      RawSettle::Expired => Err(Error::DeadlineExceeded),
      RawSettle::Existing(raw) => {
        let existing = raw.into_payment()?;
        let same = existing.reservation_handle == command.reservation_handle
          && existing.selection_id == command.selection_id
          && existing.email == command.email;
        if same {
          Ok(SettleOutcome::Replayed(existing))
        } else {
          Ok(SettleOutcome::Rejected(Rejection::IdempotencyConflict))
        }
      }
    }
  }

  async fn list_payments(&self, email: &str) -> Result<Vec<PaymentRecord>> {
    let email = email.to_owned();

    let raws: Vec<RawPayment> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PAYMENT_COLUMNS} FROM payments WHERE email = ?1 ORDER BY recorded_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![email], RawPayment::read)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPayment::into_payment).collect()
  }
}
