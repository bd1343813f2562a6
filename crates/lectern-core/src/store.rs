//! The `MarketplaceStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `lectern-store-sqlite`).
//! `lectern-server` depends on this abstraction, not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  identity::{Identity, NewIdentity, Role},
  payment::{PaymentRecord, SettleOutcome, SettlementCommand},
  selection::{NewSelection, Selection},
  subject::{NewSubject, Subject, SubjectStatus},
};

/// Abstraction over a Lectern storage backend.
///
/// Identities and subjects are plain keyed records. Selections are deleted
/// only by their owner or by [`settle`](MarketplaceStore::settle). Payment
/// records are append-only and are only ever written by `settle`.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait MarketplaceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Identities ────────────────────────────────────────────────────────

  /// Create the identity if its email is new, otherwise refresh its profile
  /// fields. Never changes the role or password hash of an existing row.
  fn upsert_identity(
    &self,
    input: NewIdentity,
  ) -> impl Future<Output = Result<Identity, Self::Error>> + Send + '_;

  /// Retrieve an identity by (normalised) email. Returns `None` if not found.
  fn get_identity<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<Identity>, Self::Error>> + Send + 'a;

  /// The stored argon2 PHC string for `email`, if the identity exists.
  fn password_hash<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + 'a;

  /// Replace the role of an existing identity. Returns `None` if not found.
  fn set_role<'a>(
    &'a self,
    email: &'a str,
    role: Role,
  ) -> impl Future<Output = Result<Option<Identity>, Self::Error>> + Send + 'a;

  fn list_identities(
    &self,
  ) -> impl Future<Output = Result<Vec<Identity>, Self::Error>> + Send + '_;

  // ── Subjects ──────────────────────────────────────────────────────────

  /// Persist a new `Pending` subject with zero enrollments.
  fn add_subject(
    &self,
    input: NewSubject,
  ) -> impl Future<Output = Result<Subject, Self::Error>> + Send + '_;

  fn get_subject(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Subject>, Self::Error>> + Send + '_;

  /// List subjects, optionally filtered by status.
  fn list_subjects(
    &self,
    status: Option<SubjectStatus>,
  ) -> impl Future<Output = Result<Vec<Subject>, Self::Error>> + Send + '_;

  /// Mark a subject `Approved`. Idempotent. Returns `None` if not found.
  fn approve_subject(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Subject>, Self::Error>> + Send + '_;

  /// Record admin feedback without touching the status.
  fn set_feedback(
    &self,
    id: Uuid,
    feedback: String,
  ) -> impl Future<Output = Result<Option<Subject>, Self::Error>> + Send + '_;

  // ── Selections ────────────────────────────────────────────────────────

  /// Record a selection. No duplicate check is performed.
  fn select(
    &self,
    input: NewSelection,
  ) -> impl Future<Output = Result<Selection, Self::Error>> + Send + '_;

  fn get_selection(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Selection>, Self::Error>> + Send + '_;

  /// All selections held by `student_email`, oldest first.
  fn list_selections<'a>(
    &'a self,
    student_email: &'a str,
  ) -> impl Future<Output = Result<Vec<Selection>, Self::Error>> + Send + 'a;

  /// Delete a selection. Returns whether a row was removed; deleting an
  /// unknown id is not an error.
  fn cancel_selection(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Settlement ────────────────────────────────────────────────────────

  /// Atomically retire the selection, move one seat from `available_seats`
  /// to `enrolled_count`, and append a [`PaymentRecord`].
  ///
  /// Either every step takes effect or none does. A command whose
  /// reservation handle has already been settled returns
  /// [`SettleOutcome::Replayed`] without side effects. If the command's
  /// deadline passes before the commit, the transaction rolls back and an
  /// error is returned.
  fn settle(
    &self,
    command: SettlementCommand,
  ) -> impl Future<Output = Result<SettleOutcome, Self::Error>> + Send + '_;

  /// Payment history for `email`, oldest first.
  fn list_payments<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Vec<PaymentRecord>, Self::Error>> + Send + 'a;
}
