//! The enrollment settlement workflow.
//!
//! Turns a confirmed payment reservation into a committed enrollment. The
//! store does the atomic part (selection removed, seat moved, payment recorded
//! in one transaction); this module wraps it with the checks and limits that
//! live outside the store:
//!
//! 1. the command's email must be the caller's,
//! 2. the gateway must report the reservation paid for exactly `amount`,
//! 3. settlements for the same subject run one at a time,
//! 4. each store attempt is bounded by a timeout and retried a fixed number
//!    of times.
//!
//! Each attempt hands the store a deadline. A transaction still running when
//! its deadline passes rolls back instead of committing, so an attempt the
//! workflow gave up on leaves nothing behind. The workflow waits a short grace
//! period past the deadline to hear back from a commit that just made it. A
//! retry of a committed settlement comes back as a replay of the original
//! payment record.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError},
  time::{Duration, Instant},
};

use lectern_core::{
  gateway::{PaymentGateway, ReservationStatus},
  payment::{PaymentRecord, Rejection, SettleOutcome, SettlementCommand},
  store::MarketplaceStore,
};
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Error;

const RETRY_BACKOFF: Duration = Duration::from_millis(50);
/// How long past an attempt's deadline to wait for the store's answer.
const COMMIT_GRACE: Duration = Duration::from_millis(250);

/// What a successful settlement hands back to the caller.
#[derive(Debug, Clone)]
pub struct SettlementReceipt {
  pub payment:  PaymentRecord,
  /// `true` when the payment was already recorded by an earlier request.
  pub replayed: bool,
}

// ─── Per-subject serialisation ────────────────────────────────────────────────

/// One async mutex per subject, created on demand.
#[derive(Default)]
struct SubjectLocks {
  inner: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl SubjectLocks {
  async fn acquire(&self, subject_id: Uuid) -> OwnedMutexGuard<()> {
    let lock = {
      let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
      // Drop entries nobody is holding or waiting on.
      map.retain(|_, l| Arc::strong_count(l) > 1);
      map.entry(subject_id).or_default().clone()
    };
    lock.lock_owned().await
  }
}

// ─── Workflow ─────────────────────────────────────────────────────────────────

pub struct SettlementWorkflow {
  timeout:  Duration,
  attempts: u32,
  backoff:  Duration,
  locks:    SubjectLocks,
}

impl SettlementWorkflow {
  /// `attempts` counts the first try; zero is treated as one.
  pub fn new(timeout: Duration, attempts: u32) -> Self {
    Self {
      timeout,
      attempts: attempts.max(1),
      backoff: RETRY_BACKOFF,
      locks: SubjectLocks::default(),
    }
  }

  pub fn timeout(&self) -> Duration { self.timeout }

  pub fn attempts(&self) -> u32 { self.attempts }

  /// Settle `command` on behalf of `caller_email`.
  pub async fn settle<S, G>(
    &self,
    store: &S,
    gateway: &G,
    caller_email: &str,
    command: SettlementCommand,
  ) -> Result<SettlementReceipt, Error>
  where
    S: MarketplaceStore,
    G: PaymentGateway,
  {
    if command.email != caller_email {
      return Err(Error::Forbidden(
        "payments can only be settled for your own account".to_string(),
      ));
    }
    if command.amount <= 0 {
      return Err(Error::BadRequest(format!(
        "amount must be positive, got {}",
        command.amount
      )));
    }

    self.check_reservation(gateway, &command).await?;

    let _guard = self.locks.acquire(command.subject_id).await;

    let mut last_failure = String::new();
    for attempt in 1..=self.attempts {
      let attempt_command = SettlementCommand {
        deadline: Some(Instant::now() + self.timeout),
        ..command.clone()
      };
      let wait = self.timeout + COMMIT_GRACE;
      match tokio::time::timeout(wait, store.settle(attempt_command)).await {
        Ok(Ok(outcome)) => return finish(outcome, &command),
        Ok(Err(e)) => {
          warn!(
            attempt,
            subject_id = %command.subject_id,
            error = %e,
            "settlement attempt failed"
          );
          last_failure = e.to_string();
        }
        Err(_) => {
          warn!(
            attempt,
            subject_id = %command.subject_id,
            timeout_ms = self.timeout.as_millis() as u64,
            "settlement attempt timed out"
          );
          last_failure = format!("timed out after {}ms", self.timeout.as_millis());
        }
      }
      if attempt < self.attempts {
        tokio::time::sleep(self.backoff * attempt).await;
      }
    }

    Err(Error::SettlementFailed(format!(
      "gave up after {} attempts: {last_failure}",
      self.attempts
    )))
  }

  async fn check_reservation<G: PaymentGateway>(
    &self,
    gateway: &G,
    command: &SettlementCommand,
  ) -> Result<(), Error> {
    let status = gateway
      .status(&command.reservation_handle)
      .await
      .map_err(|e| Error::Adapter(e.to_string()))?;

    match status {
      ReservationStatus::Confirmed { amount } if amount == command.amount => Ok(()),
      ReservationStatus::Confirmed { amount } => Err(Error::PaymentRequired(format!(
        "reservation was paid for {amount}, not {}",
        command.amount
      ))),
      ReservationStatus::Pending => Err(Error::PaymentRequired(
        "reservation has not been paid".to_string(),
      )),
      ReservationStatus::Canceled => Err(Error::PaymentRequired(
        "reservation was cancelled".to_string(),
      )),
      ReservationStatus::Unknown => Err(Error::Adapter(format!(
        "gateway does not know reservation {}",
        command.reservation_handle
      ))),
    }
  }
}

fn finish(outcome: SettleOutcome, command: &SettlementCommand) -> Result<SettlementReceipt, Error> {
  match outcome {
    SettleOutcome::Settled(payment) => {
      info!(
        payment_id = %payment.payment_id,
        subject_id = %payment.subject_id,
        email = %payment.email,
        amount = payment.amount,
        "enrollment settled"
      );
      Ok(SettlementReceipt { payment, replayed: false })
    }
    SettleOutcome::Replayed(payment) => {
      info!(payment_id = %payment.payment_id, "settlement replayed");
      Ok(SettlementReceipt { payment, replayed: true })
    }
    SettleOutcome::Rejected(rejection) => Err(match rejection {
      Rejection::SoldOut => Error::SoldOut(command.subject_id),
      Rejection::SelectionNotFound => {
        Error::NotFound(format!("selection {}", command.selection_id))
      }
      Rejection::SubjectNotFound => {
        Error::NotFound(format!("subject {}", command.subject_id))
      }
      Rejection::SelectionMismatch => Error::Forbidden(
        "selection belongs to another account or subject".to_string(),
      ),
      Rejection::AmountMismatch => Error::PaymentRequired(format!(
        "amount {} does not match the price of selection {}",
        command.amount, command.selection_id
      )),
      Rejection::SubjectNotApproved => Error::Conflict(format!(
        "subject {} is not open for enrollment",
        command.subject_id
      )),
      Rejection::IdempotencyConflict => Error::Conflict(format!(
        "reservation {} was already used for another enrollment",
        command.reservation_handle
      )),
    }),
  }
}
