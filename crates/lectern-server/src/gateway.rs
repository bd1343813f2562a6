//! An in-process [`PaymentGateway`] for development and tests.
//!
//! Reservations live in memory. A real deployment swaps this for a provider
//! adapter; the workflow only ever talks to the trait.
//!
//! Nothing in the HTTP API confirms a reservation. Unless the gateway is
//! auto-confirming, [`LocalGateway::confirm`] has to be called in-process.
//! Reservations that were never paid are dropped once they outlive
//! [`UNPAID_EXPIRY`].

use std::{
  collections::HashMap,
  sync::Arc,
  time::{Duration, Instant},
};

use lectern_core::gateway::{PaymentGateway, Reservation, ReservationStatus};
use rand_core::{OsRng, RngCore as _};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("reservation amount must be positive, got {0}")]
  InvalidAmount(i64),
  #[error("unknown reservation handle: {0}")]
  UnknownHandle(String),
  #[error("reservation {0} was cancelled")]
  Cancelled(String),
}

/// How long a pending or cancelled reservation is kept.
pub const UNPAID_EXPIRY: Duration = Duration::from_secs(60 * 60);

/// Reservations held by a [`LocalGateway`].
///
/// Clones share the same reservation table.
#[derive(Clone)]
pub struct LocalGateway {
  auto_confirm:  bool,
  unpaid_expiry: Duration,
  entries:       Arc<RwLock<HashMap<String, Entry>>>,
}

#[derive(Debug, Clone)]
struct Entry {
  reservation: Reservation,
  status:      ReservationStatus,
  created:     Instant,
}

impl Default for LocalGateway {
  fn default() -> Self {
    Self {
      auto_confirm:  false,
      unpaid_expiry: UNPAID_EXPIRY,
      entries:       Arc::default(),
    }
  }
}

impl LocalGateway {
  /// A gateway whose reservations stay pending until [`confirm`](Self::confirm)
  /// is called.
  pub fn new() -> Self { Self::default() }

  /// A gateway that reports every reservation as paid as soon as it exists.
  pub fn auto_confirming() -> Self {
    Self { auto_confirm: true, ..Self::default() }
  }

  /// Keep unpaid reservations for `expiry` instead of [`UNPAID_EXPIRY`].
  pub fn with_unpaid_expiry(mut self, expiry: Duration) -> Self {
    self.unpaid_expiry = expiry;
    self
  }

  /// Mark a reservation as paid for its full amount, as the provider would
  /// once the client completes checkout.
  pub async fn confirm(&self, handle: &str) -> Result<Reservation, GatewayError> {
    let mut entries = self.entries.write().await;
    let entry = entries
      .get_mut(handle)
      .ok_or_else(|| GatewayError::UnknownHandle(handle.to_owned()))?;
    if entry.status == ReservationStatus::Canceled {
      return Err(GatewayError::Cancelled(handle.to_owned()));
    }
    entry.status = ReservationStatus::Confirmed {
      amount: entry.reservation.amount,
    };
    Ok(entry.reservation.clone())
  }

  /// Abandon a reservation that has not been paid.
  pub async fn cancel(&self, handle: &str) -> Result<(), GatewayError> {
    let mut entries = self.entries.write().await;
    let entry = entries
      .get_mut(handle)
      .ok_or_else(|| GatewayError::UnknownHandle(handle.to_owned()))?;
    entry.status = ReservationStatus::Canceled;
    Ok(())
  }
}

impl PaymentGateway for LocalGateway {
  type Error = GatewayError;

  async fn reserve(&self, amount: i64, currency: &str) -> Result<Reservation, GatewayError> {
    if amount <= 0 {
      return Err(GatewayError::InvalidAmount(amount));
    }

    let handle = format!("pi_{}", Uuid::new_v4().simple());
    let mut secret = [0u8; 16];
    OsRng.fill_bytes(&mut secret);

    let reservation = Reservation {
      client_secret: format!("{handle}_secret_{}", hex::encode(secret)),
      handle:        handle.clone(),
      amount,
      currency:      currency.to_lowercase(),
    };
    let status = if self.auto_confirm {
      ReservationStatus::Confirmed { amount }
    } else {
      ReservationStatus::Pending
    };

    let mut entries = self.entries.write().await;
    // Confirmed entries stay so settlement retries can re-check them.
    let expiry = self.unpaid_expiry;
    entries.retain(|_, e| {
      matches!(e.status, ReservationStatus::Confirmed { .. }) || e.created.elapsed() < expiry
    });
    entries.insert(handle, Entry {
      reservation: reservation.clone(),
      status,
      created: Instant::now(),
    });
    Ok(reservation)
  }

  async fn status(&self, handle: &str) -> Result<ReservationStatus, GatewayError> {
    Ok(
      self
        .entries
        .read()
        .await
        .get(handle)
        .map(|e| e.status)
        .unwrap_or(ReservationStatus::Unknown),
    )
  }
}
