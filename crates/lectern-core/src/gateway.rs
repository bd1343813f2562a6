//! The `PaymentGateway` trait: the boundary to whoever actually moves money.
//!
//! The gateway reserves an amount and hands back an opaque handle. The client
//! confirms the payment out-of-band; the server later asks the gateway for
//! the handle's status before it settles anything.

use std::future::Future;

use serde::{Deserialize, Serialize};

/// A reservation created by [`PaymentGateway::reserve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
  /// Opaque identifier; also the idempotency key for settlement.
  pub handle:        String,
  /// Secret the client presents to the provider to confirm the payment.
  pub client_secret: String,
  /// Minor units.
  pub amount:        i64,
  pub currency:      String,
}

/// Server-side view of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationStatus {
  /// The gateway has never issued this handle.
  Unknown,
  /// Reserved but not yet confirmed by the client.
  Pending,
  /// Paid. `amount` is what the provider actually captured, in minor units.
  Confirmed { amount: i64 },
  Canceled,
}

/// Abstraction over a payment provider.
pub trait PaymentGateway: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Earmark `amount` minor units of `currency`.
  fn reserve<'a>(
    &'a self,
    amount: i64,
    currency: &'a str,
  ) -> impl Future<Output = Result<Reservation, Self::Error>> + Send + 'a;

  /// Look up the current status of a previously issued handle.
  fn status<'a>(
    &'a self,
    handle: &'a str,
  ) -> impl Future<Output = Result<ReservationStatus, Self::Error>> + Send + 'a;
}
