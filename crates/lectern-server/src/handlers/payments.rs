//! Handlers for `/payments` endpoints.
//!
//! | Method | Path                     | Guard | Notes |
//! |--------|--------------------------|-------|-------|
//! | `POST` | `/payments/reservations` | any   | Body: `{"price":50.0}`; returns a client secret |
//! | `POST` | `/payments`              | self  | Settles; 201 when new, 200 when replayed |
//! | `GET`  | `/payments`              | self  | `?email=`; payment history |

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
};
use lectern_core::{
  gateway::PaymentGateway,
  identity::normalize_email,
  payment::{PaymentRecord, SettlementCommand, minor_units},
  store::MarketplaceStore,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::EmailQuery;
use crate::{
  AppState,
  auth::{Caller, ensure_owner},
  error::Error,
};

// ─── Reserve ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ReserveBody {
  /// Major currency unit, e.g. `50.0` for $50.
  pub price: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationView {
  pub client_secret:      String,
  pub reservation_handle: String,
  pub amount:             i64,
  pub currency:           String,
}

/// `POST /payments/reservations`
pub async fn reserve<S, G>(
  State(state): State<AppState<S, G>>,
  caller: Caller,
  Json(body): Json<ReserveBody>,
) -> Result<Json<ReservationView>, Error>
where
  S: MarketplaceStore,
  G: PaymentGateway,
{
  let amount = minor_units(body.price)?;
  if amount == 0 {
    return Err(Error::BadRequest("price must be positive".to_string()));
  }

  let reservation = state
    .gateway
    .reserve(amount, &state.config.currency)
    .await
    .map_err(|e| Error::Adapter(e.to_string()))?;
  debug!(email = %caller.email, handle = %reservation.handle, amount, "reservation created");

  Ok(Json(ReservationView {
    client_secret:      reservation.client_secret,
    reservation_handle: reservation.handle,
    amount:             reservation.amount,
    currency:           reservation.currency,
  }))
}

// ─── Settle ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleBody {
  pub selection_id:       Uuid,
  pub subject_id:         Uuid,
  pub email:              String,
  /// Minor units; must equal what the reservation was paid for.
  pub amount:             i64,
  pub reservation_handle: String,
  /// Older clients send their own view of the seat counters. Ignored.
  pub available_seats:    Option<i64>,
  pub enrolled_count:     Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleAck {
  pub acknowledged: bool,
  pub inserted_id:  Uuid,
  pub replayed:     bool,
  pub payment:      PaymentRecord,
}

/// `POST /payments`
pub async fn settle<S, G>(
  State(state): State<AppState<S, G>>,
  caller: Caller,
  Json(body): Json<SettleBody>,
) -> Result<(StatusCode, Json<SettleAck>), Error>
where
  S: MarketplaceStore,
  G: PaymentGateway,
{
  if body.available_seats.is_some() || body.enrolled_count.is_some() {
    debug!(
      selection_id = %body.selection_id,
      "ignoring client-supplied seat counters"
    );
  }

  let command = SettlementCommand {
    selection_id:       body.selection_id,
    subject_id:         body.subject_id,
    email:              normalize_email(&body.email)?,
    amount:             body.amount,
    reservation_handle: body.reservation_handle,
    deadline:           None,
  };

  let receipt = state
    .settlement
    .settle(
      state.store.as_ref(),
      state.gateway.as_ref(),
      &caller.email,
      command,
    )
    .await?;

  let status = if receipt.replayed {
    StatusCode::OK
  } else {
    StatusCode::CREATED
  };
  Ok((status, Json(SettleAck {
    acknowledged: true,
    inserted_id:  receipt.payment.payment_id,
    replayed:     receipt.replayed,
    payment:      receipt.payment,
  })))
}

// ─── History ──────────────────────────────────────────────────────────────────

/// `GET /payments?email=<email>`
pub async fn history<S, G>(
  State(state): State<AppState<S, G>>,
  caller: Caller,
  Query(params): Query<EmailQuery>,
) -> Result<Json<Vec<PaymentRecord>>, Error>
where
  S: MarketplaceStore,
  G: PaymentGateway,
{
  let Some(email) = params.email.filter(|e| !e.trim().is_empty()) else {
    return Ok(Json(Vec::new()));
  };
  let email = normalize_email(&email)?;
  ensure_owner(&caller, &email)?;

  let payments = state.store.list_payments(&email).await.map_err(Error::store)?;
  Ok(Json(payments))
}
