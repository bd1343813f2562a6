//! Error types and axum `IntoResponse` implementation.
//!
//! Every error renders as `{"error": true, "message": "..."}` so clients can
//! branch on the status code and show the message verbatim.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// Missing, malformed or expired credential.
  #[error("unauthorized: {0}")]
  Unauthorized(String),
  /// Authenticated, but the role or ownership check failed.
  #[error("forbidden: {0}")]
  Forbidden(String),
  #[error("not found: {0}")]
  NotFound(String),
  #[error("bad request: {0}")]
  BadRequest(String),
  #[error("conflict: {0}")]
  Conflict(String),
  #[error("subject {0} is sold out")]
  SoldOut(Uuid),
  /// The reservation is not (or not fully) paid.
  #[error("payment required: {0}")]
  PaymentRequired(String),
  /// The settlement transaction did not complete; retrying is safe.
  #[error("settlement failed: {0}")]
  SettlementFailed(String),
  /// The payment gateway itself failed.
  #[error("payment adapter error: {0}")]
  Adapter(String),
  #[error("internal error: {0}")]
  Internal(String),
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Error::Store(Box::new(e))
  }

  pub fn status(&self) -> StatusCode {
    match self {
      Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
      Error::Forbidden(_) => StatusCode::FORBIDDEN,
      Error::NotFound(_) => StatusCode::NOT_FOUND,
      Error::BadRequest(_) => StatusCode::BAD_REQUEST,
      Error::Conflict(_) | Error::SoldOut(_) => StatusCode::CONFLICT,
      Error::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
      Error::SettlementFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
      Error::Adapter(_) => StatusCode::BAD_GATEWAY,
      Error::Internal(_) | Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl From<lectern_core::Error> for Error {
  fn from(e: lectern_core::Error) -> Self { Error::BadRequest(e.to_string()) }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = self.status();
    let body = Json(json!({ "error": true, "message": self.to_string() }));
    let mut res = (status, body).into_response();
    if status == StatusCode::UNAUTHORIZED {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Bearer realm=\"lectern\""),
      );
    }
    res
  }
}
