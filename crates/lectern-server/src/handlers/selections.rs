//! Handlers for `/selections` endpoints.
//!
//! | Method   | Path               | Guard | Notes |
//! |----------|--------------------|-------|-------|
//! | `POST`   | `/selections`      | any   | Body: `{"subjectId":…}`; price is snapshotted |
//! | `GET`    | `/selections`      | self  | `?email=`; empty list without it |
//! | `DELETE` | `/selections/{id}` | owner | 204 even if already gone |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use lectern_core::{
  gateway::PaymentGateway,
  identity::normalize_email,
  selection::{NewSelection, Selection},
  store::MarketplaceStore,
};
use serde::Deserialize;
use uuid::Uuid;

use super::EmailQuery;
use crate::{
  AppState,
  auth::{Caller, ensure_owner},
  error::Error,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectBody {
  pub subject_id: Uuid,
}

/// `POST /selections`
pub async fn create<S, G>(
  State(state): State<AppState<S, G>>,
  caller: Caller,
  Json(body): Json<SelectBody>,
) -> Result<impl IntoResponse, Error>
where
  S: MarketplaceStore,
  G: PaymentGateway,
{
  let subject = state
    .store
    .get_subject(body.subject_id)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::NotFound(format!("subject {} not found", body.subject_id)))?;

  let selection = state
    .store
    .select(NewSelection {
      student_email:  caller.email,
      subject_id:     subject.subject_id,
      price_snapshot: subject.price,
    })
    .await
    .map_err(Error::store)?;
  Ok((StatusCode::CREATED, Json(selection)))
}

/// `GET /selections?email=<email>`
pub async fn list<S, G>(
  State(state): State<AppState<S, G>>,
  caller: Caller,
  Query(params): Query<EmailQuery>,
) -> Result<Json<Vec<Selection>>, Error>
where
  S: MarketplaceStore,
  G: PaymentGateway,
{
  let Some(email) = params.email.filter(|e| !e.trim().is_empty()) else {
    return Ok(Json(Vec::new()));
  };
  let email = normalize_email(&email)?;
  ensure_owner(&caller, &email)?;

  let selections = state
    .store
    .list_selections(&email)
    .await
    .map_err(Error::store)?;
  Ok(Json(selections))
}

/// `DELETE /selections/{id}`
pub async fn cancel<S, G>(
  State(state): State<AppState<S, G>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, Error>
where
  S: MarketplaceStore,
  G: PaymentGateway,
{
  let existing = state.store.get_selection(id).await.map_err(Error::store)?;
  if let Some(selection) = existing {
    ensure_owner(&caller, &selection.student_email)?;
    state.store.cancel_selection(id).await.map_err(Error::store)?;
  }
  Ok(StatusCode::NO_CONTENT)
}
