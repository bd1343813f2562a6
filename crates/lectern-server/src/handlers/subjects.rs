//! Handlers for `/subjects` endpoints.
//!
//! | Method  | Path                      | Guard      | Notes |
//! |---------|---------------------------|------------|-------|
//! | `POST`  | `/subjects`               | instructor | Body: `{"title":…,"price":50.0,"availableSeats":30}` |
//! | `GET`   | `/subjects`               | admin      | Optional `?status=pending\|approved` |
//! | `PATCH` | `/subjects/{id}/approve`  | admin      | Idempotent |
//! | `PATCH` | `/subjects/{id}/feedback` | admin      | Body: `{"feedback":…}`; status unchanged |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use lectern_core::{
  gateway::PaymentGateway,
  payment::minor_units,
  store::MarketplaceStore,
  subject::{NewSubject, Subject, SubjectStatus},
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
  AppState,
  auth::{AdminOnly, Authorized, InstructorOnly},
  error::Error,
};

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
  pub title:           String,
  pub price:           f64,
  pub available_seats: u32,
}

/// `POST /subjects`
pub async fn create<S, G>(
  State(state): State<AppState<S, G>>,
  instructor: Authorized<InstructorOnly>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, Error>
where
  S: MarketplaceStore,
  G: PaymentGateway,
{
  let title = body.title.trim();
  if title.is_empty() {
    return Err(Error::BadRequest("title must not be empty".to_string()));
  }
  minor_units(body.price)?;

  let subject = state
    .store
    .add_subject(NewSubject {
      instructor_email: instructor.identity.email,
      title:            title.to_string(),
      price:            body.price,
      available_seats:  body.available_seats,
    })
    .await
    .map_err(Error::store)?;
  info!(subject_id = %subject.subject_id, "subject submitted for review");
  Ok((StatusCode::CREATED, Json(subject)))
}

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub status: Option<SubjectStatus>,
}

/// `GET /subjects[?status=<status>]`
pub async fn list<S, G>(
  State(state): State<AppState<S, G>>,
  _admin: Authorized<AdminOnly>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Subject>>, Error>
where
  S: MarketplaceStore,
  G: PaymentGateway,
{
  let subjects = state
    .store
    .list_subjects(params.status)
    .await
    .map_err(Error::store)?;
  Ok(Json(subjects))
}

// ─── Review ───────────────────────────────────────────────────────────────────

/// `PATCH /subjects/{id}/approve`
pub async fn approve<S, G>(
  State(state): State<AppState<S, G>>,
  _admin: Authorized<AdminOnly>,
  Path(id): Path<Uuid>,
) -> Result<Json<Subject>, Error>
where
  S: MarketplaceStore,
  G: PaymentGateway,
{
  let subject = state
    .store
    .approve_subject(id)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::NotFound(format!("subject {id} not found")))?;
  info!(subject_id = %id, "subject approved");
  Ok(Json(subject))
}

#[derive(Debug, Deserialize)]
pub struct FeedbackBody {
  pub feedback: String,
}

/// `PATCH /subjects/{id}/feedback`
pub async fn feedback<S, G>(
  State(state): State<AppState<S, G>>,
  _admin: Authorized<AdminOnly>,
  Path(id): Path<Uuid>,
  Json(body): Json<FeedbackBody>,
) -> Result<Json<Subject>, Error>
where
  S: MarketplaceStore,
  G: PaymentGateway,
{
  let subject = state
    .store
    .set_feedback(id, body.feedback)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::NotFound(format!("subject {id} not found")))?;
  Ok(Json(subject))
}
