//! Handlers for `/users` endpoints.
//!
//! | Method  | Path                  | Guard       | Notes |
//! |---------|-----------------------|-------------|-------|
//! | `GET`   | `/users`              | admin       | |
//! | `GET`   | `/users/{email}/role` | self        | `{"email":…,"role":…}` |
//! | `PATCH` | `/users/{email}/role` | admin       | Body: `{"role":"instructor"}` |

use axum::{
  Json,
  extract::{Path, State},
};
use lectern_core::{
  gateway::PaymentGateway,
  identity::{Identity, Role, normalize_email},
  store::MarketplaceStore,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
  AppState,
  auth::{AdminOnly, Authorized, Caller, ensure_owner},
  error::Error,
};

/// `GET /users`
pub async fn list<S, G>(
  State(state): State<AppState<S, G>>,
  _admin: Authorized<AdminOnly>,
) -> Result<Json<Vec<Identity>>, Error>
where
  S: MarketplaceStore,
  G: PaymentGateway,
{
  let identities = state.store.list_identities().await.map_err(Error::store)?;
  Ok(Json(identities))
}

#[derive(Debug, Serialize)]
pub struct RoleView {
  pub email: String,
  pub role:  Role,
}

/// `GET /users/{email}/role`
pub async fn get_role<S, G>(
  State(state): State<AppState<S, G>>,
  caller: Caller,
  Path(email): Path<String>,
) -> Result<Json<RoleView>, Error>
where
  S: MarketplaceStore,
  G: PaymentGateway,
{
  let email = normalize_email(&email)?;
  ensure_owner(&caller, &email)?;
  let identity = state
    .store
    .get_identity(&email)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::NotFound(format!("identity {email} not found")))?;
  Ok(Json(RoleView { email: identity.email, role: identity.role }))
}

#[derive(Debug, Deserialize)]
pub struct RoleBody {
  pub role: Role,
}

/// `PATCH /users/{email}/role`
pub async fn set_role<S, G>(
  State(state): State<AppState<S, G>>,
  admin: Authorized<AdminOnly>,
  Path(email): Path<String>,
  Json(body): Json<RoleBody>,
) -> Result<Json<Identity>, Error>
where
  S: MarketplaceStore,
  G: PaymentGateway,
{
  let email = normalize_email(&email)?;
  let identity = state
    .store
    .set_role(&email, body.role)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::NotFound(format!("identity {email} not found")))?;
  info!(
    by = %admin.caller.email,
    email = %identity.email,
    role = %identity.role,
    "role changed"
  );
  Ok(Json(identity))
}
