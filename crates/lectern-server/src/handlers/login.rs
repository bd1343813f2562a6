//! `POST /jwt`: exchange an email and password for a bearer token.
//!
//! The first successful login for an email registers the identity. Emails
//! listed in `admin_emails` start as admins, everyone else as a plain user.
//! Later logins only refresh the display name and photo.

use axum::{Json, extract::State};
use lectern_core::{
  gateway::PaymentGateway,
  identity::{NewIdentity, Role, normalize_email},
  store::MarketplaceStore,
};
use serde::Deserialize;
use tracing::info;

use crate::{
  AppState,
  auth::{hash_password, verify_password},
  credential::IssuedToken,
  error::Error,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginBody {
  pub email:     String,
  pub password:  String,
  pub name:      Option<String>,
  pub photo_url: Option<String>,
}

pub async fn handler<S, G>(
  State(state): State<AppState<S, G>>,
  Json(body): Json<LoginBody>,
) -> Result<Json<IssuedToken>, Error>
where
  S: MarketplaceStore,
  G: PaymentGateway,
{
  let email = normalize_email(&body.email)?;
  if body.password.is_empty() {
    return Err(Error::BadRequest("password must not be empty".to_string()));
  }

  let store = state.store.as_ref();
  let existing = store.password_hash(&email).await.map_err(Error::store)?;
  let (hash, registering) = match existing {
    Some(stored) => {
      verify_password(&body.password, &stored)?;
      (stored, false)
    }
    None => (hash_password(&body.password)?, true),
  };

  let role = if state.config.is_admin_email(&email) {
    Role::Admin
  } else {
    Role::User
  };
  let identity = store
    .upsert_identity(NewIdentity {
      email:         email.clone(),
      role,
      name:          body.name,
      photo_url:     body.photo_url,
      password_hash: hash.clone(),
    })
    .await
    .map_err(Error::store)?;

  if registering {
    // A concurrent first login may have registered the email first.
    let stored = store
      .password_hash(&email)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::Internal(format!("identity {email} vanished")))?;
    if stored != hash {
      verify_password(&body.password, &stored)?;
    } else {
      info!(email = %identity.email, role = %identity.role, "registered identity");
    }
  }

  Ok(Json(state.credentials.issue(&email)))
}
