//! The guard chain: bearer authentication, live role checks, ownership.
//!
//! Handlers opt in by taking an extractor:
//!
//! | Extractor                     | Checks                                      |
//! |-------------------------------|---------------------------------------------|
//! | [`Caller`]                    | valid, unexpired bearer token               |
//! | [`Authorized<AdminOnly>`]     | the above, and the stored role is `admin`   |
//! | [`Authorized<InstructorOnly>`]| the above, and the stored role is `instructor` |
//!
//! Roles are re-read from the store on every request. Ownership is checked in
//! the handler with [`ensure_owner`] once the resource's owner is known.

use std::marker::PhantomData;

use argon2::{
  Argon2, PasswordHash, PasswordHasher as _, PasswordVerifier as _,
  password_hash::SaltString,
};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use lectern_core::{
  gateway::PaymentGateway,
  identity::{Identity, Role},
  store::MarketplaceStore,
};
use rand_core::OsRng;

use crate::{
  AppState,
  credential::{Claims, CredentialError, CredentialService},
  error::Error,
};

// ─── Authentication ───────────────────────────────────────────────────────────

/// An authenticated request. Says who is calling, nothing about what they may
/// do.
#[derive(Debug, Clone)]
pub struct Caller {
  pub email:  String,
  pub claims: Claims,
}

/// Verify the `Authorization: Bearer …` header.
pub fn authenticate(
  headers: &HeaderMap,
  credentials: &CredentialService,
) -> Result<Caller, Error> {
  let value = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or_else(|| Error::Unauthorized("missing bearer token".to_string()))?;

  let token = value
    .strip_prefix("Bearer ")
    .map(str::trim)
    .filter(|t| !t.is_empty())
    .ok_or_else(|| Error::Unauthorized("missing bearer token".to_string()))?;

  let claims = credentials.verify(token).map_err(|e| match e {
    CredentialError::Expired => Error::Unauthorized("token has expired".to_string()),
    _ => Error::Unauthorized("invalid token".to_string()),
  })?;

  Ok(Caller { email: claims.sub.clone(), claims })
}

impl<S, G> FromRequestParts<AppState<S, G>> for Caller
where
  S: MarketplaceStore + 'static,
  G: PaymentGateway + 'static,
{
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S, G>,
  ) -> Result<Self, Self::Rejection> {
    authenticate(&parts.headers, &state.credentials)
  }
}

// ─── Authorization ────────────────────────────────────────────────────────────

/// Require that the caller's *current* stored role is exactly `required`.
///
/// An identity that no longer exists is refused the same way as a wrong role.
pub async fn authorize<S: MarketplaceStore>(
  store: &S,
  caller: &Caller,
  required: Role,
) -> Result<Identity, Error> {
  let identity = store
    .get_identity(&caller.email)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::Forbidden("unknown identity".to_string()))?;

  if identity.role != required {
    return Err(Error::Forbidden(format!("requires the {required} role")));
  }
  Ok(identity)
}

/// Require that the caller is the owner of a resource.
pub fn ensure_owner(caller: &Caller, owner_email: &str) -> Result<(), Error> {
  if caller.email != owner_email {
    return Err(Error::Forbidden(
      "resource belongs to another account".to_string(),
    ));
  }
  Ok(())
}

/// Compile-time role requirement for [`Authorized`].
pub trait RequiredRole {
  const ROLE: Role;
}

pub struct AdminOnly;
pub struct InstructorOnly;

impl RequiredRole for AdminOnly {
  const ROLE: Role = Role::Admin;
}

impl RequiredRole for InstructorOnly {
  const ROLE: Role = Role::Instructor;
}

/// A caller whose stored role matched `R` when the request arrived.
pub struct Authorized<R> {
  pub caller:   Caller,
  pub identity: Identity,
  _role:        PhantomData<fn() -> R>,
}

impl<S, G, R> FromRequestParts<AppState<S, G>> for Authorized<R>
where
  S: MarketplaceStore + 'static,
  G: PaymentGateway + 'static,
  R: RequiredRole,
{
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S, G>,
  ) -> Result<Self, Self::Rejection> {
    let caller = authenticate(&parts.headers, &state.credentials)?;
    let identity = authorize(state.store.as_ref(), &caller, R::ROLE).await?;
    Ok(Authorized { caller, identity, _role: PhantomData })
  }
}

// ─── Passwords ────────────────────────────────────────────────────────────────

/// Hash a password into an argon2 PHC string.
pub fn hash_password(password: &str) -> Result<String, Error> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|h| h.to_string())
    .map_err(|e| Error::Internal(format!("password hashing failed: {e}")))
}

/// Check `password` against a stored PHC string.
pub fn verify_password(password: &str, phc: &str) -> Result<(), Error> {
  let parsed = PasswordHash::new(phc)
    .map_err(|e| Error::Internal(format!("stored password hash is invalid: {e}")))?;
  Argon2::default()
    .verify_password(password.as_bytes(), &parsed)
    .map_err(|_| Error::Unauthorized("invalid email or password".to_string()))
}
