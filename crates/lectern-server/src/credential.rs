//! Short-lived bearer credentials.
//!
//! Tokens use the compact JWT layout `header.claims.signature`, each segment
//! base64url without padding, signed with HMAC-SHA256. They carry the caller's
//! email and nothing else: roles are always read from the store, so a role
//! change never waits for a token to expire.
//!
//! Verification is pure. There is no server-side session, so a token stays
//! valid until its `exp` even if the identity behind it changes.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const HEADER_JSON: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
  #[error("token has expired")]
  Expired,
  #[error("token is malformed or its signature does not verify")]
  Malformed,
  #[error("token signing secret must not be empty")]
  EmptySecret,
  #[error("token lifetime of {0} seconds is out of range")]
  InvalidLifetime(i64),
}

/// The verified contents of a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
  /// The caller's normalised email.
  pub sub: String,
  /// Issued-at, unix seconds.
  pub iat: i64,
  /// Expiry, unix seconds. The token is valid up to and including this second.
  pub exp: i64,
}

impl Claims {
  pub fn email(&self) -> &str { &self.sub }
}

/// A freshly minted token and the instant it stops verifying.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
  pub token:      String,
  pub expires_at: DateTime<Utc>,
}

/// Issues and verifies tokens with a single shared secret.
#[derive(Clone)]
pub struct CredentialService {
  mac: HmacSha256,
  ttl: Duration,
}

impl CredentialService {
  pub fn new(secret: &[u8], ttl: Duration) -> Result<Self, CredentialError> {
    if secret.is_empty() {
      return Err(CredentialError::EmptySecret);
    }
    if ttl <= Duration::zero() || Utc::now().checked_add_signed(ttl).is_none() {
      return Err(CredentialError::InvalidLifetime(ttl.num_seconds()));
    }
    let mac = HmacSha256::new_from_slice(secret)
      .map_err(|_| CredentialError::EmptySecret)?;
    Ok(Self { mac, ttl })
  }

  pub fn ttl(&self) -> Duration { self.ttl }

  /// Issue a token for `email`, valid for the configured lifetime from now.
  pub fn issue(&self, email: &str) -> IssuedToken { self.issue_at(email, Utc::now()) }

  /// Issue a token as if the current time were `now`. Deterministic in its
  /// inputs.
  pub fn issue_at(&self, email: &str, now: DateTime<Utc>) -> IssuedToken {
    let expires_at = now
      .checked_add_signed(self.ttl)
      .unwrap_or(DateTime::<Utc>::MAX_UTC);
    let iat = now.timestamp();
    let exp = expires_at.timestamp();

    let claims = serde_json::json!({ "sub": email, "iat": iat, "exp": exp });
    let signing_input = format!(
      "{}.{}",
      B64.encode(HEADER_JSON),
      B64.encode(claims.to_string())
    );
    let signature = self.sign(signing_input.as_bytes());

    IssuedToken {
      token:      format!("{signing_input}.{}", B64.encode(signature)),
      expires_at: DateTime::from_timestamp(exp, 0).unwrap_or(expires_at),
    }
  }

  /// Verify `token` against the current time.
  pub fn verify(&self, token: &str) -> Result<Claims, CredentialError> {
    self.verify_at(token, Utc::now())
  }

  /// Verify `token` as if the current time were `now`.
  pub fn verify_at(
    &self,
    token: &str,
    now: DateTime<Utc>,
  ) -> Result<Claims, CredentialError> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
      (parts.next(), parts.next(), parts.next(), parts.next())
    else {
      return Err(CredentialError::Malformed);
    };

    let signature = B64.decode(signature).map_err(|_| CredentialError::Malformed)?;
    let mut mac = self.mac.clone();
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    // Constant-time comparison.
    mac
      .verify_slice(&signature)
      .map_err(|_| CredentialError::Malformed)?;

    let header: serde_json::Value = decode_segment(header)?;
    if header.get("alg").and_then(|v| v.as_str()) != Some("HS256") {
      return Err(CredentialError::Malformed);
    }

    let claims: Claims = decode_segment(payload)?;
    if now.timestamp() > claims.exp {
      return Err(CredentialError::Expired);
    }
    Ok(claims)
  }

  fn sign(&self, input: &[u8]) -> Vec<u8> {
    let mut mac = self.mac.clone();
    mac.update(input);
    mac.finalize().into_bytes().to_vec()
  }
}

fn decode_segment<T: serde::de::DeserializeOwned>(
  segment: &str,
) -> Result<T, CredentialError> {
  let bytes = B64.decode(segment).map_err(|_| CredentialError::Malformed)?;
  serde_json::from_slice(&bytes).map_err(|_| CredentialError::Malformed)
}
