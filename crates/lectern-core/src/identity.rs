//! Identity: the email-keyed account record and its authorization role.
//!
//! The role stored here is the only authorization fact in the system. Tokens
//! carry the email alone, so every role check reads this record live.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// What an identity is allowed to do.
///
/// `User` is a student: it may select and pay for subjects.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  #[default]
  User,
  Instructor,
  Admin,
}

impl Role {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::User => "user",
      Self::Instructor => "instructor",
      Self::Admin => "admin",
    }
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Role {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "user" => Ok(Self::User),
      "instructor" => Ok(Self::Instructor),
      "admin" => Ok(Self::Admin),
      other => Err(Error::UnknownRole(other.to_owned())),
    }
  }
}

/// An account. The email never changes once the row exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
  pub email:      String,
  pub role:       Role,
  pub name:       Option<String>,
  pub photo_url:  Option<String>,
  pub created_at: DateTime<Utc>,
}

/// Input to [`crate::store::MarketplaceStore::upsert_identity`].
///
/// `role` and `password_hash` only apply when the identity is created; an
/// existing row keeps both and only has its profile fields refreshed.
#[derive(Debug, Clone)]
pub struct NewIdentity {
  pub email:         String,
  pub role:          Role,
  pub name:          Option<String>,
  pub photo_url:     Option<String>,
  /// Argon2 PHC string.
  pub password_hash: String,
}

/// Canonical form of an email used as a store key: trimmed and lowercased.
pub fn normalize_email(raw: &str) -> Result<String> {
  let email = raw.trim().to_lowercase();
  let valid = match email.split_once('@') {
    Some((local, domain)) => {
      !local.is_empty() && !domain.is_empty() && !domain.contains('@')
    }
    None => false,
  };
  if valid && !email.chars().any(char::is_whitespace) {
    Ok(email)
  } else {
    Err(Error::InvalidEmail(raw.to_owned()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn role_round_trips_through_str() {
    for role in [Role::User, Role::Instructor, Role::Admin] {
      assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
    }
    assert!(matches!("root".parse::<Role>(), Err(Error::UnknownRole(_))));
  }

  #[test]
  fn normalize_email_lowercases_and_trims() {
    assert_eq!(
      normalize_email("  Ada@Example.COM ").unwrap(),
      "ada@example.com"
    );
  }

  #[test]
  fn normalize_email_rejects_garbage() {
    for bad in ["", "no-at-sign", "@example.com", "ada@", "a@b@c", "a b@c.d"] {
      assert!(normalize_email(bad).is_err(), "accepted {bad:?}");
    }
  }
}
