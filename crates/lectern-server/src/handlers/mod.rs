//! Route handlers, one module per resource.

pub mod login;
pub mod payments;
pub mod selections;
pub mod subjects;
pub mod users;

use serde::Deserialize;

/// `GET /` liveness check.
pub async fn root() -> &'static str { "Lectern is running" }

/// `?email=` filter shared by the per-student listings.
#[derive(Debug, Default, Deserialize)]
pub struct EmailQuery {
  pub email: Option<String>,
}
