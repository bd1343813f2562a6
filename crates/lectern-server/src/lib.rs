//! HTTP layer for the Lectern course marketplace.
//!
//! Exposes an axum [`Router`] backed by any [`MarketplaceStore`] and
//! [`PaymentGateway`]. Every protected route passes through the guard
//! extractors in [`auth`] before its handler body runs.

pub mod auth;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod settlement;

#[cfg(test)]
mod tests;

pub use error::Error;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Router,
  routing::{delete, get, patch, post},
};
use lectern_core::{gateway::PaymentGateway, store::MarketplaceStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use credential::{CredentialError, CredentialService};
use handlers::{login, payments, selections, subjects, users};
use settlement::SettlementWorkflow;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `LECTERN_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                  String,
  pub port:                  u16,
  pub store_path:            PathBuf,
  /// HMAC key for bearer tokens.
  pub token_secret:          String,
  #[serde(default = "default_token_ttl_secs")]
  pub token_ttl_secs:        u64,
  /// ISO currency code passed to the payment gateway.
  #[serde(default = "default_currency")]
  pub currency:              String,
  #[serde(default = "default_settlement_timeout_ms")]
  pub settlement_timeout_ms: u64,
  /// Total tries per settlement, including the first.
  #[serde(default = "default_settlement_attempts")]
  pub settlement_attempts:   u32,
  /// Emails that become admins the first time they log in.
  #[serde(default)]
  pub admin_emails:          Vec<String>,
  /// Have the built-in gateway treat every reservation as paid.
  #[serde(default)]
  pub gateway_auto_confirm:  bool,
}

fn default_token_ttl_secs() -> u64 { 3600 }
fn default_currency() -> String { "usd".to_string() }
fn default_settlement_timeout_ms() -> u64 { 5000 }
fn default_settlement_attempts() -> u32 { 3 }

impl ServerConfig {
  pub fn is_admin_email(&self, email: &str) -> bool {
    self
      .admin_emails
      .iter()
      .any(|a| a.trim().eq_ignore_ascii_case(email))
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, G> {
  pub store:       Arc<S>,
  pub gateway:     Arc<G>,
  pub config:      Arc<ServerConfig>,
  pub credentials: Arc<CredentialService>,
  pub settlement:  Arc<SettlementWorkflow>,
}

impl<S, G> AppState<S, G> {
  pub fn new(store: S, gateway: G, config: ServerConfig) -> Result<Self, CredentialError> {
    let ttl = i64::try_from(config.token_ttl_secs)
      .ok()
      .and_then(chrono::Duration::try_seconds)
      .ok_or(CredentialError::InvalidLifetime(
        i64::try_from(config.token_ttl_secs).unwrap_or(i64::MAX),
      ))?;
    let credentials = CredentialService::new(config.token_secret.as_bytes(), ttl)?;
    let settlement = SettlementWorkflow::new(
      Duration::from_millis(config.settlement_timeout_ms),
      config.settlement_attempts,
    );

    Ok(Self {
      store:       Arc::new(store),
      gateway:     Arc::new(gateway),
      config:      Arc::new(config),
      credentials: Arc::new(credentials),
      settlement:  Arc::new(settlement),
    })
  }
}

impl<S, G> Clone for AppState<S, G> {
  fn clone(&self) -> Self {
    Self {
      store:       self.store.clone(),
      gateway:     self.gateway.clone(),
      config:      self.config.clone(),
      credentials: self.credentials.clone(),
      settlement:  self.settlement.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the marketplace API.
pub fn router<S, G>(state: AppState<S, G>) -> Router
where
  S: MarketplaceStore + 'static,
  G: PaymentGateway + 'static,
{
  Router::new()
    .route("/",                       get(handlers::root))
    .route("/jwt",                    post(login::handler::<S, G>))
    .route("/users",                  get(users::list::<S, G>))
    .route("/users/{email}/role",     get(users::get_role::<S, G>).patch(users::set_role::<S, G>))
    .route("/subjects",               get(subjects::list::<S, G>).post(subjects::create::<S, G>))
    .route("/subjects/{id}/approve",  patch(subjects::approve::<S, G>))
    .route("/subjects/{id}/feedback", patch(subjects::feedback::<S, G>))
    .route("/selections",             get(selections::list::<S, G>).post(selections::create::<S, G>))
    .route("/selections/{id}",        delete(selections::cancel::<S, G>))
    .route("/payments/reservations",  post(payments::reserve::<S, G>))
    .route("/payments",               get(payments::history::<S, G>).post(payments::settle::<S, G>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
