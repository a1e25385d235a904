//! JSON REST API for Dynasty.
//!
//! Exposes an axum [`Router`] backed by any store implementing both
//! [`DynastyStore`] and [`ChangeFeed`]. Authentication is the upstream
//! identity provider's job: the caller's user id arrives in the
//! [`identity::USER_ID_HEADER`] header.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", dynasty_api::api_router(store.clone(), ApiConfig::default()))
//! ```

pub mod dynasties;
pub mod error;
pub mod identity;
pub mod invites;
pub mod plans;
pub mod profiles;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use chrono::Duration;
use dynasty_core::{
  change::ChangeFeed, invite::DEFAULT_TTL_DAYS, store::DynastyStore,
  sync::SyncConfig,
};

pub use error::ApiError;

// ─── State ───────────────────────────────────────────────────────────────────

/// Settings the handlers need beyond the store.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  /// Public origin used to build invite links.
  pub base_url:   String,
  pub invite_ttl: Duration,
  pub sync:       SyncConfig,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url:   "http://localhost:8080".to_string(),
      invite_ttl: Duration::days(DEFAULT_TTL_DAYS),
      sync:       SyncConfig::default(),
    }
  }
}

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub store:  Arc<S>,
  pub config: Arc<ApiConfig>,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), config: Arc::clone(&self.config) }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>, config: ApiConfig) -> Router<()>
where
  S: DynastyStore + ChangeFeed + 'static,
{
  let state = ApiState { store, config: Arc::new(config) };

  Router::new()
    // Dynasties
    .route("/dynasties", get(dynasties::list::<S>).post(dynasties::create::<S>))
    .route("/dynasties/stream", get(dynasties::stream::<S>))
    .route("/dynasties/{id}", get(dynasties::get_one::<S>))
    .route("/dynasties/{id}/members", get(dynasties::members::<S>))
    // Invites
    .route("/dynasties/{id}/invites", post(invites::create::<S>))
    .route("/invites/{token}/accept", post(invites::accept::<S>))
    // Profiles
    .route("/profiles/me", put(profiles::put_me::<S>))
    .route("/profiles/{id}", get(profiles::get_one::<S>))
    // Plans
    .route("/plans", get(plans::list))
    .with_state(state)
}

#[cfg(test)]
mod tests;
