//! HTTP front end for Dynasty: configuration and the top-level router.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::{Router, routing::get};
use dynasty_api::ApiConfig;
use dynasty_core::{
  change::ChangeFeed, invite::DEFAULT_TTL_DAYS, store::DynastyStore,
  sync::{CountFailurePolicy, SyncConfig},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `DYNASTY_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                 String,
  pub port:                 u16,
  /// Public origin used in invite links.
  pub base_url:             String,
  pub store_path:           PathBuf,
  pub invite_ttl_days:      i64,
  pub count_failure_policy: CountFailurePolicy,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                 "127.0.0.1".to_string(),
      port:                 8080,
      base_url:             "http://localhost:8080".to_string(),
      store_path:           PathBuf::from("~/.local/share/dynasty/dynasty.db"),
      invite_ttl_days:      DEFAULT_TTL_DAYS,
      count_failure_policy: CountFailurePolicy::default(),
    }
  }
}

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn api_config(&self) -> ApiConfig {
    ApiConfig {
      base_url:   self.base_url.clone(),
      invite_ttl: chrono::Duration::days(self.invite_ttl_days.max(1)),
      sync:       SyncConfig { count_failure_policy: self.count_failure_policy },
    }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// The full application: `/health` plus the JSON API under `/api`.
pub fn router<S>(store: Arc<S>, config: &ServerConfig) -> Router
where
  S: DynastyStore + ChangeFeed + 'static,
{
  Router::new()
    .route("/health", get(health))
    .nest("/api", dynasty_api::api_router(store, config.api_config()))
    .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str { "ok" }
