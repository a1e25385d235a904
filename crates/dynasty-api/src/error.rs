//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unauthorized: {0}")]
  Unauthorized(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("gone: {0}")]
  Gone(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Convert a store error, keeping any domain error it carries.
  pub fn from_store<E: Into<dynasty_core::Error>>(e: E) -> Self { Self::from(e.into()) }
}

impl From<dynasty_core::Error> for ApiError {
  fn from(e: dynasty_core::Error) -> Self {
    use dynasty_core::Error as E;
    let message = e.to_string();
    match e {
      E::Unauthenticated => Self::Unauthorized(message),
      E::InvalidName => Self::BadRequest(message),
      E::DynastyNotFound(_) | E::InviteNotFound => Self::NotFound(message),
      E::NotAMember { .. } => Self::Forbidden(message),
      E::AlreadyMember { .. } | E::MemberLimitReached { .. } => Self::Conflict(message),
      E::InviteExpired | E::InviteAlreadyUsed => Self::Gone(message),
      E::Store(inner) => Self::Store(inner),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Gone(m) => (StatusCode::GONE, m.clone()),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure while handling request");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
