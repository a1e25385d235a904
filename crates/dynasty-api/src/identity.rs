//! Caller identity, as asserted by the upstream identity provider.

use axum::{extract::FromRequestParts, http::request::Parts};
use dynasty_core::{change::ChangeFeed, identity::Identity, store::DynastyStore};
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

/// Header carrying the authenticated user's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The identity behind a request, if any.
///
/// Display attributes are resolved from the caller's stored profile; a
/// caller without a profile is known by their id alone.
pub struct CurrentIdentity(pub Option<Identity>);

impl CurrentIdentity {
  /// The identity, or `401` when the request is anonymous.
  pub fn require(self) -> Result<Identity, ApiError> {
    self
      .0
      .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_ID_HEADER} header")))
  }
}

/// Parse [`USER_ID_HEADER`] without touching the store.
pub fn user_id(parts: &Parts) -> Result<Option<Uuid>, ApiError> {
  let Some(value) = parts.headers.get(USER_ID_HEADER) else {
    return Ok(None);
  };
  value
    .to_str()
    .ok()
    .and_then(|s| Uuid::parse_str(s.trim()).ok())
    .map(Some)
    .ok_or_else(|| ApiError::BadRequest(format!("{USER_ID_HEADER} is not a UUID")))
}

impl<S> FromRequestParts<ApiState<S>> for CurrentIdentity
where
  S: DynastyStore + ChangeFeed + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &ApiState<S>,
  ) -> Result<Self, Self::Rejection> {
    let Some(id) = user_id(parts)? else {
      return Ok(Self(None));
    };
    let identity = match state.store.get_profile(id).await.map_err(ApiError::from_store)? {
      Some(profile) => Identity::from_profile(&profile),
      None => Identity::new(id, id.to_string()),
    };
    Ok(Self(Some(identity)))
  }
}
