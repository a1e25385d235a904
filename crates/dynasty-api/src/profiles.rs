//! Handlers for `/profiles` endpoints.

use axum::{
  Json,
  extract::{Path, State},
};
use dynasty_core::{change::ChangeFeed, identity::Profile, store::DynastyStore};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, error::ApiError, identity::CurrentIdentity};

/// `GET /profiles/:id`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Profile>, ApiError>
where
  S: DynastyStore + ChangeFeed + 'static,
{
  let profile = state
    .store
    .get_profile(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("profile {id} not found")))?;
  Ok(Json(profile))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProfileBody {
  pub username:   Option<String>,
  pub full_name:  Option<String>,
  pub avatar_url: Option<String>,
  pub bio:        Option<String>,
}

/// `PUT /profiles/me` — replace the caller's display attributes.
pub async fn put_me<S>(
  State(state): State<ApiState<S>>,
  identity: CurrentIdentity,
  Json(body): Json<ProfileBody>,
) -> Result<Json<Profile>, ApiError>
where
  S: DynastyStore + ChangeFeed + 'static,
{
  let identity = identity.require()?;
  let profile = Profile {
    username: body.username,
    full_name: body.full_name,
    avatar_url: body.avatar_url,
    bio: body.bio,
    ..Profile::new(identity.user_id)
  };
  let stored = state
    .store
    .upsert_profile(profile)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(stored))
}
