//! Handlers for invite endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/dynasties/:id/invites` | Body: `{"email":"kin@example.org"}`; members only |
//! | `POST` | `/invites/:token/accept` | Joins the caller to the dynasty |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use dynasty_core::{
  change::ChangeFeed,
  dynasty::Membership,
  invite::{InviteLinks, issue_invite, redeem_invite},
  store::DynastyStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, error::ApiError, identity::CurrentIdentity};

#[derive(Debug, Default, Deserialize)]
pub struct CreateBody {
  #[serde(default)]
  pub email: Option<String>,
}

/// `POST /dynasties/:id/invites`
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Path(dynasty_id): Path<Uuid>,
  identity: CurrentIdentity,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DynastyStore + ChangeFeed + 'static,
{
  let identity = identity.require()?;
  let links = InviteLinks::new(state.config.base_url.as_str());
  let email = body.email.filter(|e| !e.trim().is_empty());

  let issued = issue_invite(
    &*state.store,
    &links,
    dynasty_id,
    identity.user_id,
    email,
    Some(state.config.invite_ttl),
  )
  .await?;
  Ok((StatusCode::CREATED, Json(issued)))
}

/// `POST /invites/:token/accept`
pub async fn accept<S>(
  State(state): State<ApiState<S>>,
  Path(token): Path<String>,
  identity: CurrentIdentity,
) -> Result<Json<Membership>, ApiError>
where
  S: DynastyStore + ChangeFeed + 'static,
{
  let identity = identity.require()?;
  let membership = redeem_invite(&*state.store, &token, identity.user_id).await?;
  Ok(Json(membership))
}
