//! Handlers for `/dynasties` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/dynasties` | Dynasty views of the caller; `[]` when anonymous |
//! | `POST` | `/dynasties` | Body: `{"name":"Smiths","description":null}` |
//! | `GET`  | `/dynasties/stream` | Server-sent `state` events, one per change |
//! | `GET`  | `/dynasties/:id` | 404 if not found |
//! | `GET`  | `/dynasties/:id/members` | Oldest member first |

use std::{convert::Infallible, sync::Arc};

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::{
    IntoResponse,
    sse::{Event, KeepAlive, Sse},
  },
};
use dynasty_core::{
  change::ChangeFeed,
  dynasty::{DynastyRecord, DynastyView, Membership, NewDynasty},
  store::DynastyStore,
  sync::{self, DynastySync, SyncState},
};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{ApiState, error::ApiError, identity::CurrentIdentity};

// ─── List ────────────────────────────────────────────────────────────────────

/// `GET /dynasties` — one refresh cycle for the caller.
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  CurrentIdentity(identity): CurrentIdentity,
) -> Result<Json<Vec<DynastyView>>, ApiError>
where
  S: DynastyStore + ChangeFeed + 'static,
{
  let Some(identity) = identity else {
    return Ok(Json(Vec::new()));
  };
  let views = sync::load_dynasty_views(
    &*state.store,
    identity.user_id,
    state.config.sync.count_failure_policy,
  )
  .await?;
  Ok(Json(views))
}

// ─── Create ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub name:        String,
  #[serde(default)]
  pub description: Option<String>,
}

/// `POST /dynasties` — body: `{"name":"Smiths"}`
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  CurrentIdentity(identity): CurrentIdentity,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DynastyStore + ChangeFeed + 'static,
{
  let dynasty = sync::create_dynasty(
    &*state.store,
    identity.as_ref(),
    NewDynasty::new(body.name, body.description),
  )
  .await?;
  Ok((StatusCode::CREATED, Json(dynasty)))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

async fn find<S: DynastyStore>(store: &S, id: Uuid) -> Result<DynastyRecord, ApiError> {
  store
    .get_dynasty(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("dynasty {id} not found")))
}

/// `GET /dynasties/:id`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<DynastyRecord>, ApiError>
where
  S: DynastyStore + ChangeFeed + 'static,
{
  Ok(Json(find(&*state.store, id).await?))
}

/// `GET /dynasties/:id/members`
pub async fn members<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Membership>>, ApiError>
where
  S: DynastyStore + ChangeFeed + 'static,
{
  find(&*state.store, id).await?;
  let members = state
    .store
    .list_members(id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(members))
}

// ─── Stream ──────────────────────────────────────────────────────────────────

/// `GET /dynasties/stream` — the caller's synchronized list as SSE.
///
/// Each connection runs its own [`DynastySync`]; it stops when the client
/// disconnects and the stream is dropped.
pub async fn stream<S>(
  State(state): State<ApiState<S>>,
  identity: CurrentIdentity,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError>
where
  S: DynastyStore + ChangeFeed + 'static,
{
  let identity = identity.require()?;
  tracing::debug!(user_id = %identity.user_id, "dynasty stream opened");

  let mut sync = DynastySync::new(Arc::clone(&state.store), state.config.sync);
  sync.set_identity(Some(identity));
  let rx = sync.subscribe();

  Ok(Sse::new(state_events(sync, rx)).keep_alive(KeepAlive::default()))
}

/// One `state` event for the current value, then one per published change.
fn state_events<S>(
  sync: DynastySync<S>,
  rx: watch::Receiver<SyncState>,
) -> impl Stream<Item = Result<Event, Infallible>>
where
  S: DynastyStore + ChangeFeed + 'static,
{
  stream::unfold((sync, rx, true), |(sync, mut rx, first)| async move {
    if !first && rx.changed().await.is_err() {
      return None;
    }
    let snapshot = rx.borrow_and_update().clone();
    let event = match Event::default().event("state").json_data(&snapshot) {
      Ok(event) => event,
      Err(e) => {
        tracing::error!(error = %e, "cannot encode sync state");
        Event::default().event("error").data(e.to_string())
      }
    };
    Some((Ok(event), (sync, rx, false)))
  })
}
