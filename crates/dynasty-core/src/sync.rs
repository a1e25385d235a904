//! The dynasty synchronization component.
//!
//! [`DynastySync`] owns the list of [`DynastyView`]s visible to the active
//! identity: every dynasty the identity founded or belongs to, each exactly
//! once, annotated with its current member count. The list is published
//! through a [`watch`] channel and recomputed from scratch whenever the
//! `dynasties` or `dynasty_members` tables change.
//!
//! One refresh cycle:
//!
//! 1. no identity → empty list, not loading, no error;
//! 2. load the identity's memberships (joined with their dynasties) and the
//!    dynasties it founded — a failure of either aborts the cycle;
//! 3. merge both into a map keyed by dynasty id, founder rows applied last;
//! 4. count members of every merged dynasty concurrently, applying the
//!    [`CountFailurePolicy`] to individual failures;
//! 5. publish, replacing the previous list and clearing any error.

use std::{collections::HashMap, sync::Arc};

use futures_util::future::{join_all, try_join};
use serde::{Deserialize, Serialize};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  change::{ChangeFeed, Table},
  dynasty::{Dynasty, DynastyRecord, DynastyView, NewDynasty},
  identity::Identity,
  store::DynastyStore,
};

/// Tables whose changes trigger a refresh.
pub const WATCHED_TABLES: [Table; 2] = [Table::Dynasties, Table::DynastyMembers];

// ─── Configuration ───────────────────────────────────────────────────────────

/// What a failed per-dynasty member count does to the refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountFailurePolicy {
  /// Log the failure and report a count of zero for that dynasty.
  #[default]
  DegradeToZero,
  /// Abort the whole cycle, like a failed membership query.
  FailCycle,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SyncConfig {
  #[serde(default)]
  pub count_failure_policy: CountFailurePolicy,
}

// ─── Published state ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncState {
  pub dynasties: Vec<DynastyView>,
  pub loading:   bool,
  /// Message of the last failed cycle; cleared by the next successful one.
  pub error:     Option<String>,
  /// Bumped on every identity change; cycles started for an older
  /// generation never publish.
  #[serde(skip)]
  generation:    u64,
}

// ─── Read algorithm ──────────────────────────────────────────────────────────

/// Run one refresh cycle for `user_id` against `store` and return the
/// dynasty views, ordered by creation time (ties broken by id).
pub async fn load_dynasty_views<S: DynastyStore>(
  store: &S,
  user_id: Uuid,
  policy: CountFailurePolicy,
) -> Result<Vec<DynastyView>> {
  let (member_of, founded) = try_join(
    async { store.memberships_of(user_id).await.map_err(Into::<Error>::into) },
    async { store.dynasties_founded_by(user_id).await.map_err(Into::<Error>::into) },
  )
  .await?;

  let mut merged: HashMap<Uuid, DynastyRecord> =
    HashMap::with_capacity(member_of.len() + founded.len());
  for row in member_of {
    merged.insert(row.dynasty.dynasty.id, row.dynasty);
  }
  for record in founded {
    merged.insert(record.dynasty.id, record);
  }

  let records: Vec<DynastyRecord> = merged.into_values().collect();
  let ids: Vec<Uuid> = records.iter().map(|r| r.dynasty.id).collect();
  let counts = join_all(ids.iter().map(|id| store.count_members(*id))).await;

  let mut views = Vec::with_capacity(records.len());
  for (record, count) in records.into_iter().zip(counts) {
    let member_count = match count {
      Ok(n) => n,
      Err(e) => {
        let e: Error = e.into();
        match policy {
          CountFailurePolicy::DegradeToZero => {
            warn!(dynasty_id = %record.dynasty.id, error = %e, "member count failed; reporting 0");
            0
          }
          CountFailurePolicy::FailCycle => return Err(e),
        }
      }
    };
    views.push(DynastyView::new(record, member_count));
  }

  views.sort_by(|a, b| {
    a.dynasty
      .created_at
      .cmp(&b.dynasty.created_at)
      .then_with(|| a.dynasty.id.cmp(&b.dynasty.id))
  });
  Ok(views)
}

/// Create a dynasty founded by `identity`, together with its founder
/// membership.
///
/// Fails with [`Error::Unauthenticated`] before touching the store when no
/// identity is given.
pub async fn create_dynasty<S: DynastyStore>(
  store: &S,
  identity: Option<&Identity>,
  mut input: NewDynasty,
) -> Result<Dynasty> {
  let identity = identity.ok_or(Error::Unauthenticated)?;

  input.name = input.name.trim().to_owned();
  if input.name.is_empty() {
    return Err(Error::InvalidName);
  }
  input.description = input
    .description
    .map(|d| d.trim().to_owned())
    .filter(|d| !d.is_empty());

  let dynasty = store
    .create_dynasty(identity.user_id, input)
    .await
    .map_err(Into::<Error>::into)?;

  info!(dynasty_id = %dynasty.id, founder_id = %identity.user_id, "dynasty created");
  Ok(dynasty)
}

// ─── Component ───────────────────────────────────────────────────────────────

/// Keeps the dynasty list of the active identity current.
///
/// While an identity is set, a background task holds a change subscription
/// on [`WATCHED_TABLES`] and re-runs the full cycle on every notification.
/// Notifications that arrive while a cycle is running are coalesced into a
/// single follow-up cycle. The task is stopped when the identity changes or
/// the component is dropped.
///
/// [`DynastySync::set_identity`] spawns onto the current Tokio runtime.
pub struct DynastySync<S> {
  store:    Arc<S>,
  config:   SyncConfig,
  state:    Arc<watch::Sender<SyncState>>,
  identity: Option<Identity>,
  task:     Option<JoinHandle<()>>,
}

impl<S> DynastySync<S>
where
  S: DynastyStore + ChangeFeed + 'static,
{
  pub fn new(store: Arc<S>, config: SyncConfig) -> Self {
    let (state, _) = watch::channel(SyncState::default());
    Self { store, config, state: Arc::new(state), identity: None, task: None }
  }

  /// Observe the published state.
  pub fn subscribe(&self) -> watch::Receiver<SyncState> { self.state.subscribe() }

  /// A snapshot of the published state.
  pub fn state(&self) -> SyncState { self.state.borrow().clone() }

  pub fn identity(&self) -> Option<&Identity> { self.identity.as_ref() }

  /// Switch the active identity.
  ///
  /// `None` clears the list immediately without touching the store. `Some`
  /// starts a fresh subscription and refresh cycle for that identity.
  pub fn set_identity(&mut self, identity: Option<Identity>) {
    if identity.is_some() && identity == self.identity && self.task.is_some() {
      return;
    }

    if let Some(task) = self.task.take() {
      task.abort();
    }

    let mut generation = 0;
    self.state.send_modify(|s| {
      s.generation += 1;
      generation = s.generation;
      s.dynasties.clear();
      s.error = None;
      s.loading = identity.is_some();
    });
    self.identity = identity;

    let Some(identity) = &self.identity else {
      debug!("identity cleared");
      return;
    };

    debug!(user_id = %identity.user_id, "identity set; starting dynasty sync");
    self.task = Some(tokio::spawn(watch_changes(
      Arc::clone(&self.store),
      identity.user_id,
      self.config.count_failure_policy,
      Arc::clone(&self.state),
      generation,
    )));
  }

  /// Run one refresh cycle now, publish its outcome and return it.
  pub async fn refresh(&self) -> Result<Vec<DynastyView>> {
    let Some(identity) = &self.identity else {
      return Ok(Vec::new());
    };
    let generation = self.state.borrow().generation;
    run_cycle(
      &*self.store,
      identity.user_id,
      self.config.count_failure_policy,
      &self.state,
      generation,
    )
    .await
  }

  /// Create a dynasty founded by the active identity.
  ///
  /// The published list picks the new dynasty up through the change feed.
  pub async fn create_dynasty(
    &self,
    name: &str,
    description: Option<&str>,
  ) -> Result<Dynasty> {
    create_dynasty(
      &*self.store,
      self.identity.as_ref(),
      NewDynasty::new(name, description.map(str::to_owned)),
    )
    .await
  }
}

impl<S> Drop for DynastySync<S> {
  fn drop(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

// ─── Background task ─────────────────────────────────────────────────────────

async fn watch_changes<S>(
  store: Arc<S>,
  user_id: Uuid,
  policy: CountFailurePolicy,
  state: Arc<watch::Sender<SyncState>>,
  generation: u64,
) where
  S: DynastyStore + ChangeFeed,
{
  // Subscribe before the first read so no change can slip between them.
  let mut changes = store.subscribe(&WATCHED_TABLES);
  let _ = run_cycle(&*store, user_id, policy, &state, generation).await;

  while let Some(event) = changes.next().await {
    let coalesced = changes.drain_pending();
    debug!(table = %event.table, op = ?event.op, coalesced, "change received; refreshing");
    let _ = run_cycle(&*store, user_id, policy, &state, generation).await;
  }

  debug!(%user_id, "change feed closed");
}

async fn run_cycle<S: DynastyStore>(
  store: &S,
  user_id: Uuid,
  policy: CountFailurePolicy,
  state: &watch::Sender<SyncState>,
  generation: u64,
) -> Result<Vec<DynastyView>> {
  publish(state, generation, |s| s.loading = true);

  let result = load_dynasty_views(store, user_id, policy).await;
  match &result {
    Ok(views) => {
      debug!(%user_id, count = views.len(), "refresh cycle complete");
      publish(state, generation, |s| {
        s.dynasties = views.clone();
        s.error = None;
        s.loading = false;
      });
    }
    Err(e) => {
      error!(%user_id, error = %e, "refresh cycle failed");
      let message = e.to_string();
      publish(state, generation, |s| {
        s.error = Some(message);
        s.loading = false;
      });
    }
  }
  result
}

/// Apply `f` unless the state has moved on to a newer generation.
fn publish(
  state: &watch::Sender<SyncState>,
  generation: u64,
  f: impl FnOnce(&mut SyncState),
) -> bool {
  state.send_if_modified(|s| {
    if s.generation != generation {
      return false;
    }
    f(s);
    true
  })
}
