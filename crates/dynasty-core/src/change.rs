//! Table-scoped change notifications.
//!
//! Backends publish a [`ChangeEvent`] after every committed write. Consumers
//! subscribe to a set of tables and receive every later event for those
//! tables. Events carry no row payload; receivers are expected to re-read.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use uuid::Uuid;

/// Default number of events buffered per subscriber before it lags.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Table {
  Profiles,
  Dynasties,
  DynastyMembers,
  DynastyInvites,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
  Insert,
  Update,
  Delete,
  /// The subscriber fell behind and dropped events; treat as "anything may
  /// have changed".
  Resync,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
  pub table:  Table,
  pub op:     ChangeOp,
  /// Primary key of the affected row, absent for [`ChangeOp::Resync`].
  pub row_id: Option<Uuid>,
}

impl ChangeEvent {
  pub fn new(table: Table, op: ChangeOp, row_id: Uuid) -> Self {
    Self { table, op, row_id: Some(row_id) }
  }

  fn resync(table: Table) -> Self {
    Self { table, op: ChangeOp::Resync, row_id: None }
  }
}

// ─── Bus ─────────────────────────────────────────────────────────────────────

/// In-process fan-out of change events.
///
/// Cloning is cheap; all clones publish into the same channel.
#[derive(Debug, Clone)]
pub struct ChangeBus {
  tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeBus {
  pub fn new(capacity: usize) -> Self {
    let (tx, _) = broadcast::channel(capacity);
    Self { tx }
  }

  /// Publish an event. Having no subscribers is not an error.
  pub fn publish(&self, event: ChangeEvent) {
    tracing::trace!(table = %event.table, op = ?event.op, "change published");
    let _ = self.tx.send(event);
  }

  pub fn subscribe(&self, tables: &[Table]) -> ChangeStream {
    ChangeStream { rx: self.tx.subscribe(), tables: tables.to_vec() }
  }
}

impl Default for ChangeBus {
  fn default() -> Self { Self::new(DEFAULT_CAPACITY) }
}

// ─── Stream ──────────────────────────────────────────────────────────────────

/// A subscription to a set of tables. Dropping it unsubscribes.
#[derive(Debug)]
pub struct ChangeStream {
  rx:     broadcast::Receiver<ChangeEvent>,
  tables: Vec<Table>,
}

impl ChangeStream {
  fn wants(&self, event: &ChangeEvent) -> bool {
    self.tables.is_empty() || self.tables.contains(&event.table)
  }

  fn first_table(&self) -> Table {
    self.tables.first().copied().unwrap_or(Table::Dynasties)
  }

  /// Wait for the next event in scope. Returns `None` once the publisher is
  /// gone.
  pub async fn next(&mut self) -> Option<ChangeEvent> {
    loop {
      match self.rx.recv().await {
        Ok(event) if self.wants(&event) => return Some(event),
        Ok(_) => continue,
        Err(RecvError::Lagged(skipped)) => {
          tracing::debug!(skipped, "change subscriber lagged");
          return Some(ChangeEvent::resync(self.first_table()));
        }
        Err(RecvError::Closed) => return None,
      }
    }
  }

  /// Discard every event already queued, returning how many in-scope events
  /// were dropped.
  pub fn drain_pending(&mut self) -> usize {
    let mut drained = 0;
    loop {
      match self.rx.try_recv() {
        Ok(event) => {
          if self.wants(&event) {
            drained += 1;
          }
        }
        Err(TryRecvError::Lagged(_)) => drained += 1,
        Err(TryRecvError::Empty | TryRecvError::Closed) => return drained,
      }
    }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Source of change notifications, keyed by table.
pub trait ChangeFeed: Send + Sync {
  /// Subscribe to changes on `tables`. An empty slice means every table.
  fn subscribe(&self, tables: &[Table]) -> ChangeStream;
}
