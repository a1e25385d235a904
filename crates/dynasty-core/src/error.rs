//! Error types for `dynasty-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("user not authenticated")]
  Unauthenticated,

  #[error("dynasty name must not be empty")]
  InvalidName,

  #[error("dynasty not found: {0}")]
  DynastyNotFound(Uuid),

  #[error("user {user_id} is already a member of dynasty {dynasty_id}")]
  AlreadyMember { dynasty_id: Uuid, user_id: Uuid },

  #[error("user {user_id} is not a member of dynasty {dynasty_id}")]
  NotAMember { dynasty_id: Uuid, user_id: Uuid },

  #[error("dynasty {dynasty_id} has reached its limit of {limit} members")]
  MemberLimitReached { dynasty_id: Uuid, limit: u32 },

  #[error("invite not found")]
  InviteNotFound,

  #[error("invite has expired")]
  InviteExpired,

  #[error("invite has already been used")]
  InviteAlreadyUsed,

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap an arbitrary backend error.
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
