//! The `DynastyStore` trait.
//!
//! Implemented by storage backends (e.g. `dynasty-store-sqlite`). The
//! synchronization component and the HTTP layer depend on this abstraction,
//! never on a concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  dynasty::{Dynasty, DynastyRecord, MemberOf, MemberRole, Membership, NewDynasty},
  identity::Profile,
  invite::{Invite, NewInvite},
};

/// Abstraction over a Dynasty storage backend.
///
/// Backend errors must convert into [`crate::Error`] so that domain failures
/// (duplicate membership, exhausted member limit, ...) survive the trip
/// through generic code.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait DynastyStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static + Into<crate::Error>;

  // ── Profiles ──────────────────────────────────────────────────────────

  /// Insert or replace the profile with `profile.id`. The original
  /// `created_at` is kept on replace.
  fn upsert_profile(
    &self,
    profile: Profile,
  ) -> impl Future<Output = Result<Profile, Self::Error>> + Send + '_;

  fn get_profile(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + '_;

  // ── Dynasties ─────────────────────────────────────────────────────────

  /// Create a dynasty with status `active` founded by `founder_id`, and
  /// record the founder as its first member (role `founder`).
  ///
  /// Both rows are written together: either both exist afterwards or
  /// neither does. The founder membership is not subject to
  /// `member_limit`.
  fn create_dynasty(
    &self,
    founder_id: Uuid,
    input: NewDynasty,
  ) -> impl Future<Output = Result<Dynasty, Self::Error>> + Send + '_;

  /// Fetch one dynasty with its founder profile. `None` if unknown.
  fn get_dynasty(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<DynastyRecord>, Self::Error>> + Send + '_;

  /// Every membership of `user_id`, joined with its dynasty.
  fn memberships_of(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<MemberOf>, Self::Error>> + Send + '_;

  /// Every dynasty whose founder is `user_id`.
  fn dynasties_founded_by(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<DynastyRecord>, Self::Error>> + Send + '_;

  // ── Memberships ───────────────────────────────────────────────────────

  /// Add `user_id` to a dynasty.
  ///
  /// Fails with [`crate::Error::DynastyNotFound`],
  /// [`crate::Error::AlreadyMember`] or
  /// [`crate::Error::MemberLimitReached`].
  fn add_member(
    &self,
    dynasty_id: Uuid,
    user_id: Uuid,
    role: MemberRole,
  ) -> impl Future<Output = Result<Membership, Self::Error>> + Send + '_;

  /// Members of a dynasty, oldest first.
  fn list_members(
    &self,
    dynasty_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Membership>, Self::Error>> + Send + '_;

  fn count_members(
    &self,
    dynasty_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Invites ───────────────────────────────────────────────────────────

  /// Persist an invite. The inviter must be a member of the dynasty.
  fn create_invite(
    &self,
    input: NewInvite,
  ) -> impl Future<Output = Result<Invite, Self::Error>> + Send + '_;

  /// Redeem the pending invite whose token digest is `token_hash`, adding
  /// `user_id` as a `member`. The membership insert and the invite update
  /// happen together.
  fn accept_invite(
    &self,
    token_hash: String,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Membership, Self::Error>> + Send + '_;
}
