//! Identities and profiles.
//!
//! Sign-in and session management belong to the external identity provider.
//! This crate only ever sees an already-established [`Identity`]; the
//! `profiles` table carries the display attributes shown for other users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The signed-in user, as asserted by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub user_id:      Uuid,
  pub display_name: String,
  pub avatar_url:   Option<String>,
}

impl Identity {
  pub fn new(user_id: Uuid, display_name: impl Into<String>) -> Self {
    Self { user_id, display_name: display_name.into(), avatar_url: None }
  }

  /// Build an identity from a stored profile, preferring the full name over
  /// the username and falling back to the UUID.
  pub fn from_profile(profile: &Profile) -> Self {
    Self {
      user_id:      profile.id,
      display_name: profile.display_name(),
      avatar_url:   profile.avatar_url.clone(),
    }
  }
}

/// Display attributes of a user, keyed by the identity provider's user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
  pub id:         Uuid,
  pub username:   Option<String>,
  pub full_name:  Option<String>,
  pub avatar_url: Option<String>,
  pub bio:        Option<String>,
  pub created_at: DateTime<Utc>,
}

impl Profile {
  /// An empty profile for `id`, stamped now.
  pub fn new(id: Uuid) -> Self {
    Self {
      id,
      username: None,
      full_name: None,
      avatar_url: None,
      bio: None,
      created_at: Utc::now(),
    }
  }

  pub fn display_name(&self) -> String {
    self
      .full_name
      .clone()
      .or_else(|| self.username.clone())
      .unwrap_or_else(|| self.id.to_string())
  }
}

/// The subset of a founder's profile resolved onto each dynasty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FounderProfile {
  pub username:  Option<String>,
  pub full_name: Option<String>,
}

impl From<&Profile> for FounderProfile {
  fn from(p: &Profile) -> Self {
    Self { username: p.username.clone(), full_name: p.full_name.clone() }
  }
}
