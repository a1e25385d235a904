//! Dynasties and memberships.
//!
//! A dynasty is a named family group. Every dynasty has exactly one founder,
//! who is also recorded as its first member. Memberships are unique per
//! (dynasty, user) pair.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::identity::FounderProfile;

// ─── Dynasty ─────────────────────────────────────────────────────────────────

/// Tier of a dynasty.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DynastyStatus {
  #[default]
  Active,
  Premium,
  Founder,
}

/// A stored dynasty row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dynasty {
  pub id:           Uuid,
  pub name:         String,
  pub description:  Option<String>,
  pub status:       DynastyStatus,
  pub founder_id:   Uuid,
  /// Maximum number of members; `None` means unlimited.
  pub member_limit: Option<u32>,
  pub created_at:   DateTime<Utc>,
  pub avatar_url:   Option<String>,
}

/// Input to [`crate::store::DynastyStore::create_dynasty`].
///
/// The founder, status and timestamps are set by the store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDynasty {
  pub name:         String,
  pub description:  Option<String>,
  pub member_limit: Option<u32>,
  pub avatar_url:   Option<String>,
}

impl NewDynasty {
  pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
    Self { name: name.into(), description, ..Self::default() }
  }
}

/// A dynasty joined with its founder's profile, if one exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynastyRecord {
  pub dynasty: Dynasty,
  pub founder: Option<FounderProfile>,
}

// ─── Membership ──────────────────────────────────────────────────────────────

/// Role label carried by a membership. Unknown labels are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MemberRole {
  Founder,
  #[default]
  Member,
  Other(String),
}

impl MemberRole {
  pub fn as_str(&self) -> &str {
    match self {
      Self::Founder => "founder",
      Self::Member => "member",
      Self::Other(s) => s,
    }
  }
}

impl fmt::Display for MemberRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl From<String> for MemberRole {
  fn from(s: String) -> Self {
    match s.as_str() {
      "founder" => Self::Founder,
      "member" => Self::Member,
      _ => Self::Other(s),
    }
  }
}

impl Serialize for MemberRole {
  fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(self.as_str())
  }
}

impl<'de> Deserialize<'de> for MemberRole {
  fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
    String::deserialize(d).map(Self::from)
  }
}

/// An identity's association with a dynasty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
  pub id:         Uuid,
  pub dynasty_id: Uuid,
  pub user_id:    Uuid,
  pub role:       MemberRole,
  pub joined_at:  DateTime<Utc>,
}

/// A membership row joined with the dynasty it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberOf {
  pub membership: Membership,
  pub dynasty:    DynastyRecord,
}

// ─── Read model ──────────────────────────────────────────────────────────────

/// The per-identity read model: a dynasty, its founder's display attributes
/// and a member count. Never stored, rebuilt on every refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynastyView {
  #[serde(flatten)]
  pub dynasty:      Dynasty,
  pub founder:      Option<FounderProfile>,
  pub member_count: u64,
}

impl DynastyView {
  pub fn new(record: DynastyRecord, member_count: u64) -> Self {
    Self { dynasty: record.dynasty, founder: record.founder, member_count }
  }
}
