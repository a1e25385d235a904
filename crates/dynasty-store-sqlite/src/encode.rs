//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings (microsecond
//! precision, `Z` suffix) so that they sort and compare lexicographically.
//! UUIDs are stored as hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use dynasty_core::{
  dynasty::{Dynasty, DynastyRecord, DynastyStatus, MemberRole, Membership},
  identity::{FounderProfile, Profile},
  invite::{Invite, InviteStatus},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

/// The current time at the precision [`encode_dt`] keeps, so a row handed
/// back to the caller equals the same row read later.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

/// Drop sub-microsecond digits that would not survive storage.
pub fn stored_precision(dt: DateTime<Utc>) -> DateTime<Utc> { dt.trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

pub fn encode_limit(limit: Option<u32>) -> Option<i64> { limit.map(i64::from) }

fn decode_limit(v: Option<i64>) -> Result<Option<u32>> {
  v.map(|n| u32::try_from(n).map_err(|_| Error::Decode(format!("member_limit {n}"))))
    .transpose()
}

fn decode_status(s: &str) -> Result<DynastyStatus> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown dynasty status: {s:?}")))
}

fn decode_invite_status(s: &str) -> Result<InviteStatus> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown invite status: {s:?}")))
}

// ─── Column lists ────────────────────────────────────────────────────────────

/// Dynasty columns plus the founder profile, for
/// `FROM dynasties d LEFT JOIN profiles p ON p.id = d.founder_id`.
pub const DYNASTY_COLUMNS: &str = "d.id, d.name, d.description, d.status, d.founder_id, \
   d.member_limit, d.created_at, d.avatar_url, p.id, p.username, p.full_name";

pub const MEMBER_COLUMNS: &str = "m.id, m.dynasty_id, m.user_id, m.role, m.joined_at";

pub const MEMBER_COLUMN_COUNT: usize = 5;

pub const PROFILE_COLUMNS: &str =
  "id, username, full_name, avatar_url, bio, created_at";

pub const INVITE_COLUMNS: &str = "id, dynasty_id, inviter_id, email, status, \
   created_at, expires_at, used_at, used_by";

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values of a `dynasties` row joined with its founder's profile.
pub struct RawDynasty {
  pub id:                String,
  pub name:              String,
  pub description:       Option<String>,
  pub status:            String,
  pub founder_id:        String,
  pub member_limit:      Option<i64>,
  pub created_at:        String,
  pub avatar_url:        Option<String>,
  // profiles join
  pub founder_profile:   Option<String>,
  pub founder_username:  Option<String>,
  pub founder_full_name: Option<String>,
}

impl RawDynasty {
  /// Read [`DYNASTY_COLUMNS`] starting at column `at`.
  pub fn read(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                row.get(at)?,
      name:              row.get(at + 1)?,
      description:       row.get(at + 2)?,
      status:            row.get(at + 3)?,
      founder_id:        row.get(at + 4)?,
      member_limit:      row.get(at + 5)?,
      created_at:        row.get(at + 6)?,
      avatar_url:        row.get(at + 7)?,
      founder_profile:   row.get(at + 8)?,
      founder_username:  row.get(at + 9)?,
      founder_full_name: row.get(at + 10)?,
    })
  }

  pub fn into_record(self) -> Result<DynastyRecord> {
    let founder = self.founder_profile.map(|_| FounderProfile {
      username:  self.founder_username,
      full_name: self.founder_full_name,
    });
    Ok(DynastyRecord {
      dynasty: Dynasty {
        id:           decode_uuid(&self.id)?,
        name:         self.name,
        description:  self.description,
        status:       decode_status(&self.status)?,
        founder_id:   decode_uuid(&self.founder_id)?,
        member_limit: decode_limit(self.member_limit)?,
        created_at:   decode_dt(&self.created_at)?,
        avatar_url:   self.avatar_url,
      },
      founder,
    })
  }
}

/// Raw values of a `dynasty_members` row.
pub struct RawMembership {
  pub id:         String,
  pub dynasty_id: String,
  pub user_id:    String,
  pub role:       String,
  pub joined_at:  String,
}

impl RawMembership {
  /// Read [`MEMBER_COLUMNS`] starting at column `at`.
  pub fn read(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(at)?,
      dynasty_id: row.get(at + 1)?,
      user_id:    row.get(at + 2)?,
      role:       row.get(at + 3)?,
      joined_at:  row.get(at + 4)?,
    })
  }

  pub fn into_membership(self) -> Result<Membership> {
    Ok(Membership {
      id:         decode_uuid(&self.id)?,
      dynasty_id: decode_uuid(&self.dynasty_id)?,
      user_id:    decode_uuid(&self.user_id)?,
      role:       MemberRole::from(self.role),
      joined_at:  decode_dt(&self.joined_at)?,
    })
  }
}

/// Raw values of a `profiles` row.
pub struct RawProfile {
  pub id:         String,
  pub username:   Option<String>,
  pub full_name:  Option<String>,
  pub avatar_url: Option<String>,
  pub bio:        Option<String>,
  pub created_at: String,
}

impl RawProfile {
  pub fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      username:   row.get(1)?,
      full_name:  row.get(2)?,
      avatar_url: row.get(3)?,
      bio:        row.get(4)?,
      created_at: row.get(5)?,
    })
  }

  pub fn into_profile(self) -> Result<Profile> {
    Ok(Profile {
      id:         decode_uuid(&self.id)?,
      username:   self.username,
      full_name:  self.full_name,
      avatar_url: self.avatar_url,
      bio:        self.bio,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values of a `dynasty_invites` row (without the token digest).
pub struct RawInvite {
  pub id:         String,
  pub dynasty_id: String,
  pub inviter_id: String,
  pub email:      Option<String>,
  pub status:     String,
  pub created_at: String,
  pub expires_at: Option<String>,
  pub used_at:    Option<String>,
  pub used_by:    Option<String>,
}

impl RawInvite {
  pub fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      dynasty_id: row.get(1)?,
      inviter_id: row.get(2)?,
      email:      row.get(3)?,
      status:     row.get(4)?,
      created_at: row.get(5)?,
      expires_at: row.get(6)?,
      used_at:    row.get(7)?,
      used_by:    row.get(8)?,
    })
  }

  pub fn into_invite(self) -> Result<Invite> {
    Ok(Invite {
      id:         decode_uuid(&self.id)?,
      dynasty_id: decode_uuid(&self.dynasty_id)?,
      inviter_id: decode_uuid(&self.inviter_id)?,
      email:      self.email,
      status:     decode_invite_status(&self.status)?,
      created_at: decode_dt(&self.created_at)?,
      expires_at: decode_opt_dt(self.expires_at)?,
      used_at:    decode_opt_dt(self.used_at)?,
      used_by:    self.used_by.as_deref().map(decode_uuid).transpose()?,
    })
  }
}
