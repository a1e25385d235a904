//! [`SqliteStore`] — the SQLite implementation of [`DynastyStore`].

use std::path::Path;

use dynasty_core::{
  Error as CoreError,
  change::{ChangeBus, ChangeEvent, ChangeFeed, ChangeOp, ChangeStream, Table},
  dynasty::{
    Dynasty, DynastyRecord, DynastyStatus, MemberOf, MemberRole, Membership,
    NewDynasty,
  },
  identity::Profile,
  invite::{Invite, InviteStatus, NewInvite},
  store::DynastyStore,
};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    DYNASTY_COLUMNS, INVITE_COLUMNS, MEMBER_COLUMNS,
    MEMBER_COLUMN_COUNT, PROFILE_COLUMNS, RawDynasty, RawInvite, RawMembership,
    RawProfile, encode_dt, encode_limit, encode_uuid, now, stored_precision,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Dynasty store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection and change bus are
/// reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:    tokio_rusqlite::Connection,
  changes: ChangeBus,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, changes: ChangeBus::default() })
  }

  fn announce(&self, table: Table, op: ChangeOp, row_id: Uuid) {
    self.changes.publish(ChangeEvent::new(table, op, row_id));
  }

  /// Run a `SELECT {DYNASTY_COLUMNS} ... WHERE <filter>` with one parameter.
  async fn select_dynasties(
    &self,
    filter: &'static str,
    param: String,
  ) -> Result<Vec<DynastyRecord>> {
    let raws: Vec<RawDynasty> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {DYNASTY_COLUMNS}
           FROM dynasties d
           LEFT JOIN profiles p ON p.id = d.founder_id
           WHERE {filter}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![param], |row| RawDynasty::read(row, 0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDynasty::into_record).collect()
  }
}

// ─── Transaction helpers ─────────────────────────────────────────────────────

/// A membership about to be inserted, pre-encoded for SQL.
struct MemberRow {
  id:         Uuid,
  dynasty_id: Uuid,
  user_id:    Uuid,
  role:       String,
  joined_at:  String,
}

impl From<&Membership> for MemberRow {
  fn from(m: &Membership) -> Self {
    Self {
      id:         m.id,
      dynasty_id: m.dynasty_id,
      user_id:    m.user_id,
      role:       m.role.to_string(),
      joined_at:  encode_dt(m.joined_at),
    }
  }
}

/// Insert a membership after checking that the dynasty exists, the pair is
/// new and the member limit leaves room. Runs inside the caller's
/// transaction; a domain refusal is returned as the inner `Err`.
fn insert_member_checked(
  conn: &rusqlite::Connection,
  row: &MemberRow,
) -> rusqlite::Result<Result<(), CoreError>> {
  let dynasty_id = encode_uuid(row.dynasty_id);
  let user_id    = encode_uuid(row.user_id);

  let limit: Option<Option<i64>> = conn
    .query_row(
      "SELECT member_limit FROM dynasties WHERE id = ?1",
      rusqlite::params![dynasty_id],
      |r| r.get(0),
    )
    .optional()?;
  let Some(limit) = limit else {
    return Ok(Err(CoreError::DynastyNotFound(row.dynasty_id)));
  };

  let exists = conn
    .query_row(
      "SELECT 1 FROM dynasty_members WHERE dynasty_id = ?1 AND user_id = ?2",
      rusqlite::params![dynasty_id, user_id],
      |_| Ok(()),
    )
    .optional()?
    .is_some();
  if exists {
    return Ok(Err(CoreError::AlreadyMember {
      dynasty_id: row.dynasty_id,
      user_id:    row.user_id,
    }));
  }

  if let Some(limit) = limit {
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM dynasty_members WHERE dynasty_id = ?1",
      rusqlite::params![dynasty_id],
      |r| r.get(0),
    )?;
    if count >= limit {
      return Ok(Err(CoreError::MemberLimitReached {
        dynasty_id: row.dynasty_id,
        limit:      u32::try_from(limit).unwrap_or(u32::MAX),
      }));
    }
  }

  conn.execute(
    "INSERT INTO dynasty_members (id, dynasty_id, user_id, role, joined_at)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![encode_uuid(row.id), dynasty_id, user_id, row.role, row.joined_at],
  )?;
  Ok(Ok(()))
}

// ─── DynastyStore impl ───────────────────────────────────────────────────────

impl ChangeFeed for SqliteStore {
  fn subscribe(&self, tables: &[Table]) -> ChangeStream { self.changes.subscribe(tables) }
}

impl DynastyStore for SqliteStore {
  type Error = crate::Error;

  // ── Profiles ──────────────────────────────────────────────────────────────

  async fn upsert_profile(&self, mut profile: Profile) -> Result<Profile> {
    let id_str     = encode_uuid(profile.id);
    let created    = encode_dt(profile.created_at);
    let updated    = encode_dt(now());
    let username   = profile.username.clone();
    let full_name  = profile.full_name.clone();
    let avatar_url = profile.avatar_url.clone();
    let bio        = profile.bio.clone();

    let stored_created: String = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "INSERT INTO profiles
             (id, username, full_name, avatar_url, bio, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT(id) DO UPDATE SET
             username   = excluded.username,
             full_name  = excluded.full_name,
             avatar_url = excluded.avatar_url,
             bio        = excluded.bio,
             updated_at = excluded.updated_at
           RETURNING created_at",
          rusqlite::params![id_str, username, full_name, avatar_url, bio, created, updated],
          |r| r.get(0),
        )?)
      })
      .await?;

    profile.created_at = crate::encode::decode_dt(&stored_created)?;
    self.announce(Table::Profiles, ChangeOp::Update, profile.id);
    Ok(profile)
  }

  async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawProfile> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
              rusqlite::params![id_str],
              RawProfile::read,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawProfile::into_profile).transpose()
  }

  // ── Dynasties ─────────────────────────────────────────────────────────────

  async fn create_dynasty(&self, founder_id: Uuid, input: NewDynasty) -> Result<Dynasty> {
    let dynasty = Dynasty {
      id:           Uuid::new_v4(),
      name:         input.name,
      description:  input.description,
      status:       DynastyStatus::Active,
      founder_id,
      member_limit: input.member_limit,
      created_at:   now(),
      avatar_url:   input.avatar_url,
    };
    let founder = Membership {
      id:         Uuid::new_v4(),
      dynasty_id: dynasty.id,
      user_id:    founder_id,
      role:       MemberRole::Founder,
      joined_at:  dynasty.created_at,
    };

    let id_str      = encode_uuid(dynasty.id);
    let name        = dynasty.name.clone();
    let description = dynasty.description.clone();
    let status      = dynasty.status.as_ref().to_owned();
    let founder_str = encode_uuid(founder_id);
    let limit       = encode_limit(dynasty.member_limit);
    let at_str      = encode_dt(dynasty.created_at);
    let avatar_url  = dynasty.avatar_url.clone();
    let member_row  = MemberRow::from(&founder);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO dynasties (
             id, name, description, status, founder_id,
             member_limit, created_at, updated_at, avatar_url
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8)",
          rusqlite::params![
            id_str,
            name,
            description,
            status,
            founder_str,
            limit,
            at_str,
            avatar_url,
          ],
        )?;
        tx.execute(
          "INSERT INTO dynasty_members (id, dynasty_id, user_id, role, joined_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![
            encode_uuid(member_row.id),
            id_str,
            founder_str,
            member_row.role,
            member_row.joined_at,
          ],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::debug!(dynasty_id = %dynasty.id, "dynasty row and founder membership written");
    self.announce(Table::Dynasties, ChangeOp::Insert, dynasty.id);
    self.announce(Table::DynastyMembers, ChangeOp::Insert, founder.id);
    Ok(dynasty)
  }

  async fn get_dynasty(&self, id: Uuid) -> Result<Option<DynastyRecord>> {
    Ok(self.select_dynasties("d.id = ?1", encode_uuid(id)).await?.into_iter().next())
  }

  async fn memberships_of(&self, user_id: Uuid) -> Result<Vec<MemberOf>> {
    let user_str    = encode_uuid(user_id);

    let raws: Vec<(RawMembership, RawDynasty)> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {MEMBER_COLUMNS}, {DYNASTY_COLUMNS}
           FROM dynasty_members m
           JOIN dynasties d ON d.id = m.dynasty_id
           LEFT JOIN profiles p ON p.id = d.founder_id
           WHERE m.user_id = ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![user_str], |row| {
            Ok((RawMembership::read(row, 0)?, RawDynasty::read(row, MEMBER_COLUMN_COUNT)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(m, d)| {
        Ok(MemberOf { membership: m.into_membership()?, dynasty: d.into_record()? })
      })
      .collect()
  }

  async fn dynasties_founded_by(&self, user_id: Uuid) -> Result<Vec<DynastyRecord>> {
    self.select_dynasties("d.founder_id = ?1", encode_uuid(user_id)).await
  }

  // ── Memberships ───────────────────────────────────────────────────────────

  async fn add_member(
    &self,
    dynasty_id: Uuid,
    user_id: Uuid,
    role: MemberRole,
  ) -> Result<Membership> {
    let membership = Membership {
      id: Uuid::new_v4(),
      dynasty_id,
      user_id,
      role,
      joined_at: now(),
    };
    let row = MemberRow::from(&membership);

    let outcome: Result<(), CoreError> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let outcome = insert_member_checked(&tx, &row)?;
        if outcome.is_ok() {
          tx.commit()?;
        }
        Ok(outcome)
      })
      .await?;
    outcome?;

    self.announce(Table::DynastyMembers, ChangeOp::Insert, membership.id);
    Ok(membership)
  }

  async fn list_members(&self, dynasty_id: Uuid) -> Result<Vec<Membership>> {
    let dynasty_str = encode_uuid(dynasty_id);

    let raws: Vec<RawMembership> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {MEMBER_COLUMNS} FROM dynasty_members m
           WHERE m.dynasty_id = ?1
           ORDER BY m.joined_at, m.id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![dynasty_str], |row| RawMembership::read(row, 0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMembership::into_membership).collect()
  }

  async fn count_members(&self, dynasty_id: Uuid) -> Result<u64> {
    let dynasty_str = encode_uuid(dynasty_id);

    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM dynasty_members WHERE dynasty_id = ?1",
          rusqlite::params![dynasty_str],
          |r| r.get(0),
        )?)
      })
      .await?;

    Ok(count.max(0) as u64)
  }

  // ── Invites ───────────────────────────────────────────────────────────────

  async fn create_invite(&self, input: NewInvite) -> Result<Invite> {
    let invite = Invite {
      id:         Uuid::new_v4(),
      dynasty_id: input.dynasty_id,
      inviter_id: input.inviter_id,
      email:      input.email,
      status:     InviteStatus::Pending,
      created_at: now(),
      expires_at: input.expires_at.map(stored_precision),
      used_at:    None,
      used_by:    None,
    };

    let id_str      = encode_uuid(invite.id);
    let dynasty_str = encode_uuid(invite.dynasty_id);
    let inviter_str = encode_uuid(invite.inviter_id);
    let email       = invite.email.clone();
    let token_hash  = input.token_hash;
    let status      = invite.status.as_ref().to_owned();
    let created     = encode_dt(invite.created_at);
    let expires     = invite.expires_at.map(encode_dt);
    let (dynasty_id, inviter_id) = (invite.dynasty_id, invite.inviter_id);

    let outcome: Result<(), CoreError> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let is_member = tx
          .query_row(
            "SELECT 1 FROM dynasty_members WHERE dynasty_id = ?1 AND user_id = ?2",
            rusqlite::params![dynasty_str, inviter_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if !is_member {
          return Ok(Err(CoreError::NotAMember { dynasty_id, user_id: inviter_id }));
        }
        tx.execute(
          "INSERT INTO dynasty_invites (
             id, dynasty_id, inviter_id, email, token_hash, status, created_at, expires_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id_str,
            dynasty_str,
            inviter_str,
            email,
            token_hash,
            status,
            created,
            expires,
          ],
        )?;
        tx.commit()?;
        Ok(Ok(()))
      })
      .await?;
    outcome?;

    self.announce(Table::DynastyInvites, ChangeOp::Insert, invite.id);
    Ok(invite)
  }

  async fn accept_invite(&self, token_hash: String, user_id: Uuid) -> Result<Membership> {
    let accepted_at = now();
    let now_str     = encode_dt(accepted_at);
    let user_str    = encode_uuid(user_id);

    let outcome: Result<(Invite, Membership), CoreError> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let raw: Option<RawInvite> = tx
          .query_row(
            &format!("SELECT {INVITE_COLUMNS} FROM dynasty_invites WHERE token_hash = ?1"),
            rusqlite::params![token_hash],
            RawInvite::read,
          )
          .optional()?;
        let Some(raw) = raw else {
          return Ok(Err(CoreError::InviteNotFound));
        };
        match raw.status.as_str() {
          "accepted" => return Ok(Err(CoreError::InviteAlreadyUsed)),
          "expired" => return Ok(Err(CoreError::InviteExpired)),
          _ => {}
        }
        if raw.expires_at.as_deref().is_some_and(|at| at <= now_str.as_str()) {
          tx.execute(
            "UPDATE dynasty_invites SET status = 'expired' WHERE id = ?1",
            rusqlite::params![raw.id],
          )?;
          tx.commit()?;
          return Ok(Err(CoreError::InviteExpired));
        }

        let invite = match raw.into_invite() {
          Ok(invite) => invite,
          Err(e) => return Ok(Err(CoreError::from(e))),
        };
        let membership = Membership {
          id:         Uuid::new_v4(),
          dynasty_id: invite.dynasty_id,
          user_id,
          role:       MemberRole::Member,
          joined_at:  accepted_at,
        };
        if let Err(refused) = insert_member_checked(&tx, &MemberRow::from(&membership))? {
          return Ok(Err(refused));
        }
        tx.execute(
          "UPDATE dynasty_invites
           SET status = 'accepted', used_at = ?2, used_by = ?3
           WHERE id = ?1",
          rusqlite::params![encode_uuid(invite.id), now_str, user_str],
        )?;
        tx.commit()?;
        Ok(Ok((invite, membership)))
      })
      .await?;
    let (invite, membership) = outcome?;

    self.announce(Table::DynastyMembers, ChangeOp::Insert, membership.id);
    self.announce(Table::DynastyInvites, ChangeOp::Update, invite.id);
    Ok(membership)
  }
}
