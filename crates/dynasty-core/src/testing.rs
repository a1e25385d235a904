//! In-memory store and change feed for unit tests, with fault injection and
//! call counters.

use std::{
  collections::{HashMap, HashSet},
  sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
  },
};

use chrono::Utc;
use uuid::Uuid;

use crate::{
  Error, Result,
  change::{ChangeBus, ChangeEvent, ChangeFeed, ChangeOp, ChangeStream, Table},
  dynasty::{
    Dynasty, DynastyRecord, DynastyStatus, MemberOf, MemberRole, Membership,
    NewDynasty,
  },
  identity::{FounderProfile, Profile},
  invite::{Invite, InviteStatus, NewInvite},
  store::DynastyStore,
};

#[derive(Default)]
struct Tables {
  profiles:  HashMap<Uuid, Profile>,
  dynasties: Vec<Dynasty>,
  members:   Vec<Membership>,
  invites:   Vec<(String, Invite)>,
}

impl Tables {
  fn record(&self, dynasty: &Dynasty) -> DynastyRecord {
    DynastyRecord {
      dynasty: dynasty.clone(),
      founder: self.profiles.get(&dynasty.founder_id).map(FounderProfile::from),
    }
  }

  fn count(&self, dynasty_id: Uuid) -> usize {
    self.members.iter().filter(|m| m.dynasty_id == dynasty_id).count()
  }

  fn insert_member(
    &mut self,
    dynasty_id: Uuid,
    user_id: Uuid,
    role: MemberRole,
  ) -> Result<Membership> {
    let dynasty = self
      .dynasties
      .iter()
      .find(|d| d.id == dynasty_id)
      .ok_or(Error::DynastyNotFound(dynasty_id))?;
    if self.members.iter().any(|m| m.dynasty_id == dynasty_id && m.user_id == user_id) {
      return Err(Error::AlreadyMember { dynasty_id, user_id });
    }
    if let Some(limit) = dynasty.member_limit
      && self.count(dynasty_id) >= limit as usize
    {
      return Err(Error::MemberLimitReached { dynasty_id, limit });
    }
    let membership = Membership {
      id: Uuid::new_v4(),
      dynasty_id,
      user_id,
      role,
      joined_at: Utc::now(),
    };
    self.members.push(membership.clone());
    Ok(membership)
  }
}

/// Failures to inject into the next reads.
#[derive(Default)]
pub struct Faults {
  pub memberships: bool,
  pub founded:     bool,
  pub counts:      HashSet<Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
  tables:     Mutex<Tables>,
  pub faults: Mutex<Faults>,
  changes:    ChangeBus,
  reads:      AtomicUsize,
  writes:     AtomicUsize,
}

fn injected() -> Error { Error::store(std::io::Error::other("injected failure")) }

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  pub fn reads(&self) -> usize { self.reads.load(Ordering::SeqCst) }

  pub fn writes(&self) -> usize { self.writes.load(Ordering::SeqCst) }

  pub fn dynasty_count(&self) -> usize { self.tables.lock().unwrap().dynasties.len() }

  fn read(&self) { self.reads.fetch_add(1, Ordering::SeqCst); }

  fn write(&self, table: Table, op: ChangeOp, row_id: Uuid) {
    self.writes.fetch_add(1, Ordering::SeqCst);
    self.changes.publish(ChangeEvent::new(table, op, row_id));
  }
}

impl ChangeFeed for MemoryStore {
  fn subscribe(&self, tables: &[Table]) -> ChangeStream { self.changes.subscribe(tables) }
}

impl DynastyStore for MemoryStore {
  type Error = Error;

  async fn upsert_profile(&self, mut profile: Profile) -> Result<Profile> {
    {
      let mut t = self.tables.lock().unwrap();
      if let Some(existing) = t.profiles.get(&profile.id) {
        profile.created_at = existing.created_at;
      }
      t.profiles.insert(profile.id, profile.clone());
    }
    self.write(Table::Profiles, ChangeOp::Update, profile.id);
    Ok(profile)
  }

  async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>> {
    self.read();
    Ok(self.tables.lock().unwrap().profiles.get(&id).cloned())
  }

  async fn create_dynasty(&self, founder_id: Uuid, input: NewDynasty) -> Result<Dynasty> {
    let dynasty = Dynasty {
      id: Uuid::new_v4(),
      name: input.name,
      description: input.description,
      status: DynastyStatus::Active,
      founder_id,
      member_limit: input.member_limit,
      created_at: Utc::now(),
      avatar_url: input.avatar_url,
    };
    let membership = Membership {
      id:         Uuid::new_v4(),
      dynasty_id: dynasty.id,
      user_id:    founder_id,
      role:       MemberRole::Founder,
      joined_at:  dynasty.created_at,
    };
    {
      let mut t = self.tables.lock().unwrap();
      t.dynasties.push(dynasty.clone());
      t.members.push(membership.clone());
    }
    self.write(Table::Dynasties, ChangeOp::Insert, dynasty.id);
    self.write(Table::DynastyMembers, ChangeOp::Insert, membership.id);
    Ok(dynasty)
  }

  async fn get_dynasty(&self, id: Uuid) -> Result<Option<DynastyRecord>> {
    self.read();
    let t = self.tables.lock().unwrap();
    Ok(t.dynasties.iter().find(|d| d.id == id).map(|d| t.record(d)))
  }

  async fn memberships_of(&self, user_id: Uuid) -> Result<Vec<MemberOf>> {
    self.read();
    if self.faults.lock().unwrap().memberships {
      return Err(injected());
    }
    let t = self.tables.lock().unwrap();
    Ok(
      t.members
        .iter()
        .filter(|m| m.user_id == user_id)
        .filter_map(|m| {
          let dynasty = t.dynasties.iter().find(|d| d.id == m.dynasty_id)?;
          Some(MemberOf { membership: m.clone(), dynasty: t.record(dynasty) })
        })
        .collect(),
    )
  }

  async fn dynasties_founded_by(&self, user_id: Uuid) -> Result<Vec<DynastyRecord>> {
    self.read();
    if self.faults.lock().unwrap().founded {
      return Err(injected());
    }
    let t = self.tables.lock().unwrap();
    Ok(
      t.dynasties
        .iter()
        .filter(|d| d.founder_id == user_id)
        .map(|d| t.record(d))
        .collect(),
    )
  }

  async fn add_member(
    &self,
    dynasty_id: Uuid,
    user_id: Uuid,
    role: MemberRole,
  ) -> Result<Membership> {
    let membership = self.tables.lock().unwrap().insert_member(dynasty_id, user_id, role)?;
    self.write(Table::DynastyMembers, ChangeOp::Insert, membership.id);
    Ok(membership)
  }

  async fn list_members(&self, dynasty_id: Uuid) -> Result<Vec<Membership>> {
    self.read();
    let t = self.tables.lock().unwrap();
    Ok(t.members.iter().filter(|m| m.dynasty_id == dynasty_id).cloned().collect())
  }

  async fn count_members(&self, dynasty_id: Uuid) -> Result<u64> {
    self.read();
    if self.faults.lock().unwrap().counts.contains(&dynasty_id) {
      return Err(injected());
    }
    Ok(self.tables.lock().unwrap().count(dynasty_id) as u64)
  }

  async fn create_invite(&self, input: NewInvite) -> Result<Invite> {
    let invite = {
      let mut t = self.tables.lock().unwrap();
      if !t
        .members
        .iter()
        .any(|m| m.dynasty_id == input.dynasty_id && m.user_id == input.inviter_id)
      {
        return Err(Error::NotAMember { dynasty_id: input.dynasty_id, user_id: input.inviter_id });
      }
      let invite = Invite {
        id:         Uuid::new_v4(),
        dynasty_id: input.dynasty_id,
        inviter_id: input.inviter_id,
        email:      input.email,
        status:     InviteStatus::Pending,
        created_at: Utc::now(),
        expires_at: input.expires_at,
        used_at:    None,
        used_by:    None,
      };
      t.invites.push((input.token_hash, invite.clone()));
      invite
    };
    self.write(Table::DynastyInvites, ChangeOp::Insert, invite.id);
    Ok(invite)
  }

  async fn accept_invite(&self, token_hash: String, user_id: Uuid) -> Result<Membership> {
    let (invite_id, membership) = {
      let mut t = self.tables.lock().unwrap();
      let idx = t
        .invites
        .iter()
        .position(|(h, _)| *h == token_hash)
        .ok_or(Error::InviteNotFound)?;
      let invite = t.invites[idx].1.clone();
      match invite.status {
        InviteStatus::Accepted => return Err(Error::InviteAlreadyUsed),
        InviteStatus::Expired => return Err(Error::InviteExpired),
        InviteStatus::Pending => {}
      }
      let now = Utc::now();
      if invite.expires_at.is_some_and(|at| at <= now) {
        t.invites[idx].1.status = InviteStatus::Expired;
        return Err(Error::InviteExpired);
      }
      let membership = t.insert_member(invite.dynasty_id, user_id, MemberRole::Member)?;
      let stored = &mut t.invites[idx].1;
      stored.status = InviteStatus::Accepted;
      stored.used_at = Some(now);
      stored.used_by = Some(user_id);
      (invite.id, membership)
    };
    self.write(Table::DynastyMembers, ChangeOp::Insert, membership.id);
    self.write(Table::DynastyInvites, ChangeOp::Update, invite_id);
    Ok(membership)
  }
}
