//! Invitations to join a dynasty.
//!
//! An invite is a single-use bearer token. Only its SHA-256 digest is stored;
//! the plaintext is handed to the inviter once, embedded in a share link.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{
  Error, Result,
  dynasty::Membership,
  store::DynastyStore,
};

/// Prefix of every invite token.
pub const TOKEN_PREFIX: &str = "INV_";

/// Lifetime applied when the caller does not choose one.
pub const DEFAULT_TTL_DAYS: i64 = 7;

const TOKEN_BYTES: usize = 16;

// ─── Types ───────────────────────────────────────────────────────────────────

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
pub enum InviteStatus {
  #[default]
  Pending,
  Accepted,
  Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
  pub id:         Uuid,
  pub dynasty_id: Uuid,
  pub inviter_id: Uuid,
  pub email:      Option<String>,
  pub status:     InviteStatus,
  pub created_at: DateTime<Utc>,
  pub expires_at: Option<DateTime<Utc>>,
  pub used_at:    Option<DateTime<Utc>>,
  pub used_by:    Option<Uuid>,
}

/// Input to [`DynastyStore::create_invite`].
#[derive(Debug, Clone)]
pub struct NewInvite {
  pub dynasty_id: Uuid,
  pub inviter_id: Uuid,
  pub email:      Option<String>,
  pub token_hash: String,
  pub expires_at: Option<DateTime<Utc>>,
}

/// What the inviter gets back: the stored invite plus the one-time token and
/// ready-to-share links.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedInvite {
  pub invite:       Invite,
  pub token:        String,
  pub url:          String,
  pub message:      String,
  pub whatsapp_url: String,
  pub mailto_url:   String,
}

// ─── Tokens ──────────────────────────────────────────────────────────────────

/// Generate a fresh token, e.g. `INV_q3k...`.
pub fn generate_token() -> String {
  let mut bytes = [0u8; TOKEN_BYTES];
  OsRng.fill_bytes(&mut bytes);
  format!("{TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Lowercase hex SHA-256 of a token; the only form that is persisted.
pub fn hash_token(token: &str) -> String {
  hex::encode(Sha256::digest(token.as_bytes()))
}

// ─── Links ───────────────────────────────────────────────────────────────────

/// Share-link templating for a given public base URL.
#[derive(Debug, Clone)]
pub struct InviteLinks {
  base_url: String,
}

impl InviteLinks {
  pub fn new(base_url: impl Into<String>) -> Self {
    let base_url = base_url.into().trim_end_matches('/').to_owned();
    Self { base_url }
  }

  pub fn url(&self, token: &str) -> String {
    format!("{}/invite/{token}", self.base_url)
  }

  pub fn message(&self, dynasty_name: &str, token: &str) -> String {
    format!(
      "You are invited to join the \"{dynasty_name}\" dynasty!\n\
       \n\
       Discover your family history and connect with your relatives.\n\
       \n\
       Join here: {}",
      self.url(token)
    )
  }

  pub fn whatsapp_url(&self, dynasty_name: &str, token: &str) -> String {
    let text = self.message(dynasty_name, token);
    format!("https://wa.me/?text={}", urlencoding::encode(&text))
  }

  pub fn mailto_url(&self, dynasty_name: &str, token: &str) -> String {
    let subject = format!("Invitation to join the {dynasty_name} dynasty");
    let body = self.message(dynasty_name, token).replace('\n', "\r\n");
    format!(
      "mailto:?subject={}&body={}",
      urlencoding::encode(&subject),
      urlencoding::encode(&body)
    )
  }
}

// ─── Operations ──────────────────────────────────────────────────────────────

/// Issue an invite to `dynasty_id` on behalf of `inviter_id`.
///
/// A `ttl` of `None` applies [`DEFAULT_TTL_DAYS`].
pub async fn issue_invite<S: DynastyStore>(
  store: &S,
  links: &InviteLinks,
  dynasty_id: Uuid,
  inviter_id: Uuid,
  email: Option<String>,
  ttl: Option<Duration>,
) -> Result<IssuedInvite> {
  let record = store
    .get_dynasty(dynasty_id)
    .await
    .map_err(Into::<Error>::into)?
    .ok_or(Error::DynastyNotFound(dynasty_id))?;

  let token = generate_token();
  let ttl = ttl.unwrap_or_else(|| Duration::days(DEFAULT_TTL_DAYS));
  let invite = store
    .create_invite(NewInvite {
      dynasty_id,
      inviter_id,
      email,
      token_hash: hash_token(&token),
      expires_at: Some(Utc::now() + ttl),
    })
    .await
    .map_err(Into::<Error>::into)?;

  tracing::info!(%dynasty_id, invite_id = %invite.id, "invite issued");

  let name = &record.dynasty.name;
  Ok(IssuedInvite {
    url: links.url(&token),
    message: links.message(name, &token),
    whatsapp_url: links.whatsapp_url(name, &token),
    mailto_url: links.mailto_url(name, &token),
    invite,
    token,
  })
}

/// Redeem a plaintext invite token for `user_id`.
pub async fn redeem_invite<S: DynastyStore>(
  store: &S,
  token: &str,
  user_id: Uuid,
) -> Result<Membership> {
  if !token.starts_with(TOKEN_PREFIX) {
    return Err(Error::InviteNotFound);
  }
  let membership = store
    .accept_invite(hash_token(token), user_id)
    .await
    .map_err(Into::<Error>::into)?;
  tracing::info!(dynasty_id = %membership.dynasty_id, %user_id, "invite accepted");
  Ok(membership)
}
