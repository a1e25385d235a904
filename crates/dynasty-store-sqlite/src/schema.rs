//! SQL schema for the Dynasty SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Display attributes of users known to the identity provider.
CREATE TABLE IF NOT EXISTS profiles (
    id          TEXT PRIMARY KEY,
    username    TEXT,
    full_name   TEXT,
    avatar_url  TEXT,
    bio         TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

-- founder_id is not a foreign key: a founder need not have a profile yet.
CREATE TABLE IF NOT EXISTS dynasties (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    description   TEXT,
    status        TEXT NOT NULL DEFAULT 'active',  -- 'active' | 'premium' | 'founder'
    founder_id    TEXT NOT NULL,
    member_limit  INTEGER,                         -- NULL = unlimited
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    avatar_url    TEXT
);

CREATE TABLE IF NOT EXISTS dynasty_members (
    id          TEXT PRIMARY KEY,
    dynasty_id  TEXT NOT NULL REFERENCES dynasties(id),
    user_id     TEXT NOT NULL,
    role        TEXT NOT NULL DEFAULT 'member',
    joined_at   TEXT NOT NULL,
    UNIQUE (dynasty_id, user_id)
);

-- Only the SHA-256 of an invite token is stored.
CREATE TABLE IF NOT EXISTS dynasty_invites (
    id          TEXT PRIMARY KEY,
    dynasty_id  TEXT NOT NULL REFERENCES dynasties(id),
    inviter_id  TEXT NOT NULL,
    email       TEXT,
    token_hash  TEXT NOT NULL UNIQUE,
    status      TEXT NOT NULL DEFAULT 'pending',  -- 'pending' | 'accepted' | 'expired'
    created_at  TEXT NOT NULL,
    expires_at  TEXT,
    used_at     TEXT,
    used_by     TEXT
);

CREATE INDEX IF NOT EXISTS dynasties_founder_idx ON dynasties(founder_id);
CREATE INDEX IF NOT EXISTS members_user_idx      ON dynasty_members(user_id);
CREATE INDEX IF NOT EXISTS invites_dynasty_idx   ON dynasty_invites(dynasty_id);

PRAGMA user_version = 1;
";
