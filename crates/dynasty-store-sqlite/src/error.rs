//! Error type for `dynasty-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] dynasty_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("cannot decode column value: {0}")]
  Decode(String),
}

impl From<Error> for dynasty_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(core) => core,
      other => dynasty_core::Error::store(other),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
