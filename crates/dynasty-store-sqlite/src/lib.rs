//! SQLite backend for Dynasty.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every committed write is announced on
//! an in-process [`dynasty_core::change::ChangeBus`].

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
