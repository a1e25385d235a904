//! Core types and trait definitions for Dynasty, a family-group service.
//!
//! This crate holds no HTTP or database code. Storage backends implement
//! [`store::DynastyStore`] and [`change::ChangeFeed`]; the
//! [`sync::DynastySync`] component builds the per-identity dynasty list on top
//! of them.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod change;
pub mod dynasty;
pub mod error;
pub mod identity;
pub mod invite;
pub mod plan;
pub mod store;
pub mod sync;

pub use error::{Error, Result};

#[cfg(test)]
mod testing;
