//! SQLite backend for the certification survey store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every write runs inside one
//! `BEGIN IMMEDIATE` transaction, so a read-reconcile-apply cycle never
//! interleaves with another writer.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
