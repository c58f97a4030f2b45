//! SQLite backend for the data vault.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every statement for one trait call
//! runs inside a single `call`, which is what makes hub and link
//! insert-if-absent atomic.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
