//! SQLite backend for the mudmap knowledge graph.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. The same store serves as an
//! agent's local replica and, behind `mudmap-server` or a shared file, as the
//! remote replica.

mod encode;
mod graph;
mod replica;
mod resolve;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
