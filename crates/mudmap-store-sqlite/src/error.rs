//! Error type for `mudmap-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] mudmap_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// The database was written by a newer version of this crate.
  #[error("database schema version {found} is newer than supported version {supported}")]
  Schema { found: i64, supported: i64 },

  /// A sync record that no graph store could have produced.
  #[error("invalid record: {0}")]
  InvalidRecord(String),

  #[error("corrupt row: {0}")]
  Corrupt(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
